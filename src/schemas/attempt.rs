use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::types::{AttemptState, QuestionKind};
use crate::services::scoring::QuestionOutcome;

#[derive(Debug, Deserialize)]
pub(crate) struct AnswerRequest {
    #[serde(default, alias = "selectedOptionIds")]
    pub(crate) selected_option_ids: Vec<String>,
}

/// Optional body of an attempt start; exams with postulations require one.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct StartAttemptRequest {
    #[serde(default, alias = "postulationId")]
    pub(crate) postulation_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct VoidRequest {
    #[validate(length(min = 1, max = 500, message = "Reason must be 1 to 500 characters"))]
    pub(crate) reason: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) user_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) postulation_id: Option<String>,
    pub(crate) state: AttemptState,
    pub(crate) started_at: String,
    pub(crate) deadline_at: String,
    pub(crate) completed_at: Option<String>,
    pub(crate) remaining_seconds: i64,
    pub(crate) score: Option<f64>,
    pub(crate) passed: Option<bool>,
    pub(crate) void_reason: Option<String>,
    pub(crate) voided_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptOptionView {
    pub(crate) id: String,
    pub(crate) label: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ContextView {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) body: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptQuestionView {
    pub(crate) question_id: String,
    pub(crate) number: usize,
    pub(crate) code: String,
    pub(crate) statement: String,
    pub(crate) kind: QuestionKind,
    pub(crate) weight: f64,
    pub(crate) subtest_id: Option<String>,
    pub(crate) context: Option<ContextView>,
    pub(crate) options: Vec<AttemptOptionView>,
    pub(crate) selected_option_ids: Vec<String>,
    pub(crate) answered: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptNavigationResponse {
    pub(crate) attempt: AttemptResponse,
    pub(crate) exam_title: String,
    pub(crate) question_count: usize,
    pub(crate) answered_count: usize,
    pub(crate) questions: Vec<AttemptQuestionView>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerResponse {
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) selected_option_ids: Vec<String>,
    pub(crate) remaining_seconds: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResultResponse {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) exam_id: String,
    pub(crate) user_id: String,
    pub(crate) score: f64,
    pub(crate) max_score: f64,
    pub(crate) passed: bool,
    pub(crate) correct_count: i32,
    pub(crate) answered_count: i32,
    pub(crate) question_count: i32,
    pub(crate) time_used_seconds: i64,
    pub(crate) breakdown: Vec<QuestionOutcome>,
    pub(crate) created_at: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitResponse {
    pub(crate) attempt: AttemptResponse,
    pub(crate) result: Option<ResultResponse>,
}
