use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{
    AccessType, AttemptState, ExamState, QuestionKind, ResourceType, SelectionMode, UserRole,
};
use crate::services::scoring::QuestionOutcome;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Category {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QuestionContext {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) body: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) code: String,
    pub(crate) category_id: String,
    pub(crate) context_id: Option<String>,
    pub(crate) statement: String,
    pub(crate) kind: QuestionKind,
    pub(crate) year: Option<i32>,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QuestionOption {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) label: String,
    pub(crate) is_correct: bool,
    pub(crate) position: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) owner_id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) starts_at: Option<PrimitiveDateTime>,
    pub(crate) ends_at: Option<PrimitiveDateTime>,
    pub(crate) duration_minutes: i32,
    pub(crate) state: ExamState,
    pub(crate) selection_mode: SelectionMode,
    pub(crate) pass_threshold: f64,
    pub(crate) max_attempts: i32,
    pub(crate) access_type: AccessType,
    pub(crate) assembled_at: Option<PrimitiveDateTime>,
    pub(crate) published_at: Option<PrimitiveDateTime>,
    pub(crate) finalized_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamSubtest {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) name: String,
    pub(crate) position: i32,
    pub(crate) points_per_question: Option<f64>,
    pub(crate) duration_minutes: Option<i32>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// A named track candidates apply for within one exam.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamPostulation {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// Minimum score a postulation requires, on one sub-test or on the whole exam.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct PostulationScoreRule {
    pub(crate) id: String,
    pub(crate) postulation_id: String,
    pub(crate) subtest_id: Option<String>,
    pub(crate) min_score: f64,
    pub(crate) position: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamCategoryRule {
    pub(crate) exam_id: String,
    pub(crate) category_id: String,
    pub(crate) question_count: i32,
    pub(crate) weight: f64,
    pub(crate) position: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamQuestion {
    pub(crate) exam_id: String,
    pub(crate) question_id: String,
    pub(crate) position: i32,
    pub(crate) weight: f64,
    pub(crate) subtest_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Attempt {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) user_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) postulation_id: Option<String>,
    pub(crate) state: AttemptState,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) deadline_at: PrimitiveDateTime,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) order_seed: i64,
    pub(crate) score: Option<f64>,
    pub(crate) passed: Option<bool>,
    pub(crate) ip_address: Option<String>,
    pub(crate) user_agent: Option<String>,
    pub(crate) void_reason: Option<String>,
    pub(crate) voided_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct AttemptAnswer {
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) selected_option_ids: Json<Vec<String>>,
    pub(crate) answered_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamResult {
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
    pub(crate) breakdown: Json<Vec<QuestionOutcome>>,
    pub(crate) ip_address: Option<String>,
    pub(crate) user_agent: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Attachment {
    pub(crate) id: String,
    pub(crate) resource_type: ResourceType,
    pub(crate) resource_id: String,
    pub(crate) file_name: String,
    pub(crate) content_type: String,
    pub(crate) url: String,
    pub(crate) size_bytes: i64,
    pub(crate) uploaded_by: String,
    pub(crate) created_at: PrimitiveDateTime,
}
