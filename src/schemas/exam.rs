use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use crate::db::types::{AccessType, ExamState, SelectionMode};
use crate::schemas::datetime::{deserialize_optional, deserialize_patch};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamCreate {
    #[validate(length(min = 1, max = 200, message = "Title must be 1 to 200 characters"))]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default, alias = "startsAt", deserialize_with = "deserialize_optional")]
    pub(crate) starts_at: Option<OffsetDateTime>,
    #[serde(default, alias = "endsAt", deserialize_with = "deserialize_optional")]
    pub(crate) ends_at: Option<OffsetDateTime>,
    #[serde(alias = "durationMinutes")]
    #[validate(range(min = 1, max = 1440, message = "Duration must be 1 to 1440 minutes"))]
    pub(crate) duration_minutes: i32,
    #[serde(default, alias = "selectionMode")]
    pub(crate) selection_mode: SelectionMode,
    #[serde(default, alias = "passThreshold")]
    #[validate(range(min = 0.0, message = "Pass threshold must be non-negative"))]
    pub(crate) pass_threshold: Option<f64>,
    #[serde(default = "default_max_attempts", alias = "maxAttempts")]
    #[validate(range(min = 1, max = 100, message = "Max attempts must be 1 to 100"))]
    pub(crate) max_attempts: i32,
    #[serde(default, alias = "accessType")]
    pub(crate) access_type: AccessType,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamUpdate {
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "Title must be 1 to 200 characters"))]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default, alias = "startsAt", deserialize_with = "deserialize_patch")]
    pub(crate) starts_at: Option<Option<OffsetDateTime>>,
    #[serde(default, alias = "endsAt", deserialize_with = "deserialize_patch")]
    pub(crate) ends_at: Option<Option<OffsetDateTime>>,
    #[serde(default, alias = "durationMinutes")]
    #[validate(range(min = 1, max = 1440, message = "Duration must be 1 to 1440 minutes"))]
    pub(crate) duration_minutes: Option<i32>,
    #[serde(default, alias = "passThreshold")]
    #[validate(range(min = 0.0, message = "Pass threshold must be non-negative"))]
    pub(crate) pass_threshold: Option<f64>,
    #[serde(default, alias = "maxAttempts")]
    #[validate(range(min = 1, max = 100, message = "Max attempts must be 1 to 100"))]
    pub(crate) max_attempts: Option<i32>,
    #[serde(default, alias = "accessType")]
    pub(crate) access_type: Option<AccessType>,
}

impl ExamUpdate {
    /// Fields whose change alters how the exam is taken or scored.
    pub(crate) fn touches_structure(&self) -> bool {
        self.starts_at.is_some()
            || self.ends_at.is_some()
            || self.duration_minutes.is_some()
            || self.pass_threshold.is_some()
            || self.max_attempts.is_some()
    }

    pub(crate) fn touches_metadata(&self) -> bool {
        self.title.is_some() || self.description.is_some() || self.access_type.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ManualQuestionInput {
    pub(crate) question_id: String,
    #[serde(default = "default_weight")]
    pub(crate) weight: f64,
    #[serde(default)]
    pub(crate) subtest_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CategoryRuleInput {
    pub(crate) category_id: String,
    pub(crate) count: i32,
    #[serde(default = "default_weight")]
    pub(crate) weight: f64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub(crate) enum AssemblyRequest {
    Manual { questions: Vec<ManualQuestionInput> },
    Random { rules: Vec<CategoryRuleInput> },
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubtestCreate {
    #[validate(length(min = 5, max = 100, message = "Name must be 5 to 100 characters"))]
    pub(crate) name: String,
    #[validate(range(min = 1, message = "Order must be at least 1"))]
    pub(crate) order: i32,
    #[serde(default, alias = "pointsPerQuestion")]
    #[validate(range(exclusive_min = 0.0, message = "Points must be positive"))]
    pub(crate) points_per_question: Option<f64>,
    #[serde(default, alias = "durationMinutes")]
    #[validate(range(min = 1, message = "Duration must be at least 1 minute"))]
    pub(crate) duration_minutes: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubtestUpdate {
    #[serde(default)]
    #[validate(length(min = 5, max = 100, message = "Name must be 5 to 100 characters"))]
    pub(crate) name: Option<String>,
    #[serde(default)]
    #[validate(range(min = 1, message = "Order must be at least 1"))]
    pub(crate) order: Option<i32>,
    #[serde(default, alias = "pointsPerQuestion")]
    #[validate(range(exclusive_min = 0.0, message = "Points must be positive"))]
    pub(crate) points_per_question: Option<f64>,
    #[serde(default, alias = "durationMinutes")]
    #[validate(range(min = 1, message = "Duration must be at least 1 minute"))]
    pub(crate) duration_minutes: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct PostulationCreate {
    #[validate(length(min = 5, max = 100, message = "Name must be 5 to 100 characters"))]
    pub(crate) name: String,
    #[serde(default)]
    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub(crate) description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct PostulationUpdate {
    #[serde(default)]
    #[validate(length(min = 5, max = 100, message = "Name must be 5 to 100 characters"))]
    pub(crate) name: Option<String>,
    #[serde(default)]
    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub(crate) description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ScoreRuleInput {
    #[serde(default, alias = "subtestId")]
    pub(crate) subtest_id: Option<String>,
    #[serde(alias = "minScore")]
    pub(crate) min_score: f64,
}

/// Full replace of a postulation's rules; an empty list clears them.
#[derive(Debug, Deserialize)]
pub(crate) struct ScoreRulesUpdate {
    #[serde(default)]
    pub(crate) rules: Vec<ScoreRuleInput>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ParticipantsUpdate {
    pub(crate) user_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubtestResponse {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) order: i32,
    pub(crate) points_per_question: Option<f64>,
    pub(crate) duration_minutes: Option<i32>,
    pub(crate) question_count: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ScoreRuleResponse {
    pub(crate) id: String,
    pub(crate) subtest_id: Option<String>,
    pub(crate) min_score: f64,
    pub(crate) position: i32,
}

#[derive(Debug, Serialize)]
pub(crate) struct PostulationResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) rules: Vec<ScoreRuleResponse>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CategoryRuleResponse {
    pub(crate) category_id: String,
    pub(crate) count: i32,
    pub(crate) weight: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamQuestionResponse {
    pub(crate) question_id: String,
    pub(crate) position: i32,
    pub(crate) weight: f64,
    pub(crate) subtest_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamSummaryResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) state: ExamState,
    pub(crate) selection_mode: SelectionMode,
    pub(crate) access_type: AccessType,
    pub(crate) starts_at: Option<String>,
    pub(crate) ends_at: Option<String>,
    pub(crate) duration_minutes: i32,
    pub(crate) max_attempts: i32,
    pub(crate) pass_threshold: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) owner_id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) state: ExamState,
    pub(crate) selection_mode: SelectionMode,
    pub(crate) access_type: AccessType,
    pub(crate) starts_at: Option<String>,
    pub(crate) ends_at: Option<String>,
    pub(crate) duration_minutes: i32,
    pub(crate) pass_threshold: f64,
    pub(crate) max_attempts: i32,
    pub(crate) has_attempts: bool,
    pub(crate) max_score: f64,
    pub(crate) assembled_at: Option<String>,
    pub(crate) published_at: Option<String>,
    pub(crate) finalized_at: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) subtests: Vec<SubtestResponse>,
    pub(crate) postulations: Vec<PostulationResponse>,
    pub(crate) rules: Vec<CategoryRuleResponse>,
    pub(crate) questions: Vec<ExamQuestionResponse>,
    pub(crate) participants: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ParticipantsResponse {
    pub(crate) exam_id: String,
    pub(crate) user_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResultResponse {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) user_id: String,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) attempt_number: i32,
    pub(crate) score: f64,
    pub(crate) max_score: f64,
    pub(crate) passed: bool,
    pub(crate) correct_count: i32,
    pub(crate) answered_count: i32,
    pub(crate) question_count: i32,
    pub(crate) time_used_seconds: i64,
    pub(crate) voided: bool,
    pub(crate) ip_address: Option<String>,
    pub(crate) user_agent: Option<String>,
    pub(crate) created_at: String,
}

fn default_max_attempts() -> i32 {
    1
}

fn default_weight() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembly_request_is_tagged_by_mode() {
        let manual: AssemblyRequest = serde_json::from_str(
            r#"{"mode":"manual","questions":[{"question_id":"q1","weight":10}]}"#,
        )
        .unwrap();
        let AssemblyRequest::Manual { questions } = manual else {
            panic!("expected manual");
        };
        assert_eq!(questions[0].weight, 10.0);
        assert!(questions[0].subtest_id.is_none());

        let random: AssemblyRequest =
            serde_json::from_str(r#"{"mode":"random","rules":[{"category_id":"c","count":3}]}"#)
                .unwrap();
        let AssemblyRequest::Random { rules } = random else {
            panic!("expected random");
        };
        assert_eq!(rules[0].weight, 1.0);
    }

    #[test]
    fn update_classifies_touched_fields() {
        let metadata: ExamUpdate = serde_json::from_str(r#"{"title":"New"}"#).unwrap();
        assert!(metadata.touches_metadata());
        assert!(!metadata.touches_structure());

        let window: ExamUpdate = serde_json::from_str(r#"{"ends_at":null}"#).unwrap();
        assert!(window.touches_structure());
    }

    #[test]
    fn create_defaults() {
        let payload: ExamCreate =
            serde_json::from_str(r#"{"title":"Math","duration_minutes":30}"#).unwrap();
        assert_eq!(payload.max_attempts, 1);
        assert_eq!(payload.selection_mode, SelectionMode::Manual);
        assert_eq!(payload.access_type, AccessType::Public);
        assert!(payload.starts_at.is_none());
    }
}
