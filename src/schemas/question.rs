use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::pagination::default_limit;
use crate::db::types::QuestionKind;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct CategoryCreate {
    #[validate(length(min = 1, max = 100, message = "Name must be 1 to 100 characters"))]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CategoryResponse {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) question_count: i64,
    pub(crate) created_at: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ContextCreate {
    #[validate(length(min = 1, max = 200, message = "Title must be 1 to 200 characters"))]
    pub(crate) title: String,
    #[validate(length(min = 1, message = "Body is required"))]
    pub(crate) body: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ContextResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) body: String,
    pub(crate) created_at: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct OptionInput {
    #[validate(length(min = 1, max = 1000, message = "Option text must be 1 to 1000 characters"))]
    pub(crate) label: String,
    #[serde(default, alias = "isCorrect")]
    pub(crate) is_correct: bool,
}

/// Create and full-replace update share one shape: the option set is always sent whole.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionPayload {
    #[validate(length(min = 1, max = 50, message = "Code must be 1 to 50 characters"))]
    pub(crate) code: String,
    #[serde(alias = "categoryId")]
    pub(crate) category_id: String,
    #[serde(default, alias = "contextId")]
    pub(crate) context_id: Option<String>,
    #[validate(length(min = 1, message = "Statement is required"))]
    pub(crate) statement: String,
    #[serde(default)]
    pub(crate) kind: QuestionKind,
    #[serde(default)]
    #[validate(range(min = 1900, max = 2100, message = "Year must be between 1900 and 2100"))]
    pub(crate) year: Option<i32>,
    #[validate(nested)]
    pub(crate) options: Vec<OptionInput>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuestionListParams {
    #[serde(default)]
    pub(crate) category_id: Option<String>,
    #[serde(default)]
    pub(crate) year: Option<i32>,
    #[serde(default)]
    pub(crate) code: Option<String>,
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "default_limit")]
    pub(crate) limit: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct OptionResponse {
    pub(crate) id: String,
    pub(crate) label: String,
    pub(crate) is_correct: bool,
    pub(crate) position: i32,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) id: String,
    pub(crate) code: String,
    pub(crate) category_id: String,
    pub(crate) context_id: Option<String>,
    pub(crate) statement: String,
    pub(crate) kind: QuestionKind,
    pub(crate) year: Option<i32>,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) options: Vec<OptionResponse>,
}
