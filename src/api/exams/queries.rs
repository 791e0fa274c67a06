use serde::Deserialize;

use crate::db::types::ExamState;

#[derive(Debug, Deserialize)]
pub(super) struct ListExamsQuery {
    #[serde(default)]
    pub(super) skip: i64,
    #[serde(default = "crate::api::pagination::default_limit")]
    pub(super) limit: i64,
    #[serde(default)]
    pub(super) state: Option<ExamState>,
}

#[derive(Debug, Deserialize)]
pub(super) struct DeleteExamQuery {
    #[serde(default)]
    #[serde(alias = "forceDelete")]
    pub(super) force_delete: bool,
}
