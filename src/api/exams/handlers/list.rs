use axum::extract::{Path, Query, State};
use axum::Json;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAdmin, CurrentUser};
use crate::api::pagination::{PageParams, PaginatedResponse};
use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::repositories;
use crate::schemas::exam::{ExamResultResponse, ExamSummaryResponse};

use super::super::helpers;
use super::super::queries::ListExamsQuery;

pub(in crate::api::exams) async fn list_exams(
    Query(params): Query<ListExamsQuery>,
    CurrentAdmin(_user): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<ExamSummaryResponse>>, ApiError> {
    let skip = params.skip.max(0);
    let limit = params.limit.clamp(1, 1000);

    let exams = repositories::exams::list(state.db(), params.state, skip, limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list exams"))?;
    let total_count = repositories::exams::count(state.db(), params.state)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count exams"))?;

    Ok(Json(PaginatedResponse {
        items: exams.into_iter().map(helpers::exam_to_summary).collect(),
        total_count,
        skip,
        limit,
    }))
}

/// Published exams the caller may start right now.
pub(in crate::api::exams) async fn list_available_exams(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ExamSummaryResponse>>, ApiError> {
    let exams = repositories::exams::list_available(state.db(), &user.id, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list available exams"))?;

    Ok(Json(exams.into_iter().map(helpers::exam_to_summary).collect()))
}

pub(in crate::api::exams) async fn list_exam_results(
    Path(exam_id): Path<String>,
    Query(params): Query<PageParams>,
    CurrentAdmin(_user): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<ExamResultResponse>>, ApiError> {
    let exam = helpers::fetch_exam(state.db(), &exam_id).await?;
    let (skip, limit) = params.clamped();

    let rows = repositories::results::list_for_exam(state.db(), &exam.id, skip, limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list exam results"))?;
    let total_count = repositories::results::count_for_exam(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count exam results"))?;

    let items = rows
        .into_iter()
        .map(|row| ExamResultResponse {
            id: row.result.id,
            attempt_id: row.result.attempt_id,
            user_id: row.result.user_id,
            username: row.username,
            full_name: row.full_name,
            attempt_number: row.attempt_number,
            score: row.result.score,
            max_score: row.result.max_score,
            passed: row.result.passed,
            correct_count: row.result.correct_count,
            answered_count: row.result.answered_count,
            question_count: row.result.question_count,
            time_used_seconds: row.result.time_used_seconds,
            voided: row.voided,
            ip_address: row.result.ip_address,
            user_agent: row.result.user_agent,
            created_at: format_primitive(row.result.created_at),
        })
        .collect();

    Ok(Json(PaginatedResponse { items, total_count, skip, limit }))
}
