use axum::extract::{Path, State};
use axum::Json;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::core::metrics;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::schemas::exam::ExamResponse;
use crate::services::attempt_finalize;
use crate::services::exam_lifecycle;

use super::super::helpers;

pub(in crate::api::exams) async fn publish_exam(
    Path(exam_id): Path<String>,
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let now = primitive_now_utc();
    let mut tx = helpers::begin(state.db()).await?;
    let (exam, _) = helpers::lock_exam(&mut tx, &exam_id).await?;

    let committed = repositories::exam_questions::count_for_exam(&mut *tx, &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count exam questions"))?;
    exam_lifecycle::check_publish(
        exam.state,
        committed,
        exam.starts_at,
        exam.ends_at,
        state.settings().exam().max_validity_days,
        now,
    )?;

    let published = repositories::exams::publish(&mut *tx, &exam.id, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to publish exam"))?;
    helpers::commit(tx).await?;

    metrics::exam_published();
    tracing::info!(
        user_id = %user.id,
        exam_id = %published.id,
        action = "exam_publish",
        questions = committed,
        "Exam published"
    );

    Ok(Json(helpers::build_exam_response(state.db(), published).await?))
}

pub(in crate::api::exams) async fn finalize_exam(
    Path(exam_id): Path<String>,
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let now = primitive_now_utc();
    let mut tx = helpers::begin(state.db()).await?;
    let (finalized, closed) = attempt_finalize::finalize_exam(&mut tx, &exam_id, now).await?;
    helpers::commit(tx).await?;

    metrics::exam_finalized("manual");
    tracing::info!(
        user_id = %user.id,
        exam_id = %finalized.id,
        action = "exam_finalize",
        closed_attempts = closed,
        "Exam finalized"
    );

    Ok(Json(helpers::build_exam_response(state.db(), finalized).await?))
}
