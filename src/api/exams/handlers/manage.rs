use std::collections::HashSet;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, to_primitive_utc};
use crate::db::types::ResourceType;
use crate::repositories;
use crate::repositories::exams::ExamFields;
use crate::schemas::exam::{ExamResponse, ExamUpdate, ParticipantsResponse, ParticipantsUpdate};
use crate::services::errors::FieldErrorsBuilder;
use crate::services::exam_lifecycle::{self, ExamChange};

use super::super::helpers;
use super::super::queries::DeleteExamQuery;

pub(in crate::api::exams) async fn get_exam(
    Path(exam_id): Path<String>,
    CurrentAdmin(_user): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = helpers::fetch_exam(state.db(), &exam_id).await?;
    Ok(Json(helpers::build_exam_response(state.db(), exam).await?))
}

pub(in crate::api::exams) async fn update_exam(
    Path(exam_id): Path<String>,
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<ExamUpdate>,
) -> Result<Json<ExamResponse>, ApiError> {
    validate_payload(&payload)?;

    let mut tx = helpers::begin(state.db()).await?;
    let (exam, has_attempts) = helpers::lock_exam(&mut tx, &exam_id).await?;

    let policy = helpers::lock_policy(&state);
    if payload.touches_structure() {
        exam_lifecycle::check_mutation(exam.state, has_attempts, ExamChange::Structure, policy)?;
    }
    if payload.touches_metadata() || !payload.touches_structure() {
        exam_lifecycle::check_mutation(exam.state, has_attempts, ExamChange::Metadata, policy)?;
    }

    let starts_at = match payload.starts_at {
        Some(value) => value.map(to_primitive_utc),
        None => exam.starts_at,
    };
    let ends_at = match payload.ends_at {
        Some(value) => value.map(to_primitive_utc),
        None => exam.ends_at,
    };
    exam_lifecycle::validate_window(starts_at, ends_at, state.settings().exam().max_validity_days)?;

    let description = match payload.description.as_deref() {
        Some(text) if text.trim().is_empty() => None,
        Some(text) => Some(text),
        None => exam.description.as_deref(),
    };
    let fields = ExamFields {
        title: payload.title.as_deref().map(str::trim).unwrap_or(&exam.title),
        description,
        starts_at,
        ends_at,
        duration_minutes: payload.duration_minutes.unwrap_or(exam.duration_minutes),
        selection_mode: exam.selection_mode,
        pass_threshold: payload.pass_threshold.unwrap_or(exam.pass_threshold),
        max_attempts: payload.max_attempts.unwrap_or(exam.max_attempts),
        access_type: payload.access_type.unwrap_or(exam.access_type),
    };

    let updated = repositories::exams::update(&mut *tx, &exam.id, &fields, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update exam"))?;
    helpers::commit(tx).await?;

    tracing::info!(
        user_id = %user.id,
        exam_id = %updated.id,
        action = "exam_update",
        structural = payload.touches_structure(),
        "Exam updated"
    );

    Ok(Json(helpers::build_exam_response(state.db(), updated).await?))
}

pub(in crate::api::exams) async fn delete_exam(
    Path(exam_id): Path<String>,
    Query(params): Query<DeleteExamQuery>,
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let mut tx = helpers::begin(state.db()).await?;
    let (exam, has_attempts) = helpers::lock_exam(&mut tx, &exam_id).await?;

    exam_lifecycle::check_delete_exam(exam.state, has_attempts, params.force_delete)?;

    repositories::attachments::delete_for_resource(&mut *tx, ResourceType::Exam, &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete exam attachments"))?;
    repositories::exams::delete(&mut *tx, &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete exam"))?;
    helpers::commit(tx).await?;

    tracing::info!(
        user_id = %user.id,
        exam_id = %exam.id,
        action = "exam_delete",
        forced = params.force_delete,
        "Exam deleted"
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Replaces the restricted-access list. Unknown or inactive users are rejected per index.
pub(in crate::api::exams) async fn replace_participants(
    Path(exam_id): Path<String>,
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<ParticipantsUpdate>,
) -> Result<Json<ParticipantsResponse>, ApiError> {
    let mut tx = helpers::begin(state.db()).await?;
    let (exam, has_attempts) = helpers::lock_exam(&mut tx, &exam_id).await?;
    exam_lifecycle::check_mutation(
        exam.state,
        has_attempts,
        ExamChange::Metadata,
        helpers::lock_policy(&state),
    )?;

    let user_ids = payload.user_ids;
    let active: HashSet<String> = repositories::users::filter_active_ids(&mut *tx, &user_ids)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check participants"))?
        .into_iter()
        .collect();

    let mut errors = FieldErrorsBuilder::default();
    let mut seen = HashSet::with_capacity(user_ids.len());
    for (index, user_id) in user_ids.iter().enumerate() {
        if !active.contains(user_id) {
            errors.push(format!("user_ids.{index}"), "User does not exist or is inactive");
        } else if !seen.insert(user_id.as_str()) {
            errors.push(format!("user_ids.{index}"), "User is listed more than once");
        }
    }
    errors.finish()?;

    let now = primitive_now_utc();
    repositories::participants::replace(&mut tx, &exam.id, &user_ids, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to replace participants"))?;
    repositories::exams::touch(&mut *tx, &exam.id, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update exam"))?;
    helpers::commit(tx).await?;

    tracing::info!(
        user_id = %user.id,
        exam_id = %exam.id,
        action = "exam_participants",
        participants = user_ids.len(),
        "Exam participants replaced"
    );

    let user_ids = repositories::participants::list_for_exam(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch participants"))?;
    Ok(Json(ParticipantsResponse { exam_id: exam.id, user_ids }))
}
