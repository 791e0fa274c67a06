use std::collections::HashSet;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAdmin, CurrentUser};
use crate::api::validation::validate_payload;
use crate::core::metrics;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::{AccessType, AttemptState};
use crate::repositories;
use crate::schemas::attempt::{
    AnswerRequest, AnswerResponse, AttemptNavigationResponse, AttemptResponse, ResultResponse,
    StartAttemptRequest, SubmitResponse, VoidRequest,
};
use crate::services::assembly::new_order_seed;
use crate::services::attempt_finalize::{self, FinalizeMode, FinalizeOutcome};
use crate::services::attempt_timing::{compute_deadline, is_expired, remaining_seconds};
use crate::services::errors::EngineError;
use crate::services::exam_lifecycle;
use crate::services::question_bank;

use super::helpers;

pub(crate) async fn start_attempt(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<StartAttemptRequest>>,
) -> Result<(StatusCode, Json<AttemptNavigationResponse>), ApiError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let allowed = state
        .redis()
        .allow_attempt_start(&user.id, state.settings().exam().attempt_start_rate_limit)
        .await
        .unwrap_or_else(|err| {
            tracing::warn!(error = %err, "Attempt start rate limit check failed");
            true
        });
    if !allowed {
        return Err(ApiError::TooManyRequests("Too many attempt starts, try again later"));
    }

    let now = primitive_now_utc();
    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to begin transaction"))?;

    let exam = repositories::exams::lock_for_share(&mut *tx, &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or(ApiError::NotFound("Exam"))?;
    exam_lifecycle::check_open_for_attempts(exam.state, exam.starts_at, exam.ends_at, now)?;

    if exam.access_type == AccessType::Restricted {
        let allowed = repositories::participants::is_participant(&mut *tx, &exam.id, &user.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to check exam participants"))?;
        if !allowed {
            return Err(EngineError::ExamNotAvailable(
                "You are not a participant of this exam".into(),
            )
            .into());
        }
    }

    let postulation_id =
        helpers::resolve_postulation(&mut tx, &exam.id, request.postulation_id.as_deref()).await?;

    repositories::attempts::lock_user_slot(&mut *tx, &exam.id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to lock attempt slot"))?;

    if let Some(open) = repositories::attempts::find_in_progress(&mut *tx, &exam.id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempts"))?
    {
        if !is_expired(open.deadline_at, now) {
            return Err(EngineError::AttemptAlreadyInProgress.into());
        }
        attempt_finalize::finalize_attempt(&mut tx, &open.id, FinalizeMode::AutoDeadline, now)
            .await?;
    }

    let (last_number, counted) =
        repositories::attempts::usage_for_user(&mut *tx, &exam.id, &user.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to count attempts"))?;
    if counted >= i64::from(exam.max_attempts) {
        return Err(EngineError::AttemptLimitReached(exam.max_attempts).into());
    }

    let meta = helpers::client_meta(&headers);
    let attempt_id = Uuid::new_v4().to_string();
    let attempt = repositories::attempts::create(
        &mut *tx,
        repositories::attempts::CreateAttempt {
            id: &attempt_id,
            exam_id: &exam.id,
            user_id: &user.id,
            attempt_number: last_number + 1,
            postulation_id: postulation_id.as_deref(),
            started_at: now,
            deadline_at: compute_deadline(now, exam.duration_minutes, exam.ends_at),
            order_seed: new_order_seed(),
            ip_address: meta.ip_address.as_deref(),
            user_agent: meta.user_agent.as_deref(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create attempt"))?
    .ok_or(EngineError::AttemptAlreadyInProgress)?;

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    metrics::attempt_started();
    tracing::info!(
        user_id = %user.id,
        exam_id = %exam.id,
        attempt_id = %attempt.id,
        attempt_number = attempt.attempt_number,
        postulation_id = attempt.postulation_id.as_deref(),
        action = "attempt_start",
        "Attempt started"
    );

    Ok((StatusCode::CREATED, Json(helpers::build_navigation(&state, attempt).await?)))
}

pub(in crate::api::attempts) async fn get_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptNavigationResponse>, ApiError> {
    let attempt = helpers::fetch_attempt(&state, &attempt_id).await?;
    helpers::ensure_can_view(&user, &attempt)?;
    let attempt = helpers::resolve_expired(&state, attempt).await?;

    Ok(Json(helpers::build_navigation(&state, attempt).await?))
}

pub(in crate::api::attempts) async fn answer_question(
    Path((attempt_id, question_id)): Path<(String, String)>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let now = primitive_now_utc();
    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to begin transaction"))?;

    let attempt = repositories::attempts::lock_for_update(&mut *tx, &attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to lock attempt"))?
        .ok_or(ApiError::NotFound("Attempt"))?;
    helpers::ensure_owner(&user, &attempt)?;
    if attempt.state != AttemptState::InProgress {
        return Err(EngineError::AttemptClosed(helpers::state_label(attempt.state)).into());
    }

    if is_expired(attempt.deadline_at, now) {
        attempt_finalize::finalize_attempt(&mut tx, &attempt.id, FinalizeMode::AutoDeadline, now)
            .await?;
        tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;
        return Err(EngineError::TimeExpired.into());
    }

    let in_exam = repositories::exam_questions::contains(&mut *tx, &attempt.exam_id, &question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check exam question"))?;
    if !in_exam {
        return Err(ApiError::NotFound("Exam question"));
    }
    let question = repositories::questions::find_by_id(&mut *tx, &question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch question"))?
        .ok_or(ApiError::NotFound("Question"))?;
    let option_ids: HashSet<String> =
        repositories::questions::list_options(&mut *tx, std::slice::from_ref(&question.id))
            .await
            .map_err(|e| ApiError::internal(e, "Failed to fetch question options"))?
            .into_iter()
            .map(|option| option.id)
            .collect();

    let selected =
        question_bank::normalize_selection(question.kind, &payload.selected_option_ids, &option_ids)?;
    if selected.is_empty() {
        repositories::answers::clear(&mut *tx, &attempt.id, &question.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to clear answer"))?;
    } else {
        repositories::answers::upsert(&mut *tx, &attempt.id, &question.id, &selected, now)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to save answer"))?;
    }
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    Ok(Json(AnswerResponse {
        attempt_id: attempt.id,
        question_id: question.id,
        selected_option_ids: selected,
        remaining_seconds: remaining_seconds(attempt.deadline_at, now),
    }))
}

pub(in crate::api::attempts) async fn submit_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let now = primitive_now_utc();
    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to begin transaction"))?;

    let attempt = repositories::attempts::lock_for_update(&mut *tx, &attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to lock attempt"))?
        .ok_or(ApiError::NotFound("Attempt"))?;
    helpers::ensure_owner(&user, &attempt)?;

    let mode = if is_expired(attempt.deadline_at, now) {
        FinalizeMode::AutoDeadline
    } else {
        FinalizeMode::ManualSubmit
    };
    let (attempt, result) =
        match attempt_finalize::finalize_attempt(&mut tx, &attempt.id, mode, now).await? {
            FinalizeOutcome::Finalized { attempt, result } => (attempt, result),
            FinalizeOutcome::AlreadyClosed(closed) => {
                return Err(EngineError::AttemptClosed(helpers::state_label(closed.state)).into());
            }
        };
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    Ok(Json(SubmitResponse {
        attempt: helpers::attempt_to_response(attempt, now),
        result: Some(helpers::result_to_response(result)),
    }))
}

pub(in crate::api::attempts) async fn get_attempt_result(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ResultResponse>, ApiError> {
    let attempt = helpers::fetch_attempt(&state, &attempt_id).await?;
    helpers::ensure_can_view(&user, &attempt)?;
    let attempt = helpers::resolve_expired(&state, attempt).await?;

    let result = repositories::results::find_by_attempt(state.db(), &attempt.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch result"))?
        .ok_or(ApiError::NotFound("Result"))?;

    Ok(Json(helpers::result_to_response(result)))
}

/// Voiding keeps the attempt and its result but takes it out of the max-attempts count.
pub(in crate::api::attempts) async fn void_attempt(
    Path(attempt_id): Path<String>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<VoidRequest>,
) -> Result<Json<AttemptResponse>, ApiError> {
    validate_payload(&payload)?;
    let reason = payload.reason.trim();
    if reason.is_empty() {
        return Err(ApiError::field("reason", "Reason is required"));
    }

    let now = primitive_now_utc();
    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to begin transaction"))?;
    let attempt = repositories::attempts::lock_for_update(&mut *tx, &attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to lock attempt"))?
        .ok_or(ApiError::NotFound("Attempt"))?;
    if attempt.state == AttemptState::Voided {
        return Err(EngineError::AttemptClosed("voided").into());
    }

    let voided = repositories::attempts::mark_voided(&mut *tx, &attempt.id, reason, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to void attempt"))?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    metrics::attempt_voided();
    tracing::info!(
        user_id = %admin.id,
        attempt_id = %voided.id,
        exam_id = %voided.exam_id,
        previous_state = helpers::state_label(attempt.state),
        action = "attempt_void",
        "Attempt voided"
    );

    Ok(Json(helpers::attempt_to_response(voided, now)))
}
