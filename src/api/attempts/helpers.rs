use std::collections::{HashMap, HashSet};

use axum::http::{header, HeaderMap};
use sqlx::{Postgres, Transaction};
use time::PrimitiveDateTime;

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::core::time::{format_optional, format_primitive, primitive_now_utc};
use crate::db::models::{Attempt, ExamResult, User};
use crate::db::types::{AttemptState, UserRole};
use crate::repositories;
use crate::schemas::attempt::{
    AttemptNavigationResponse, AttemptOptionView, AttemptQuestionView, AttemptResponse,
    ContextView, ResultResponse,
};
use crate::services::assembly::display_order;
use crate::services::attempt_finalize::{self, FinalizeMode};
use crate::services::attempt_timing::{is_expired, remaining_seconds};
use crate::services::errors::EngineError;

const MAX_IP_LEN: usize = 64;

/// Exams with postulations need one picked at start; it must belong to the exam.
pub(super) async fn resolve_postulation(
    tx: &mut Transaction<'_, Postgres>,
    exam_id: &str,
    requested: Option<&str>,
) -> Result<Option<String>, ApiError> {
    let Some(postulation_id) = requested else {
        let offered = repositories::postulations::count_for_exam(&mut **tx, exam_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to check exam postulations"))?;
        if offered > 0 {
            return Err(EngineError::validation(
                "postulation_id",
                "Choose the postulation this attempt applies to",
            )
            .into());
        }
        return Ok(None);
    };

    let postulation = repositories::postulations::find_in_exam(&mut **tx, exam_id, postulation_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch postulation"))?
        .ok_or_else(|| {
            EngineError::validation("postulation_id", "Postulation does not belong to this exam")
        })?;
    Ok(Some(postulation.id))
}

pub(super) struct ClientMeta {
    pub(super) ip_address: Option<String>,
    pub(super) user_agent: Option<String>,
}

/// Audit metadata only; never used for any decision.
pub(super) fn client_meta(headers: &HeaderMap) -> ClientMeta {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|value| value.to_str().ok()))
        .map(|value| value.trim().chars().take(MAX_IP_LEN).collect::<String>())
        .filter(|value| !value.is_empty());
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    ClientMeta { ip_address, user_agent }
}

pub(super) fn state_label(state: AttemptState) -> &'static str {
    match state {
        AttemptState::InProgress => "in progress",
        AttemptState::Submitted => "submitted",
        AttemptState::Voided => "voided",
    }
}

pub(super) fn ensure_can_view(user: &User, attempt: &Attempt) -> Result<(), ApiError> {
    if attempt.user_id == user.id || user.role == UserRole::Admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Access denied"))
    }
}

pub(super) fn ensure_owner(user: &User, attempt: &Attempt) -> Result<(), ApiError> {
    if attempt.user_id == user.id {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Only the attempt owner may do this"))
    }
}

pub(super) async fn fetch_attempt(state: &AppState, attempt_id: &str) -> Result<Attempt, ApiError> {
    repositories::attempts::find_by_id(state.db(), attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?
        .ok_or(ApiError::NotFound("Attempt"))
}

/// Lazy reconciliation: an in-progress attempt past its deadline is submitted with the
/// answers recorded so far before anything else looks at it.
pub(super) async fn resolve_expired(state: &AppState, attempt: Attempt) -> Result<Attempt, ApiError> {
    let now = primitive_now_utc();
    if attempt.state != AttemptState::InProgress || !is_expired(attempt.deadline_at, now) {
        return Ok(attempt);
    }

    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to begin transaction"))?;
    let outcome =
        attempt_finalize::finalize_attempt(&mut tx, &attempt.id, FinalizeMode::AutoDeadline, now)
            .await?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    Ok(match outcome {
        attempt_finalize::FinalizeOutcome::Finalized { attempt, .. } => attempt,
        attempt_finalize::FinalizeOutcome::AlreadyClosed(attempt) => attempt,
    })
}

pub(super) fn attempt_to_response(attempt: Attempt, now: PrimitiveDateTime) -> AttemptResponse {
    let remaining = if attempt.state == AttemptState::InProgress {
        remaining_seconds(attempt.deadline_at, now)
    } else {
        0
    };

    AttemptResponse {
        id: attempt.id,
        exam_id: attempt.exam_id,
        user_id: attempt.user_id,
        attempt_number: attempt.attempt_number,
        postulation_id: attempt.postulation_id,
        state: attempt.state,
        started_at: format_primitive(attempt.started_at),
        deadline_at: format_primitive(attempt.deadline_at),
        completed_at: format_optional(attempt.completed_at),
        remaining_seconds: remaining,
        score: attempt.score,
        passed: attempt.passed,
        void_reason: attempt.void_reason,
        voided_at: format_optional(attempt.voided_at),
    }
}

pub(super) fn result_to_response(result: ExamResult) -> ResultResponse {
    ResultResponse {
        id: result.id,
        attempt_id: result.attempt_id,
        exam_id: result.exam_id,
        user_id: result.user_id,
        score: result.score,
        max_score: result.max_score,
        passed: result.passed,
        correct_count: result.correct_count,
        answered_count: result.answered_count,
        question_count: result.question_count,
        time_used_seconds: result.time_used_seconds,
        breakdown: result.breakdown.0,
        created_at: format_primitive(result.created_at),
    }
}

/// Questions in the attempt's display order, without correctness data.
pub(super) async fn build_navigation(
    state: &AppState,
    attempt: Attempt,
) -> Result<AttemptNavigationResponse, ApiError> {
    let db = state.db();
    let exam = repositories::exams::find_by_id(db, &attempt.exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or(ApiError::NotFound("Exam"))?;
    let committed = repositories::exam_questions::list_for_exam(db, &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam questions"))?;
    let question_ids: Vec<String> = committed.iter().map(|q| q.question_id.clone()).collect();

    let questions: HashMap<String, _> = repositories::questions::list_by_ids(db, &question_ids)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch questions"))?
        .into_iter()
        .map(|question| (question.id.clone(), question))
        .collect();

    let mut options: HashMap<String, Vec<AttemptOptionView>> = HashMap::new();
    for option in repositories::questions::list_options(db, &question_ids)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch question options"))?
    {
        options
            .entry(option.question_id)
            .or_default()
            .push(AttemptOptionView { id: option.id, label: option.label });
    }

    let context_ids: Vec<String> = questions
        .values()
        .filter_map(|question| question.context_id.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let contexts: HashMap<String, _> = repositories::contexts::list_by_ids(db, &context_ids)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch question contexts"))?
        .into_iter()
        .map(|context| (context.id.clone(), context))
        .collect();

    let mut answers = repositories::answers::map_for_attempt(db, &attempt.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch answers"))?;

    let mut committed: HashMap<String, _> =
        committed.into_iter().map(|q| (q.question_id.clone(), q)).collect();
    let mut views = Vec::with_capacity(question_ids.len());
    for question_id in display_order(&question_ids, attempt.order_seed) {
        let (Some(entry), Some(question)) =
            (committed.remove(&question_id), questions.get(&question_id))
        else {
            continue;
        };
        let selected = answers.remove(&question_id).unwrap_or_default();
        views.push(AttemptQuestionView {
            number: views.len() + 1,
            code: question.code.clone(),
            statement: question.statement.clone(),
            kind: question.kind,
            weight: entry.weight,
            subtest_id: entry.subtest_id,
            context: question.context_id.as_ref().and_then(|id| contexts.get(id)).map(|context| {
                ContextView {
                    id: context.id.clone(),
                    title: context.title.clone(),
                    body: context.body.clone(),
                }
            }),
            options: options.remove(&question_id).unwrap_or_default(),
            answered: !selected.is_empty(),
            selected_option_ids: selected,
            question_id,
        });
    }

    let answered_count = views.iter().filter(|view| view.answered).count();
    Ok(AttemptNavigationResponse {
        attempt: attempt_to_response(attempt, primitive_now_utc()),
        exam_title: exam.title,
        question_count: views.len(),
        answered_count,
        questions: views,
    })
}
