use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::api::pagination::PaginatedResponse;
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::db::models::{Question, QuestionOption};
use crate::db::types::ResourceType;
use crate::repositories;
use crate::repositories::questions::{NewOption, QuestionFields, QuestionFilter};
use crate::schemas::question::{
    OptionResponse, QuestionListParams, QuestionPayload, QuestionResponse,
};
use crate::services::errors::FieldErrorsBuilder;
use crate::services::question_bank::{self, OptionDraft};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_questions).post(create_question))
        .route("/:question_id", get(get_question).put(update_question).delete(delete_question))
}

fn to_response(question: Question, options: Vec<QuestionOption>) -> QuestionResponse {
    QuestionResponse {
        id: question.id,
        code: question.code,
        category_id: question.category_id,
        context_id: question.context_id,
        statement: question.statement,
        kind: question.kind,
        year: question.year,
        created_by: question.created_by,
        created_at: format_primitive(question.created_at),
        updated_at: format_primitive(question.updated_at),
        options: options
            .into_iter()
            .map(|option| OptionResponse {
                id: option.id,
                label: option.label,
                is_correct: option.is_correct,
                position: option.position,
            })
            .collect(),
    }
}

/// Field-level checks that need the database: references and code uniqueness.
async fn check_payload(
    tx: &mut Transaction<'_, Postgres>,
    state: &AppState,
    payload: &QuestionPayload,
    except_id: Option<&str>,
) -> Result<(), ApiError> {
    validate_payload(payload)?;

    let drafts: Vec<OptionDraft> = payload
        .options
        .iter()
        .map(|option| OptionDraft { label: option.label.clone(), is_correct: option.is_correct })
        .collect();
    question_bank::validate_options(
        payload.kind,
        &drafts,
        state.settings().exam().max_options_per_question,
    )?;

    let mut errors = FieldErrorsBuilder::default();
    let category_known = repositories::categories::exists(&mut **tx, &payload.category_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check category"))?;
    if !category_known {
        errors.push("category_id", "Category does not exist");
    }
    if let Some(context_id) = &payload.context_id {
        let context_known = repositories::contexts::exists(&mut **tx, context_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to check context"))?;
        if !context_known {
            errors.push("context_id", "Context does not exist");
        }
    }
    let code_taken = repositories::questions::code_taken(&mut **tx, payload.code.trim(), except_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check question code"))?;
    if code_taken {
        errors.push("code", "Code is already used by another question");
    }

    errors.finish()?;
    Ok(())
}

fn fields(payload: &QuestionPayload) -> QuestionFields<'_> {
    QuestionFields {
        code: payload.code.trim(),
        category_id: &payload.category_id,
        context_id: payload.context_id.as_deref(),
        statement: &payload.statement,
        kind: payload.kind,
        year: payload.year,
    }
}

fn new_options(payload: &QuestionPayload) -> Vec<NewOption<'_>> {
    payload
        .options
        .iter()
        .map(|option| NewOption { label: option.label.trim(), is_correct: option.is_correct })
        .collect()
}

async fn create_question(
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<QuestionPayload>,
) -> Result<(StatusCode, Json<QuestionResponse>), ApiError> {
    let now = primitive_now_utc();
    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to begin transaction"))?;
    check_payload(&mut tx, &state, &payload, None).await?;

    let question_id = Uuid::new_v4().to_string();
    let question =
        repositories::questions::create(&mut *tx, &question_id, &fields(&payload), &user.id, now)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to create question"))?;
    let options =
        repositories::questions::replace_options(&mut tx, &question.id, &new_options(&payload))
            .await
            .map_err(|e| ApiError::internal(e, "Failed to store question options"))?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    tracing::info!(
        user_id = %user.id,
        question_id = %question.id,
        code = %question.code,
        action = "question_create",
        "Question created"
    );

    Ok((StatusCode::CREATED, Json(to_response(question, options))))
}

async fn list_questions(
    Query(params): Query<QuestionListParams>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<QuestionResponse>>, ApiError> {
    let skip = params.skip.max(0);
    let limit = params.limit.clamp(1, 1000);
    let filter = QuestionFilter {
        category_id: params.category_id.as_deref(),
        year: params.year,
        code: params.code.as_deref().map(str::trim).filter(|code| !code.is_empty()),
    };

    let questions = repositories::questions::list(state.db(), &filter, skip, limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list questions"))?;
    let total_count = repositories::questions::count(state.db(), &filter)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count questions"))?;

    let ids: Vec<String> = questions.iter().map(|question| question.id.clone()).collect();
    let mut options: HashMap<String, Vec<QuestionOption>> = HashMap::new();
    for option in repositories::questions::list_options(state.db(), &ids)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch question options"))?
    {
        options.entry(option.question_id.clone()).or_default().push(option);
    }

    let items = questions
        .into_iter()
        .map(|question| {
            let question_options = options.remove(&question.id).unwrap_or_default();
            to_response(question, question_options)
        })
        .collect();

    Ok(Json(PaginatedResponse { items, total_count, skip, limit }))
}

async fn get_question(
    Path(question_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<QuestionResponse>, ApiError> {
    let question = repositories::questions::find_by_id(state.db(), &question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch question"))?
        .ok_or(ApiError::NotFound("Question"))?;
    let options =
        repositories::questions::list_options(state.db(), std::slice::from_ref(&question.id))
            .await
            .map_err(|e| ApiError::internal(e, "Failed to fetch question options"))?;

    Ok(Json(to_response(question, options)))
}

/// Locks the question and then every exam using it, so no attempt can start on those
/// exams before the edit commits. Fails once any of them is attempt-locked.
async fn lock_for_edit(
    tx: &mut Transaction<'_, Postgres>,
    question_id: &str,
) -> Result<Question, ApiError> {
    let question = repositories::questions::lock_for_update(&mut **tx, question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to lock question"))?
        .ok_or(ApiError::NotFound("Question"))?;
    repositories::exams::lock_referencing_question(&mut **tx, &question.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to lock referencing exams"))?;
    let locked_refs = repositories::questions::count_locked_exam_refs(&mut **tx, &question.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check question usage"))?;
    question_bank::check_question_edit(locked_refs)?;
    Ok(question)
}

/// Full replace, option set included. Refused while any referencing exam is attempt-locked.
async fn update_question(
    Path(question_id): Path<String>,
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<QuestionPayload>,
) -> Result<Json<QuestionResponse>, ApiError> {
    let now = primitive_now_utc();
    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to begin transaction"))?;

    let existing = lock_for_edit(&mut tx, &question_id).await?;
    check_payload(&mut tx, &state, &payload, Some(&existing.id)).await?;

    let question = repositories::questions::update(&mut *tx, &existing.id, &fields(&payload), now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update question"))?;
    let options =
        repositories::questions::replace_options(&mut tx, &question.id, &new_options(&payload))
            .await
            .map_err(|e| ApiError::internal(e, "Failed to store question options"))?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    tracing::info!(
        user_id = %user.id,
        question_id = %question.id,
        action = "question_update",
        "Question updated"
    );

    Ok(Json(to_response(question, options)))
}

async fn delete_question(
    Path(question_id): Path<String>,
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to begin transaction"))?;

    let question = repositories::questions::lock_for_update(&mut *tx, &question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to lock question"))?
        .ok_or(ApiError::NotFound("Question"))?;
    let exam_refs = repositories::questions::count_exam_refs(&mut *tx, &question.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check question usage"))?;
    question_bank::check_question_delete(exam_refs)?;

    repositories::attachments::delete_for_resource(&mut *tx, ResourceType::Question, &question.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete question attachments"))?;
    repositories::questions::delete(&mut *tx, &question.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete question"))?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    tracing::info!(
        user_id = %user.id,
        question_id = %question.id,
        action = "question_delete",
        "Question deleted"
    );

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests;
