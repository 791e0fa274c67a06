use std::collections::HashSet;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Exam, ExamPostulation};
use crate::repositories;
use crate::repositories::postulations::PostulationFields;
use crate::schemas::exam::{
    PostulationCreate, PostulationResponse, PostulationUpdate, ScoreRulesUpdate,
};
use crate::services::errors::EngineError;
use crate::services::exam_lifecycle::{self, ExamChange};
use crate::services::postulations::{self, ScoreRuleDraft};

use super::super::helpers;

async fn ensure_name_free(
    tx: &mut Transaction<'_, Postgres>,
    exam_id: &str,
    name: &str,
    except_id: Option<&str>,
) -> Result<(), ApiError> {
    let taken = repositories::postulations::name_taken(&mut **tx, exam_id, name, except_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check postulation name"))?;
    if taken {
        return Err(EngineError::validation(
            "name",
            format!("A postulation named '{name}' already exists in this exam"),
        )
        .into());
    }
    Ok(())
}

/// Locks the exam for a postulation edit and loads the target postulation.
async fn lock_for_postulation_edit(
    tx: &mut Transaction<'_, Postgres>,
    state: &AppState,
    exam_id: &str,
    postulation_id: &str,
) -> Result<(Exam, ExamPostulation), ApiError> {
    let (exam, has_attempts) = helpers::lock_exam(tx, exam_id).await?;
    let postulation = repositories::postulations::find_in_exam(&mut **tx, &exam.id, postulation_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch postulation"))?
        .ok_or(ApiError::NotFound("Postulation"))?;
    exam_lifecycle::check_mutation(
        exam.state,
        has_attempts,
        ExamChange::Postulations,
        helpers::lock_policy(state),
    )?;
    Ok((exam, postulation))
}

pub(in crate::api::exams) async fn list_postulations(
    Path(exam_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<PostulationResponse>>, ApiError> {
    let exam = helpers::fetch_exam(state.db(), &exam_id).await?;
    Ok(Json(helpers::list_postulations(state.db(), &exam.id).await?))
}

pub(in crate::api::exams) async fn create_postulation(
    Path(exam_id): Path<String>,
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<PostulationCreate>,
) -> Result<(StatusCode, Json<PostulationResponse>), ApiError> {
    validate_payload(&payload)?;

    let mut tx = helpers::begin(state.db()).await?;
    let (exam, has_attempts) = helpers::lock_exam(&mut tx, &exam_id).await?;
    exam_lifecycle::check_mutation(
        exam.state,
        has_attempts,
        ExamChange::Postulations,
        helpers::lock_policy(&state),
    )?;
    let name = payload.name.trim();
    ensure_name_free(&mut tx, &exam.id, name, None).await?;

    let now = primitive_now_utc();
    let postulation_id = Uuid::new_v4().to_string();
    let postulation = repositories::postulations::create(
        &mut *tx,
        &postulation_id,
        &exam.id,
        &PostulationFields { name, description: payload.description.as_deref() },
        now,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create postulation"))?;
    repositories::exams::touch(&mut *tx, &exam.id, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update exam"))?;
    helpers::commit(tx).await?;

    tracing::info!(
        user_id = %user.id,
        exam_id = %exam.id,
        postulation_id = %postulation.id,
        action = "postulation_create",
        "Postulation created"
    );

    Ok((StatusCode::CREATED, Json(helpers::postulation_to_response(postulation, Vec::new()))))
}

pub(in crate::api::exams) async fn update_postulation(
    Path((exam_id, postulation_id)): Path<(String, String)>,
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<PostulationUpdate>,
) -> Result<Json<PostulationResponse>, ApiError> {
    validate_payload(&payload)?;

    let mut tx = helpers::begin(state.db()).await?;
    let (exam, current) =
        lock_for_postulation_edit(&mut tx, &state, &exam_id, &postulation_id).await?;

    let name = payload.name.as_deref().map(str::trim).unwrap_or(&current.name);
    if name != current.name {
        ensure_name_free(&mut tx, &exam.id, name, Some(&current.id)).await?;
    }

    let now = primitive_now_utc();
    let updated = repositories::postulations::update(
        &mut *tx,
        &current.id,
        &PostulationFields {
            name,
            description: payload.description.as_deref().or(current.description.as_deref()),
        },
        now,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update postulation"))?;
    let rules = repositories::postulations::list_rules(&mut *tx, &updated.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch postulation rules"))?;
    repositories::exams::touch(&mut *tx, &exam.id, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update exam"))?;
    helpers::commit(tx).await?;

    tracing::info!(
        user_id = %user.id,
        exam_id = %exam.id,
        postulation_id = %updated.id,
        action = "postulation_update",
        "Postulation updated"
    );

    Ok(Json(helpers::postulation_to_response(updated, rules)))
}

pub(in crate::api::exams) async fn delete_postulation(
    Path((exam_id, postulation_id)): Path<(String, String)>,
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let mut tx = helpers::begin(state.db()).await?;
    let (exam, has_attempts) = helpers::lock_exam(&mut tx, &exam_id).await?;

    let postulation =
        repositories::postulations::find_in_exam(&mut *tx, &exam.id, &postulation_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to fetch postulation"))?
            .ok_or(ApiError::NotFound("Postulation"))?;
    let score_rules = repositories::postulations::count_rules(&mut *tx, &postulation.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count postulation rules"))?;
    exam_lifecycle::can_delete_postulation(exam.state, has_attempts, score_rules)?;

    repositories::postulations::delete(&mut *tx, &postulation.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete postulation"))?;
    repositories::exams::touch(&mut *tx, &exam.id, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update exam"))?;
    helpers::commit(tx).await?;

    tracing::info!(
        user_id = %user.id,
        exam_id = %exam.id,
        postulation_id = %postulation.id,
        action = "postulation_delete",
        "Postulation deleted"
    );

    Ok(StatusCode::NO_CONTENT)
}

pub(in crate::api::exams) async fn replace_score_rules(
    Path((exam_id, postulation_id)): Path<(String, String)>,
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<ScoreRulesUpdate>,
) -> Result<Json<PostulationResponse>, ApiError> {
    let mut tx = helpers::begin(state.db()).await?;
    let (exam, postulation) =
        lock_for_postulation_edit(&mut tx, &state, &exam_id, &postulation_id).await?;

    let subtests: HashSet<String> = repositories::subtests::list_for_exam(&mut *tx, &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam subtests"))?
        .into_iter()
        .map(|subtest| subtest.id)
        .collect();
    let drafts: Vec<ScoreRuleDraft> = payload
        .rules
        .into_iter()
        .map(|rule| ScoreRuleDraft { subtest_id: rule.subtest_id, min_score: rule.min_score })
        .collect();
    postulations::validate_rules(&drafts, &subtests)?;

    let rules = repositories::postulations::replace_rules(&mut tx, &postulation.id, &drafts)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to store postulation rules"))?;
    repositories::exams::touch(&mut *tx, &exam.id, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update exam"))?;
    helpers::commit(tx).await?;

    tracing::info!(
        user_id = %user.id,
        exam_id = %exam.id,
        postulation_id = %postulation.id,
        rules = rules.len(),
        action = "postulation_rules_replace",
        "Postulation score rules replaced"
    );

    Ok(Json(helpers::postulation_to_response(postulation, rules)))
}
