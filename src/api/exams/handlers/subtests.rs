use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::repositories::subtests::SubtestFields;
use crate::schemas::exam::{SubtestCreate, SubtestResponse, SubtestUpdate};
use crate::services::errors::EngineError;
use crate::services::exam_lifecycle::{self, ExamChange, SubcomponentDeletion};

use super::super::helpers;

async fn ensure_position_free(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    exam_id: &str,
    position: i32,
    except_id: Option<&str>,
) -> Result<(), ApiError> {
    let taken = repositories::subtests::position_taken(&mut **tx, exam_id, position, except_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check subtest order"))?;
    if taken {
        return Err(EngineError::validation("order", "Another sub-test already uses this order")
            .into());
    }
    Ok(())
}

pub(in crate::api::exams) async fn create_subtest(
    Path(exam_id): Path<String>,
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<SubtestCreate>,
) -> Result<(StatusCode, Json<SubtestResponse>), ApiError> {
    validate_payload(&payload)?;

    let mut tx = helpers::begin(state.db()).await?;
    let (exam, has_attempts) = helpers::lock_exam(&mut tx, &exam_id).await?;
    exam_lifecycle::check_mutation(
        exam.state,
        has_attempts,
        ExamChange::Structure,
        helpers::lock_policy(&state),
    )?;
    ensure_position_free(&mut tx, &exam.id, payload.order, None).await?;

    let now = primitive_now_utc();
    let subtest_id = Uuid::new_v4().to_string();
    let subtest = repositories::subtests::create(
        &mut *tx,
        &subtest_id,
        &exam.id,
        &SubtestFields {
            name: payload.name.trim(),
            position: payload.order,
            points_per_question: payload.points_per_question,
            duration_minutes: payload.duration_minutes,
        },
        now,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create subtest"))?;
    repositories::exams::touch(&mut *tx, &exam.id, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update exam"))?;
    helpers::commit(tx).await?;

    tracing::info!(
        user_id = %user.id,
        exam_id = %exam.id,
        subtest_id = %subtest.id,
        action = "subtest_create",
        "Sub-test created"
    );

    Ok((StatusCode::CREATED, Json(helpers::subtest_to_response(subtest, 0))))
}

pub(in crate::api::exams) async fn update_subtest(
    Path((exam_id, subtest_id)): Path<(String, String)>,
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<SubtestUpdate>,
) -> Result<Json<SubtestResponse>, ApiError> {
    validate_payload(&payload)?;

    let mut tx = helpers::begin(state.db()).await?;
    let (exam, has_attempts) = helpers::lock_exam(&mut tx, &exam_id).await?;
    exam_lifecycle::check_mutation(
        exam.state,
        has_attempts,
        ExamChange::Structure,
        helpers::lock_policy(&state),
    )?;

    let current = repositories::subtests::find_in_exam(&mut *tx, &exam.id, &subtest_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch subtest"))?
        .ok_or(ApiError::NotFound("Sub-test"))?;

    let position = payload.order.unwrap_or(current.position);
    if position != current.position {
        ensure_position_free(&mut tx, &exam.id, position, Some(&current.id)).await?;
    }

    let now = primitive_now_utc();
    let updated = repositories::subtests::update(
        &mut *tx,
        &current.id,
        &SubtestFields {
            name: payload.name.as_deref().map(str::trim).unwrap_or(&current.name),
            position,
            points_per_question: payload.points_per_question.or(current.points_per_question),
            duration_minutes: payload.duration_minutes.or(current.duration_minutes),
        },
        now,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update subtest"))?;
    let question_count = repositories::exam_questions::count_in_subtest(&mut *tx, &updated.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count subtest questions"))?;
    repositories::exams::touch(&mut *tx, &exam.id, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update exam"))?;
    helpers::commit(tx).await?;

    tracing::info!(
        user_id = %user.id,
        exam_id = %exam.id,
        subtest_id = %updated.id,
        action = "subtest_update",
        "Sub-test updated"
    );

    Ok(Json(helpers::subtest_to_response(updated, question_count)))
}

pub(in crate::api::exams) async fn delete_subtest(
    Path((exam_id, subtest_id)): Path<(String, String)>,
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let mut tx = helpers::begin(state.db()).await?;
    let (exam, has_attempts) = helpers::lock_exam(&mut tx, &exam_id).await?;

    let subtest = repositories::subtests::find_in_exam(&mut *tx, &exam.id, &subtest_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch subtest"))?
        .ok_or(ApiError::NotFound("Sub-test"))?;
    let dependents = repositories::exam_questions::count_in_subtest(&mut *tx, &subtest.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count subtest questions"))?;

    let mut detached = 0;
    if exam_lifecycle::can_delete_subcomponent(exam.state, has_attempts, dependents)?
        == SubcomponentDeletion::CascadeDetach
    {
        detached = repositories::exam_questions::detach_subtest(&mut *tx, &subtest.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to detach subtest questions"))?;
    }

    repositories::subtests::delete(&mut *tx, &subtest.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete subtest"))?;
    repositories::exams::touch(&mut *tx, &exam.id, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update exam"))?;
    helpers::commit(tx).await?;

    tracing::info!(
        user_id = %user.id,
        exam_id = %exam.id,
        subtest_id = %subtest.id,
        action = "subtest_delete",
        detached_questions = detached,
        "Sub-test deleted"
    );

    Ok(StatusCode::NO_CONTENT)
}
