use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, to_primitive_utc};
use crate::repositories;
use crate::repositories::exams::ExamFields;
use crate::repositories::postulations::PostulationFields;
use crate::repositories::subtests::SubtestFields;
use crate::schemas::exam::{ExamCreate, ExamResponse};
use crate::services::assembly::{CategoryDraw, CommittedQuestion};
use crate::services::exam_lifecycle;
use crate::services::postulations::ScoreRuleDraft;

use super::super::helpers;

pub(in crate::api::exams) async fn create_exam(
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<ExamCreate>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    validate_payload(&payload)?;

    let settings = state.settings().exam();
    let starts_at = payload.starts_at.map(to_primitive_utc);
    let ends_at = payload.ends_at.map(to_primitive_utc);
    exam_lifecycle::validate_window(starts_at, ends_at, settings.max_validity_days)?;

    let fields = ExamFields {
        title: payload.title.trim(),
        description: payload.description.as_deref().filter(|text| !text.trim().is_empty()),
        starts_at,
        ends_at,
        duration_minutes: payload.duration_minutes,
        selection_mode: payload.selection_mode,
        pass_threshold: payload.pass_threshold.unwrap_or(settings.pass_threshold),
        max_attempts: payload.max_attempts,
        access_type: payload.access_type,
    };

    let exam_id = Uuid::new_v4().to_string();
    let exam =
        repositories::exams::create(state.db(), &exam_id, &user.id, &fields, primitive_now_utc())
            .await
            .map_err(|e| ApiError::internal(e, "Failed to create exam"))?;

    tracing::info!(
        user_id = %user.id,
        exam_id = %exam.id,
        action = "exam_create",
        "Exam draft created"
    );

    Ok((StatusCode::CREATED, Json(helpers::build_exam_response(state.db(), exam).await?)))
}

/// New draft with the same settings, sub-tests, rules and committed set. The validity
/// window is cleared so the copy cannot open by accident.
pub(in crate::api::exams) async fn duplicate_exam(
    Path(exam_id): Path<String>,
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    let now = primitive_now_utc();
    let mut tx = helpers::begin(state.db()).await?;

    let source = repositories::exams::find_by_id(&mut *tx, &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or(ApiError::NotFound("Exam"))?;

    let title = format!("{} (copy)", source.title);
    let fields = ExamFields {
        title: &title,
        description: source.description.as_deref(),
        starts_at: None,
        ends_at: None,
        duration_minutes: source.duration_minutes,
        selection_mode: source.selection_mode,
        pass_threshold: source.pass_threshold,
        max_attempts: source.max_attempts,
        access_type: source.access_type,
    };
    let copy_id = Uuid::new_v4().to_string();
    let copy = repositories::exams::create(&mut *tx, &copy_id, &user.id, &fields, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to create exam copy"))?;

    let subtests = repositories::subtests::list_for_exam(&mut *tx, &source.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch subtests"))?;
    let mut subtest_ids = HashMap::with_capacity(subtests.len());
    for subtest in subtests {
        let new_id = Uuid::new_v4().to_string();
        repositories::subtests::create(
            &mut *tx,
            &new_id,
            &copy.id,
            &SubtestFields {
                name: &subtest.name,
                position: subtest.position,
                points_per_question: subtest.points_per_question,
                duration_minutes: subtest.duration_minutes,
            },
            now,
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to copy subtest"))?;
        subtest_ids.insert(subtest.id, new_id);
    }

    let postulations = repositories::postulations::list_for_exam(&mut *tx, &source.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch postulations"))?;
    for postulation in postulations {
        let new_id = Uuid::new_v4().to_string();
        repositories::postulations::create(
            &mut *tx,
            &new_id,
            &copy.id,
            &PostulationFields {
                name: &postulation.name,
                description: postulation.description.as_deref(),
            },
            now,
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to copy postulation"))?;

        let score_rules: Vec<ScoreRuleDraft> =
            repositories::postulations::list_rules(&mut *tx, &postulation.id)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to fetch postulation rules"))?
                .into_iter()
                .map(|rule| ScoreRuleDraft {
                    subtest_id: rule.subtest_id.and_then(|old| subtest_ids.get(&old).cloned()),
                    min_score: rule.min_score,
                })
                .collect();
        repositories::postulations::replace_rules(&mut tx, &new_id, &score_rules)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to copy postulation rules"))?;
    }

    let rules: Vec<CategoryDraw> = repositories::exam_rules::list_for_exam(&mut *tx, &source.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam rules"))?
        .into_iter()
        .map(|rule| CategoryDraw {
            category_id: rule.category_id,
            count: rule.question_count,
            weight: rule.weight,
        })
        .collect();
    repositories::exam_rules::replace(&mut tx, &copy.id, &rules)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to copy exam rules"))?;

    let committed: Vec<CommittedQuestion> =
        repositories::exam_questions::list_for_exam(&mut *tx, &source.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to fetch exam questions"))?
            .into_iter()
            .map(|question| CommittedQuestion {
                subtest_id: question
                    .subtest_id
                    .as_ref()
                    .and_then(|old| subtest_ids.get(old).cloned()),
                question_id: question.question_id,
                position: question.position,
                weight: question.weight,
            })
            .collect();
    repositories::exam_questions::replace(&mut tx, &copy.id, &committed)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to copy exam questions"))?;
    if !committed.is_empty() {
        repositories::exams::mark_assembled(&mut *tx, &copy.id, copy.selection_mode, now)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to mark exam assembled"))?;
    }

    helpers::commit(tx).await?;

    tracing::info!(
        user_id = %user.id,
        exam_id = %copy.id,
        source_exam_id = %source.id,
        action = "exam_duplicate",
        "Exam duplicated"
    );

    let copy = helpers::fetch_exam(state.db(), &copy.id).await?;
    Ok((StatusCode::CREATED, Json(helpers::build_exam_response(state.db(), copy).await?)))
}
