use std::collections::{HashMap, HashSet};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::SelectionMode;
use crate::repositories;
use crate::schemas::exam::{AssemblyRequest, ExamResponse};
use crate::services::assembly::{self, CategoryDraw, CommittedQuestion, ManualItem};
use crate::services::exam_lifecycle::{self, ExamChange};

use super::super::helpers;

/// Replaces the committed set. Random draws happen here, once, and are persisted.
pub(in crate::api::exams) async fn assemble_exam(
    Path(exam_id): Path<String>,
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<AssemblyRequest>,
) -> Result<Json<ExamResponse>, ApiError> {
    let mut tx = helpers::begin(state.db()).await?;
    let (exam, has_attempts) = helpers::lock_exam(&mut tx, &exam_id).await?;
    exam_lifecycle::check_mutation(
        exam.state,
        has_attempts,
        ExamChange::QuestionSet,
        helpers::lock_policy(&state),
    )?;

    let (mode, committed, rules): (SelectionMode, Vec<CommittedQuestion>, Vec<CategoryDraw>) =
        match payload {
            AssemblyRequest::Manual { questions } => {
                let ids: Vec<String> = questions.iter().map(|q| q.question_id.clone()).collect();
                let known: HashSet<String> =
                    repositories::questions::existing_ids(&mut *tx, &ids)
                        .await
                        .map_err(|e| ApiError::internal(e, "Failed to check questions"))?
                        .into_iter()
                        .collect();
                let subtests: HashSet<String> =
                    repositories::subtests::list_for_exam(&mut *tx, &exam.id)
                        .await
                        .map_err(|e| ApiError::internal(e, "Failed to fetch subtests"))?
                        .into_iter()
                        .map(|subtest| subtest.id)
                        .collect();

                let items: Vec<ManualItem> = questions
                    .into_iter()
                    .map(|q| ManualItem {
                        question_id: q.question_id,
                        weight: q.weight,
                        subtest_id: q.subtest_id,
                    })
                    .collect();
                let committed = assembly::validate_manual(&items, &known, &subtests)?;
                (SelectionMode::Manual, committed, Vec::new())
            }
            AssemblyRequest::Random { rules } => {
                let draws: Vec<CategoryDraw> = rules
                    .into_iter()
                    .map(|rule| CategoryDraw {
                        category_id: rule.category_id,
                        count: rule.count,
                        weight: rule.weight,
                    })
                    .collect();
                assembly::validate_rules(&draws)?;

                let category_ids: Vec<String> =
                    draws.iter().map(|draw| draw.category_id.clone()).collect();
                let mut pools: HashMap<String, Vec<String>> = HashMap::new();
                for (category_id, question_id) in
                    repositories::questions::ids_by_categories(&mut *tx, &category_ids)
                        .await
                        .map_err(|e| ApiError::internal(e, "Failed to load category pools"))?
                {
                    pools.entry(category_id).or_default().push(question_id);
                }

                let committed = {
                    let mut rng = rand::thread_rng();
                    assembly::draw_random(&draws, &pools, &mut rng)?
                };
                (SelectionMode::Random, committed, draws)
            }
        };

    let now = primitive_now_utc();
    repositories::exam_questions::replace(&mut tx, &exam.id, &committed)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to store exam questions"))?;
    repositories::exam_rules::replace(&mut tx, &exam.id, &rules)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to store exam rules"))?;
    repositories::exams::mark_assembled(&mut *tx, &exam.id, mode, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to mark exam assembled"))?;
    helpers::commit(tx).await?;

    tracing::info!(
        user_id = %user.id,
        exam_id = %exam.id,
        action = "exam_assemble",
        mode = ?mode,
        questions = committed.len(),
        "Exam assembled"
    );

    let exam = helpers::fetch_exam(state.db(), &exam.id).await?;
    Ok(Json(helpers::build_exam_response(state.db(), exam).await?))
}

pub(in crate::api::exams) async fn remove_exam_question(
    Path((exam_id, question_id)): Path<(String, String)>,
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let mut tx = helpers::begin(state.db()).await?;
    let (exam, has_attempts) = helpers::lock_exam(&mut tx, &exam_id).await?;

    let present = repositories::exam_questions::contains(&mut *tx, &exam.id, &question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check exam question"))?;
    if !present {
        return Err(ApiError::NotFound("Exam question"));
    }

    exam_lifecycle::can_delete_subcomponent(exam.state, has_attempts, 0)?;

    repositories::exam_questions::remove(&mut *tx, &exam.id, &question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to remove exam question"))?;
    repositories::exam_questions::renumber(&mut *tx, &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to renumber exam questions"))?;
    repositories::exams::touch(&mut *tx, &exam.id, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update exam"))?;
    helpers::commit(tx).await?;

    tracing::info!(
        user_id = %user.id,
        exam_id = %exam.id,
        question_id = %question_id,
        action = "exam_question_remove",
        "Question detached from exam"
    );

    Ok(StatusCode::NO_CONTENT)
}
