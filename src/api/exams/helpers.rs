use std::collections::HashMap;

use sqlx::{PgPool, Postgres, Transaction};

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::core::time::{format_optional, format_primitive};
use crate::db::models::{Exam, ExamPostulation, ExamSubtest, PostulationScoreRule};
use crate::repositories;
use crate::schemas::exam::{
    CategoryRuleResponse, ExamQuestionResponse, ExamResponse, ExamSummaryResponse,
    PostulationResponse, ScoreRuleResponse, SubtestResponse,
};
use crate::services::exam_lifecycle::LockPolicy;

pub(super) fn lock_policy(state: &AppState) -> LockPolicy {
    LockPolicy {
        allow_metadata_edits_with_attempts: state
            .settings()
            .exam()
            .allow_metadata_edits_with_attempts,
    }
}

pub(super) async fn fetch_exam(db: &PgPool, exam_id: &str) -> Result<Exam, ApiError> {
    repositories::exams::find_by_id(db, exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or(ApiError::NotFound("Exam"))
}

/// Row-locks the exam and reports whether it is attempt-locked. Attempt starts hold a
/// share lock on the same row, so the answer stays true until commit.
pub(super) async fn lock_exam(
    tx: &mut Transaction<'_, Postgres>,
    exam_id: &str,
) -> Result<(Exam, bool), ApiError> {
    let exam = repositories::exams::lock_for_update(&mut **tx, exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to lock exam"))?
        .ok_or(ApiError::NotFound("Exam"))?;
    let has_attempts = repositories::exams::has_attempts(&mut **tx, exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check exam attempts"))?;
    Ok((exam, has_attempts))
}

pub(super) async fn begin(db: &PgPool) -> Result<Transaction<'static, Postgres>, ApiError> {
    db.begin().await.map_err(|e| ApiError::internal(e, "Failed to begin transaction"))
}

pub(super) async fn commit(tx: Transaction<'_, Postgres>) -> Result<(), ApiError> {
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))
}

pub(super) fn subtest_to_response(subtest: ExamSubtest, question_count: i64) -> SubtestResponse {
    SubtestResponse {
        id: subtest.id,
        name: subtest.name,
        order: subtest.position,
        points_per_question: subtest.points_per_question,
        duration_minutes: subtest.duration_minutes,
        question_count,
    }
}

pub(super) fn postulation_to_response(
    postulation: ExamPostulation,
    rules: Vec<PostulationScoreRule>,
) -> PostulationResponse {
    PostulationResponse {
        id: postulation.id,
        exam_id: postulation.exam_id,
        name: postulation.name,
        description: postulation.description,
        rules: rules
            .into_iter()
            .map(|rule| ScoreRuleResponse {
                id: rule.id,
                subtest_id: rule.subtest_id,
                min_score: rule.min_score,
                position: rule.position,
            })
            .collect(),
        created_at: format_primitive(postulation.created_at),
        updated_at: format_primitive(postulation.updated_at),
    }
}

/// Postulations of the exam, each with its rules.
pub(super) async fn list_postulations(
    db: &PgPool,
    exam_id: &str,
) -> Result<Vec<PostulationResponse>, ApiError> {
    let postulations = repositories::postulations::list_for_exam(db, exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam postulations"))?;
    let mut rules: HashMap<String, Vec<PostulationScoreRule>> = HashMap::new();
    for rule in repositories::postulations::list_rules_for_exam(db, exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch postulation rules"))?
    {
        rules.entry(rule.postulation_id.clone()).or_default().push(rule);
    }

    Ok(postulations
        .into_iter()
        .map(|postulation| {
            let postulation_rules = rules.remove(&postulation.id).unwrap_or_default();
            postulation_to_response(postulation, postulation_rules)
        })
        .collect())
}

pub(super) fn exam_to_summary(exam: Exam) -> ExamSummaryResponse {
    ExamSummaryResponse {
        id: exam.id,
        title: exam.title,
        description: exam.description,
        state: exam.state,
        selection_mode: exam.selection_mode,
        access_type: exam.access_type,
        starts_at: format_optional(exam.starts_at),
        ends_at: format_optional(exam.ends_at),
        duration_minutes: exam.duration_minutes,
        max_attempts: exam.max_attempts,
        pass_threshold: exam.pass_threshold,
    }
}

pub(super) async fn build_exam_response(db: &PgPool, exam: Exam) -> Result<ExamResponse, ApiError> {
    let has_attempts = repositories::exams::has_attempts(db, &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check exam attempts"))?;
    let questions = repositories::exam_questions::list_for_exam(db, &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam questions"))?;
    let rules = repositories::exam_rules::list_for_exam(db, &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam rules"))?;
    let subtests = repositories::subtests::list_for_exam(db, &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam subtests"))?;
    let participants = repositories::participants::list_for_exam(db, &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam participants"))?;
    let postulations = list_postulations(db, &exam.id).await?;

    let mut per_subtest: HashMap<&str, i64> = HashMap::new();
    for question in &questions {
        if let Some(subtest_id) = question.subtest_id.as_deref() {
            *per_subtest.entry(subtest_id).or_default() += 1;
        }
    }
    let subtests = subtests
        .into_iter()
        .map(|subtest| {
            let count = per_subtest.get(subtest.id.as_str()).copied().unwrap_or(0);
            subtest_to_response(subtest, count)
        })
        .collect();

    let max_score = questions.iter().map(|question| question.weight).sum::<f64>();

    Ok(ExamResponse {
        id: exam.id,
        owner_id: exam.owner_id,
        title: exam.title,
        description: exam.description,
        state: exam.state,
        selection_mode: exam.selection_mode,
        access_type: exam.access_type,
        starts_at: format_optional(exam.starts_at),
        ends_at: format_optional(exam.ends_at),
        duration_minutes: exam.duration_minutes,
        pass_threshold: exam.pass_threshold,
        max_attempts: exam.max_attempts,
        has_attempts,
        max_score: (max_score * 100.0).round() / 100.0,
        assembled_at: format_optional(exam.assembled_at),
        published_at: format_optional(exam.published_at),
        finalized_at: format_optional(exam.finalized_at),
        created_at: format_primitive(exam.created_at),
        updated_at: format_primitive(exam.updated_at),
        subtests,
        postulations,
        rules: rules
            .into_iter()
            .map(|rule| CategoryRuleResponse {
                category_id: rule.category_id,
                count: rule.question_count,
                weight: rule.weight,
            })
            .collect(),
        questions: questions
            .into_iter()
            .map(|question| ExamQuestionResponse {
                question_id: question.question_id,
                position: question.position,
                weight: question.weight,
                subtest_id: question.subtest_id,
            })
            .collect(),
        participants,
    })
}
