use std::collections::{BTreeSet, HashMap};

use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::models::{Attempt, Exam, ExamResult};
use crate::db::types::AttemptState;
use crate::repositories;
use crate::services::attempt_timing::{completion_time, time_used_seconds};
use crate::services::errors::EngineError;
use crate::services::exam_lifecycle::check_finalize;
use crate::services::postulations::{meets_rules, ScoreRuleDraft};
use crate::services::scoring::{score_attempt, ScoringQuestion};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FinalizeMode {
    ManualSubmit,
    AutoDeadline,
    ExamFinalized,
}

impl FinalizeMode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::ManualSubmit => "manual_submit",
            Self::AutoDeadline => "auto_deadline",
            Self::ExamFinalized => "exam_finalized",
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum FinalizeError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug)]
pub(crate) enum FinalizeOutcome {
    Finalized { attempt: Attempt, result: ExamResult },
    /// Somebody else closed the attempt first; nothing was written.
    AlreadyClosed(Attempt),
}

/// Committed questions of an exam joined with their options' correctness.
pub(crate) async fn load_scoring_questions(
    tx: &mut Transaction<'_, Postgres>,
    exam_id: &str,
) -> Result<Vec<ScoringQuestion>, sqlx::Error> {
    let committed = repositories::exam_questions::list_for_exam(&mut **tx, exam_id).await?;
    let question_ids: Vec<String> = committed.iter().map(|q| q.question_id.clone()).collect();
    let options = repositories::questions::list_options(&mut **tx, &question_ids).await?;

    let mut by_question: HashMap<&str, (BTreeSet<String>, BTreeSet<String>)> = HashMap::new();
    for option in &options {
        let entry = by_question.entry(option.question_id.as_str()).or_default();
        entry.0.insert(option.id.clone());
        if option.is_correct {
            entry.1.insert(option.id.clone());
        }
    }

    Ok(committed
        .into_iter()
        .map(|question| {
            let (option_ids, correct_option_ids) =
                by_question.remove(question.question_id.as_str()).unwrap_or_default();
            ScoringQuestion {
                question_id: question.question_id,
                subtest_id: question.subtest_id,
                weight: question.weight,
                option_ids,
                correct_option_ids,
            }
        })
        .collect())
}

/// Closes an in-progress attempt inside `tx`: score, write the result, mark submitted.
/// Completion is stamped at `min(now, deadline)` whatever the trigger.
pub(crate) async fn finalize_attempt(
    tx: &mut Transaction<'_, Postgres>,
    attempt_id: &str,
    mode: FinalizeMode,
    now: PrimitiveDateTime,
) -> Result<FinalizeOutcome, FinalizeError> {
    let attempt = repositories::attempts::lock_for_update(&mut **tx, attempt_id)
        .await?
        .ok_or(EngineError::NotFound("Attempt"))?;

    if attempt.state != AttemptState::InProgress {
        return Ok(FinalizeOutcome::AlreadyClosed(attempt));
    }

    let exam = repositories::exams::find_by_id(&mut **tx, &attempt.exam_id)
        .await?
        .ok_or(EngineError::NotFound("Exam"))?;
    let questions = load_scoring_questions(tx, &exam.id).await?;
    let answers = repositories::answers::map_for_attempt(&mut **tx, &attempt.id).await?;

    let mut summary = match score_attempt(&questions, &answers, exam.pass_threshold) {
        Ok(summary) => summary,
        Err(err) => {
            tracing::error!(
                attempt_id = %attempt.id,
                exam_id = %exam.id,
                user_id = %attempt.user_id,
                mode = mode.as_str(),
                error = %err,
                "Attempt scoring failed; left in progress for manual reconciliation"
            );
            return Err(err.into());
        }
    };

    if let Some(postulation_id) = &attempt.postulation_id {
        let rules: Vec<ScoreRuleDraft> =
            repositories::postulations::list_rules(&mut **tx, postulation_id)
                .await?
                .into_iter()
                .map(ScoreRuleDraft::from)
                .collect();
        summary.passed = summary.passed && meets_rules(&summary, &rules);
    }

    let completed_at = completion_time(now, attempt.deadline_at);
    let result_id = Uuid::new_v4().to_string();
    let result = repositories::results::create(
        &mut **tx,
        repositories::results::CreateResult {
            id: &result_id,
            attempt_id: &attempt.id,
            exam_id: &attempt.exam_id,
            user_id: &attempt.user_id,
            summary: &summary,
            time_used_seconds: time_used_seconds(attempt.started_at, completed_at),
            ip_address: attempt.ip_address.as_deref(),
            user_agent: attempt.user_agent.as_deref(),
            created_at: now,
        },
    )
    .await?;

    // The unique attempt_id keeps a second result out even if the row lock was bypassed.
    let result = match result {
        Some(result) => result,
        None => repositories::results::find_by_attempt(&mut **tx, &attempt.id)
            .await?
            .ok_or(EngineError::NotFound("Result"))?,
    };

    let attempt = repositories::attempts::mark_submitted(
        &mut **tx,
        &attempt.id,
        completed_at,
        summary.score,
        summary.passed,
        now,
    )
    .await?;

    crate::core::metrics::attempt_finalized(mode.as_str());
    tracing::info!(
        attempt_id = %attempt.id,
        exam_id = %attempt.exam_id,
        user_id = %attempt.user_id,
        action = "attempt_finalized",
        mode = mode.as_str(),
        score = summary.score,
        passed = summary.passed,
        "Attempt finalized"
    );

    Ok(FinalizeOutcome::Finalized { attempt, result })
}

/// Single-attempt finalization in its own transaction, used by the background sweep.
pub(crate) async fn finalize_expired(
    db: &PgPool,
    attempt_id: &str,
    now: PrimitiveDateTime,
) -> Result<FinalizeOutcome, FinalizeError> {
    let mut tx = db.begin().await?;
    let outcome = finalize_attempt(&mut tx, attempt_id, FinalizeMode::AutoDeadline, now).await?;
    tx.commit().await?;
    Ok(outcome)
}

/// Published -> Finalized, implicitly submitting every attempt still in progress.
/// Returns the finalized exam and how many attempts were closed on the way.
pub(crate) async fn finalize_exam(
    tx: &mut Transaction<'_, Postgres>,
    exam_id: &str,
    now: PrimitiveDateTime,
) -> Result<(Exam, usize), FinalizeError> {
    let exam = repositories::exams::lock_for_update(&mut **tx, exam_id)
        .await?
        .ok_or(EngineError::NotFound("Exam"))?;
    check_finalize(exam.state)?;

    let open_attempts =
        repositories::attempts::list_in_progress_ids_for_exam(&mut **tx, &exam.id).await?;
    let mut closed = 0;
    for attempt_id in &open_attempts {
        let outcome = finalize_attempt(tx, attempt_id, FinalizeMode::ExamFinalized, now).await?;
        if matches!(outcome, FinalizeOutcome::Finalized { .. }) {
            closed += 1;
        }
    }

    let exam = repositories::exams::finalize(&mut **tx, &exam.id, now).await?;
    Ok((exam, closed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_labels_are_stable() {
        assert_eq!(FinalizeMode::ManualSubmit.as_str(), "manual_submit");
        assert_eq!(FinalizeMode::AutoDeadline.as_str(), "auto_deadline");
        assert_eq!(FinalizeMode::ExamFinalized.as_str(), "exam_finalized");
    }

    #[test]
    fn engine_errors_pass_through() {
        let err: FinalizeError = EngineError::ScoringFailed("broken".into()).into();
        assert!(matches!(err, FinalizeError::Engine(EngineError::ScoringFailed(_))));
    }
}
