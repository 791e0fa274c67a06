use anyhow::{Context, Result};
use time::PrimitiveDateTime;

use crate::core::metrics;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::services::attempt_finalize::{self, FinalizeOutcome};
use crate::services::exam_lifecycle::should_auto_finalize;

const SWEEP_BATCH_SIZE: i64 = 200;

/// Submits in-progress attempts whose deadline passed. Each attempt gets its own
/// transaction, so one bad row never blocks the rest of the batch.
pub(crate) async fn close_expired_attempts(state: &AppState) -> Result<usize> {
    sweep_expired_attempts(state, SWEEP_BATCH_SIZE).await
}

/// Walks every expired attempt page by page. Attempts that fail to close stay in
/// progress and are retried on the next sweep, never blocking the ones behind them.
async fn sweep_expired_attempts(state: &AppState, batch_size: i64) -> Result<usize> {
    let now = primitive_now_utc();
    let mut cursor: Option<(PrimitiveDateTime, String)> = None;
    let mut closed = 0;
    let mut failed = 0;

    loop {
        let page = repositories::attempts::list_expired_ids(
            state.db(),
            now,
            cursor.as_ref(),
            batch_size,
        )
        .await
        .context("Failed to fetch expired attempts")?;
        let last_page = (page.len() as i64) < batch_size;

        for (_, attempt_id) in &page {
            match attempt_finalize::finalize_expired(state.db(), attempt_id, now).await {
                Ok(FinalizeOutcome::Finalized { .. }) => closed += 1,
                Ok(FinalizeOutcome::AlreadyClosed(_)) => {}
                Err(err) => {
                    failed += 1;
                    tracing::error!(
                        attempt_id = %attempt_id,
                        error = %err,
                        "Failed to close expired attempt"
                    );
                }
            }
        }

        match page.into_iter().last() {
            Some(last) if !last_page => cursor = Some(last),
            _ => break,
        }
    }

    if closed > 0 || failed > 0 {
        tracing::info!(
            closed_attempts = closed,
            failed_attempts = failed,
            "Closed expired attempts"
        );
    }
    metrics::expired_attempts_closed(closed as u64);

    Ok(closed)
}

/// Finalizes published exams whose validity window has elapsed.
pub(crate) async fn finalize_elapsed_exams(state: &AppState) -> Result<usize> {
    if !state.settings().exam().auto_finalize {
        return Ok(0);
    }

    let now = primitive_now_utc();
    let exam_ids = repositories::exams::list_ready_to_finalize(state.db(), now, SWEEP_BATCH_SIZE)
        .await
        .context("Failed to fetch exams ready to finalize")?;

    let mut finalized = 0;
    for exam_id in exam_ids {
        let mut tx = state.db().begin().await.context("Failed to begin transaction")?;
        let Some(exam) = repositories::exams::lock_for_update(&mut *tx, &exam_id)
            .await
            .context("Failed to lock exam")?
        else {
            continue;
        };
        if !should_auto_finalize(exam.state, exam.ends_at, now) {
            continue;
        }

        match attempt_finalize::finalize_exam(&mut tx, &exam_id, now).await {
            Ok((exam, closed)) => {
                tx.commit().await.context("Failed to commit exam finalization")?;
                metrics::exam_finalized("auto");
                tracing::info!(
                    exam_id = %exam.id,
                    closed_attempts = closed,
                    action = "exam_finalize",
                    "Exam finalized after its window closed"
                );
                finalized += 1;
            }
            Err(err) => {
                tracing::error!(exam_id, error = %err, "Failed to auto-finalize exam");
            }
        }
    }

    Ok(finalized)
}
