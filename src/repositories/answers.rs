use std::collections::HashMap;

use sqlx::types::Json;
use time::PrimitiveDateTime;

use crate::db::models::AttemptAnswer;

async fn list_for_attempt(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
) -> Result<Vec<AttemptAnswer>, sqlx::Error> {
    sqlx::query_as::<_, AttemptAnswer>(
        "SELECT attempt_id, question_id, selected_option_ids, answered_at
         FROM attempt_answers WHERE attempt_id = $1",
    )
    .bind(attempt_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn map_for_attempt(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
) -> Result<HashMap<String, Vec<String>>, sqlx::Error> {
    let rows = list_for_attempt(executor, attempt_id).await?;
    Ok(rows.into_iter().map(|row| (row.question_id, row.selected_option_ids.0)).collect())
}

/// Full replace of the stored selection; the primary key keeps one row per question.
pub(crate) async fn upsert(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
    question_id: &str,
    selected_option_ids: &[String],
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO attempt_answers (attempt_id, question_id, selected_option_ids, answered_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (attempt_id, question_id)
         DO UPDATE SET selected_option_ids = EXCLUDED.selected_option_ids,
                       answered_at = EXCLUDED.answered_at",
    )
    .bind(attempt_id)
    .bind(question_id)
    .bind(Json(selected_option_ids))
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn clear(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
    question_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM attempt_answers WHERE attempt_id = $1 AND question_id = $2")
        .bind(attempt_id)
        .bind(question_id)
        .execute(executor)
        .await?;
    Ok(())
}
