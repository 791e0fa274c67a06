use sqlx::{Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::Attempt;
use crate::db::types::AttemptState;

const COLUMNS: &str = "\
    id, exam_id, user_id, attempt_number, postulation_id, state, started_at, deadline_at, \
    completed_at, order_seed, score, passed, ip_address, user_agent, void_reason, voided_at, \
    created_at, updated_at";

pub(crate) struct CreateAttempt<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) user_id: &'a str,
    pub(crate) attempt_number: i32,
    pub(crate) postulation_id: Option<&'a str>,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) deadline_at: PrimitiveDateTime,
    pub(crate) order_seed: i64,
    pub(crate) ip_address: Option<&'a str>,
    pub(crate) user_agent: Option<&'a str>,
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!("SELECT {COLUMNS} FROM attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn lock_for_update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Transaction-scoped lock serializing starts by the same user on the same exam.
pub(crate) async fn lock_user_slot(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    user_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1), hashtext($2))")
        .bind(exam_id)
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn find_in_progress(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    user_id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts WHERE exam_id = $1 AND user_id = $2 AND state = $3"
    ))
    .bind(exam_id)
    .bind(user_id)
    .bind(AttemptState::InProgress)
    .fetch_optional(executor)
    .await
}

/// `(highest ordinal used, attempts counting toward the limit)`; voided attempts only
/// consume an ordinal.
pub(crate) async fn usage_for_user(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    user_id: &str,
) -> Result<(i32, i64), sqlx::Error> {
    sqlx::query_as::<_, (i32, i64)>(
        "SELECT COALESCE(MAX(attempt_number), 0),
                COUNT(*) FILTER (WHERE state <> $3)
         FROM attempts WHERE exam_id = $1 AND user_id = $2",
    )
    .bind(exam_id)
    .bind(user_id)
    .bind(AttemptState::Voided)
    .fetch_one(executor)
    .await
}

/// Returns `None` when a concurrent start already holds the in-progress slot or ordinal.
pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateAttempt<'_>,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "INSERT INTO attempts (
            id, exam_id, user_id, attempt_number, postulation_id, state, started_at,
            deadline_at, order_seed, ip_address, user_agent, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$7,$7)
        ON CONFLICT DO NOTHING
        RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.exam_id)
    .bind(params.user_id)
    .bind(params.attempt_number)
    .bind(params.postulation_id)
    .bind(AttemptState::InProgress)
    .bind(params.started_at)
    .bind(params.deadline_at)
    .bind(params.order_seed)
    .bind(params.ip_address)
    .bind(params.user_agent)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn mark_submitted(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    completed_at: PrimitiveDateTime,
    score: f64,
    passed: bool,
    now: PrimitiveDateTime,
) -> Result<Attempt, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "UPDATE attempts
         SET state = $2, completed_at = $3, score = $4, passed = $5, updated_at = $6
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(AttemptState::Submitted)
    .bind(completed_at)
    .bind(score)
    .bind(passed)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn mark_voided(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    reason: &str,
    now: PrimitiveDateTime,
) -> Result<Attempt, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "UPDATE attempts
         SET state = $2, void_reason = $3, voided_at = $4, updated_at = $4
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(AttemptState::Voided)
    .bind(reason)
    .bind(now)
    .fetch_one(executor)
    .await
}

/// One page of expired in-progress attempts, ordered by `(deadline_at, id)`.
/// Pass the last row of the previous page as `after` to continue past it.
pub(crate) async fn list_expired_ids(
    executor: impl sqlx::PgExecutor<'_>,
    now: PrimitiveDateTime,
    after: Option<&(PrimitiveDateTime, String)>,
    limit: i64,
) -> Result<Vec<(PrimitiveDateTime, String)>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new("SELECT deadline_at, id FROM attempts WHERE state = ");
    builder.push_bind(AttemptState::InProgress);
    builder.push(" AND deadline_at < ");
    builder.push_bind(now);
    if let Some((deadline_at, id)) = after {
        builder.push(" AND (deadline_at, id) > (");
        builder.push_bind(*deadline_at);
        builder.push(", ");
        builder.push_bind(id.clone());
        builder.push(")");
    }
    builder.push(" ORDER BY deadline_at, id LIMIT ");
    builder.push_bind(limit.max(1));

    builder.build_query_as::<(PrimitiveDateTime, String)>().fetch_all(executor).await
}

pub(crate) async fn list_in_progress_ids_for_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT id FROM attempts WHERE exam_id = $1 AND state = $2 ORDER BY started_at",
    )
    .bind(exam_id)
    .bind(AttemptState::InProgress)
    .fetch_all(executor)
    .await
}
