use sqlx::{Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::Exam;
use crate::db::types::{AccessType, ExamState, SelectionMode};

pub(crate) const COLUMNS: &str = "\
    id, owner_id, title, description, starts_at, ends_at, duration_minutes, state, \
    selection_mode, pass_threshold, max_attempts, access_type, assembled_at, published_at, \
    finalized_at, created_at, updated_at";

/// Every column an edit may touch; callers merge a patch onto the current row first.
pub(crate) struct ExamFields<'a> {
    pub(crate) title: &'a str,
    pub(crate) description: Option<&'a str>,
    pub(crate) starts_at: Option<PrimitiveDateTime>,
    pub(crate) ends_at: Option<PrimitiveDateTime>,
    pub(crate) duration_minutes: i32,
    pub(crate) selection_mode: SelectionMode,
    pub(crate) pass_threshold: f64,
    pub(crate) max_attempts: i32,
    pub(crate) access_type: AccessType,
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Serializes structural edits, publish and finalize against each other and against
/// attempt starts (which hold `FOR SHARE`).
pub(crate) async fn lock_for_update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1 FOR UPDATE"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn lock_for_share(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1 FOR SHARE"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Row-locks every exam whose committed set contains the question, in id order.
/// Attempt starts take a share lock on the exam row, so they wait for the holder.
pub(crate) async fn lock_referencing_question(
    executor: impl sqlx::PgExecutor<'_>,
    question_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT id FROM exams
         WHERE id IN (SELECT exam_id FROM exam_questions WHERE question_id = $1)
         ORDER BY id
         FOR UPDATE",
    )
    .bind(question_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn has_attempts(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM attempts WHERE exam_id = $1)")
        .bind(exam_id)
        .fetch_one(executor)
        .await
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    owner_id: &str,
    fields: &ExamFields<'_>,
    now: PrimitiveDateTime,
) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "INSERT INTO exams (
            id, owner_id, title, description, starts_at, ends_at, duration_minutes, state,
            selection_mode, pass_threshold, max_attempts, access_type, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$13)
        RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(owner_id)
    .bind(fields.title)
    .bind(fields.description)
    .bind(fields.starts_at)
    .bind(fields.ends_at)
    .bind(fields.duration_minutes)
    .bind(ExamState::Draft)
    .bind(fields.selection_mode)
    .bind(fields.pass_threshold)
    .bind(fields.max_attempts)
    .bind(fields.access_type)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    fields: &ExamFields<'_>,
    now: PrimitiveDateTime,
) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "UPDATE exams
         SET title = $2, description = $3, starts_at = $4, ends_at = $5,
             duration_minutes = $6, selection_mode = $7, pass_threshold = $8,
             max_attempts = $9, access_type = $10, updated_at = $11
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(fields.title)
    .bind(fields.description)
    .bind(fields.starts_at)
    .bind(fields.ends_at)
    .bind(fields.duration_minutes)
    .bind(fields.selection_mode)
    .bind(fields.pass_threshold)
    .bind(fields.max_attempts)
    .bind(fields.access_type)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn mark_assembled(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    mode: SelectionMode,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exams SET selection_mode = $2, assembled_at = $3, updated_at = $3 WHERE id = $1",
    )
    .bind(id)
    .bind(mode)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn touch(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE exams SET updated_at = $2 WHERE id = $1")
        .bind(id)
        .bind(now)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn publish(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "UPDATE exams SET state = $2, published_at = $3, updated_at = $3
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(ExamState::Published)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn finalize(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "UPDATE exams SET state = $2, finalized_at = $3, updated_at = $3
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(ExamState::Finalized)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn delete(executor: impl sqlx::PgExecutor<'_>, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM exams WHERE id = $1").bind(id).execute(executor).await?;
    Ok(())
}

pub(crate) async fn list(
    executor: impl sqlx::PgExecutor<'_>,
    state: Option<ExamState>,
    skip: i64,
    limit: i64,
) -> Result<Vec<Exam>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM exams"));
    if let Some(state) = state {
        builder.push(" WHERE state = ");
        builder.push_bind(state);
    }
    builder.push(" ORDER BY created_at DESC OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<Exam>().fetch_all(executor).await
}

pub(crate) async fn count(
    executor: impl sqlx::PgExecutor<'_>,
    state: Option<ExamState>,
) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM exams");
    if let Some(state) = state {
        builder.push(" WHERE state = ");
        builder.push_bind(state);
    }
    builder.build_query_scalar::<i64>().fetch_one(executor).await
}

/// Published exams open at `now` that the user may take: public ones, or restricted
/// ones listing the user as a participant.
pub(crate) async fn list_available(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: &str,
    now: PrimitiveDateTime,
) -> Result<Vec<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "SELECT {COLUMNS} FROM exams e
         WHERE e.state = $1
           AND (e.starts_at IS NULL OR e.starts_at <= $2)
           AND (e.ends_at IS NULL OR e.ends_at >= $2)
           AND (e.access_type = $3
                OR EXISTS (SELECT 1 FROM exam_participants p
                           WHERE p.exam_id = e.id AND p.user_id = $4))
         ORDER BY e.ends_at NULLS LAST, e.title"
    ))
    .bind(ExamState::Published)
    .bind(now)
    .bind(AccessType::Public)
    .bind(user_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn list_ready_to_finalize(
    executor: impl sqlx::PgExecutor<'_>,
    now: PrimitiveDateTime,
    limit: i64,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT id FROM exams
         WHERE state = $1 AND ends_at IS NOT NULL AND ends_at < $2
         ORDER BY ends_at
         LIMIT $3",
    )
    .bind(ExamState::Published)
    .bind(now)
    .bind(limit)
    .fetch_all(executor)
    .await
}
