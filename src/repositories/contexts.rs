use time::PrimitiveDateTime;

use crate::db::models::QuestionContext;

const COLUMNS: &str = "id, title, body, created_at, updated_at";

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    title: &str,
    body: &str,
    now: PrimitiveDateTime,
) -> Result<QuestionContext, sqlx::Error> {
    sqlx::query_as::<_, QuestionContext>(&format!(
        "INSERT INTO question_contexts (id, title, body, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $4)
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(title)
    .bind(body)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn list(
    executor: impl sqlx::PgExecutor<'_>,
) -> Result<Vec<QuestionContext>, sqlx::Error> {
    sqlx::query_as::<_, QuestionContext>(&format!(
        "SELECT {COLUMNS} FROM question_contexts ORDER BY created_at DESC"
    ))
    .fetch_all(executor)
    .await
}

pub(crate) async fn exists(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM question_contexts WHERE id = $1)")
        .bind(id)
        .fetch_one(executor)
        .await
}

pub(crate) async fn list_by_ids(
    executor: impl sqlx::PgExecutor<'_>,
    ids: &[String],
) -> Result<Vec<QuestionContext>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, QuestionContext>(&format!(
        "SELECT {COLUMNS} FROM question_contexts WHERE id = ANY($1)"
    ))
    .bind(ids)
    .fetch_all(executor)
    .await
}
