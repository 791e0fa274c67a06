use sqlx::Postgres;
use time::PrimitiveDateTime;

pub(crate) async fn list_for_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT user_id FROM exam_participants WHERE exam_id = $1 ORDER BY added_at, user_id",
    )
    .bind(exam_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn is_participant(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    user_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM exam_participants WHERE exam_id = $1 AND user_id = $2)",
    )
    .bind(exam_id)
    .bind(user_id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn replace(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    exam_id: &str,
    user_ids: &[String],
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM exam_participants WHERE exam_id = $1 AND NOT (user_id = ANY($2))")
        .bind(exam_id)
        .bind(user_ids)
        .execute(&mut **tx)
        .await?;

    sqlx::query(
        "INSERT INTO exam_participants (exam_id, user_id, added_at)
         SELECT $1, user_id, $3 FROM UNNEST($2::varchar[]) AS user_id
         ON CONFLICT DO NOTHING",
    )
    .bind(exam_id)
    .bind(user_ids)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
