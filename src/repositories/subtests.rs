use time::PrimitiveDateTime;

use crate::db::models::ExamSubtest;

const COLUMNS: &str = "\
    id, exam_id, name, position, points_per_question, duration_minutes, created_at, updated_at";

pub(crate) struct SubtestFields<'a> {
    pub(crate) name: &'a str,
    pub(crate) position: i32,
    pub(crate) points_per_question: Option<f64>,
    pub(crate) duration_minutes: Option<i32>,
}

pub(crate) async fn list_for_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<Vec<ExamSubtest>, sqlx::Error> {
    sqlx::query_as::<_, ExamSubtest>(&format!(
        "SELECT {COLUMNS} FROM exam_subtests WHERE exam_id = $1 ORDER BY position"
    ))
    .bind(exam_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn find_in_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    id: &str,
) -> Result<Option<ExamSubtest>, sqlx::Error> {
    sqlx::query_as::<_, ExamSubtest>(&format!(
        "SELECT {COLUMNS} FROM exam_subtests WHERE exam_id = $1 AND id = $2"
    ))
    .bind(exam_id)
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn position_taken(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    position: i32,
    except_id: Option<&str>,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(
            SELECT 1 FROM exam_subtests
            WHERE exam_id = $1 AND position = $2 AND ($3::varchar IS NULL OR id <> $3)
        )",
    )
    .bind(exam_id)
    .bind(position)
    .bind(except_id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    exam_id: &str,
    fields: &SubtestFields<'_>,
    now: PrimitiveDateTime,
) -> Result<ExamSubtest, sqlx::Error> {
    sqlx::query_as::<_, ExamSubtest>(&format!(
        "INSERT INTO exam_subtests (
            id, exam_id, name, position, points_per_question, duration_minutes,
            created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$7)
        RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(exam_id)
    .bind(fields.name)
    .bind(fields.position)
    .bind(fields.points_per_question)
    .bind(fields.duration_minutes)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    fields: &SubtestFields<'_>,
    now: PrimitiveDateTime,
) -> Result<ExamSubtest, sqlx::Error> {
    sqlx::query_as::<_, ExamSubtest>(&format!(
        "UPDATE exam_subtests
         SET name = $2, position = $3, points_per_question = $4, duration_minutes = $5,
             updated_at = $6
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(fields.name)
    .bind(fields.position)
    .bind(fields.points_per_question)
    .bind(fields.duration_minutes)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn delete(executor: impl sqlx::PgExecutor<'_>, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM exam_subtests WHERE id = $1").bind(id).execute(executor).await?;
    Ok(())
}
