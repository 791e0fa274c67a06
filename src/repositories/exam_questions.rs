use sqlx::Postgres;

use crate::db::models::ExamQuestion;
use crate::services::assembly::CommittedQuestion;

const COLUMNS: &str = "exam_id, question_id, position, weight, subtest_id";

pub(crate) async fn list_for_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<Vec<ExamQuestion>, sqlx::Error> {
    sqlx::query_as::<_, ExamQuestion>(&format!(
        "SELECT {COLUMNS} FROM exam_questions WHERE exam_id = $1 ORDER BY position"
    ))
    .bind(exam_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn count_for_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM exam_questions WHERE exam_id = $1")
        .bind(exam_id)
        .fetch_one(executor)
        .await
}

pub(crate) async fn contains(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    question_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM exam_questions WHERE exam_id = $1 AND question_id = $2)",
    )
    .bind(exam_id)
    .bind(question_id)
    .fetch_one(executor)
    .await
}

/// Swaps the committed set for `questions` in one go.
pub(crate) async fn replace(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    exam_id: &str,
    questions: &[CommittedQuestion],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM exam_questions WHERE exam_id = $1")
        .bind(exam_id)
        .execute(&mut **tx)
        .await?;

    for question in questions {
        sqlx::query(
            "INSERT INTO exam_questions (exam_id, question_id, position, weight, subtest_id)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(exam_id)
        .bind(&question.question_id)
        .bind(question.position)
        .bind(question.weight)
        .bind(question.subtest_id.as_deref())
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

pub(crate) async fn remove(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    question_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM exam_questions WHERE exam_id = $1 AND question_id = $2")
        .bind(exam_id)
        .bind(question_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Closes the gap left by a removed question.
pub(crate) async fn renumber(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exam_questions eq
         SET position = ordered.rn
         FROM (SELECT question_id, ROW_NUMBER() OVER (ORDER BY position) AS rn
               FROM exam_questions WHERE exam_id = $1) ordered
         WHERE eq.exam_id = $1 AND eq.question_id = ordered.question_id",
    )
    .bind(exam_id)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn count_in_subtest(
    executor: impl sqlx::PgExecutor<'_>,
    subtest_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM exam_questions WHERE subtest_id = $1")
        .bind(subtest_id)
        .fetch_one(executor)
        .await
}

pub(crate) async fn detach_subtest(
    executor: impl sqlx::PgExecutor<'_>,
    subtest_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE exam_questions SET subtest_id = NULL WHERE subtest_id = $1")
        .bind(subtest_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
