use sqlx::Postgres;

use crate::db::models::ExamCategoryRule;
use crate::services::assembly::CategoryDraw;

pub(crate) async fn list_for_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<Vec<ExamCategoryRule>, sqlx::Error> {
    sqlx::query_as::<_, ExamCategoryRule>(
        "SELECT exam_id, category_id, question_count, weight, position
         FROM exam_category_rules WHERE exam_id = $1 ORDER BY position",
    )
    .bind(exam_id)
    .fetch_all(executor)
    .await
}

/// Stored alongside the draw so the exam shows how its set was produced.
pub(crate) async fn replace(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    exam_id: &str,
    rules: &[CategoryDraw],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM exam_category_rules WHERE exam_id = $1")
        .bind(exam_id)
        .execute(&mut **tx)
        .await?;

    for (index, rule) in rules.iter().enumerate() {
        sqlx::query(
            "INSERT INTO exam_category_rules (exam_id, category_id, question_count, weight, position)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(exam_id)
        .bind(&rule.category_id)
        .bind(rule.count)
        .bind(rule.weight)
        .bind(index as i32 + 1)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}
