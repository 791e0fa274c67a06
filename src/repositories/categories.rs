use time::PrimitiveDateTime;

use crate::db::models::Category;

const COLUMNS: &str = "id, name, description, created_at, updated_at";

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    name: &str,
    description: Option<&str>,
    now: PrimitiveDateTime,
) -> Result<Option<Category>, sqlx::Error> {
    sqlx::query_as::<_, Category>(&format!(
        "INSERT INTO categories (id, name, description, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $4)
         ON CONFLICT (name) DO NOTHING
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(now)
    .fetch_optional(executor)
    .await
}

/// Categories with the number of bank questions each one holds.
pub(crate) async fn list_with_counts(
    executor: impl sqlx::PgExecutor<'_>,
) -> Result<Vec<(Category, i64)>, sqlx::Error> {
    #[derive(sqlx::FromRow)]
    struct Row {
        #[sqlx(flatten)]
        category: Category,
        question_count: i64,
    }

    let rows = sqlx::query_as::<_, Row>(
        "SELECT c.id, c.name, c.description, c.created_at, c.updated_at,
                COUNT(q.id) AS question_count
         FROM categories c
         LEFT JOIN questions q ON q.category_id = c.id
         GROUP BY c.id
         ORDER BY c.name",
    )
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|row| (row.category, row.question_count)).collect())
}

pub(crate) async fn exists(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
        .bind(id)
        .fetch_one(executor)
        .await
}
