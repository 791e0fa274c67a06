use sqlx::{Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::{Question, QuestionOption};
use crate::db::types::QuestionKind;

const COLUMNS: &str = "\
    id, code, category_id, context_id, statement, kind, year, created_by, created_at, updated_at";

const OPTION_COLUMNS: &str = "id, question_id, label, is_correct, position";

pub(crate) struct QuestionFields<'a> {
    pub(crate) code: &'a str,
    pub(crate) category_id: &'a str,
    pub(crate) context_id: Option<&'a str>,
    pub(crate) statement: &'a str,
    pub(crate) kind: QuestionKind,
    pub(crate) year: Option<i32>,
}

pub(crate) struct NewOption<'a> {
    pub(crate) label: &'a str,
    pub(crate) is_correct: bool,
}

#[derive(Debug, Default)]
pub(crate) struct QuestionFilter<'a> {
    pub(crate) category_id: Option<&'a str>,
    pub(crate) year: Option<i32>,
    pub(crate) code: Option<&'a str>,
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!("SELECT {COLUMNS} FROM questions WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn list_by_ids(
    executor: impl sqlx::PgExecutor<'_>,
    ids: &[String],
) -> Result<Vec<Question>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, Question>(&format!("SELECT {COLUMNS} FROM questions WHERE id = ANY($1)"))
        .bind(ids)
        .fetch_all(executor)
        .await
}

pub(crate) async fn lock_for_update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {COLUMNS} FROM questions WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn code_taken(
    executor: impl sqlx::PgExecutor<'_>,
    code: &str,
    except_id: Option<&str>,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM questions WHERE code = $1 AND ($2::varchar IS NULL OR id <> $2))",
    )
    .bind(code)
    .bind(except_id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    fields: &QuestionFields<'_>,
    created_by: &str,
    now: PrimitiveDateTime,
) -> Result<Question, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "INSERT INTO questions (
            id, code, category_id, context_id, statement, kind, year, created_by,
            created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$9)
        RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(fields.code)
    .bind(fields.category_id)
    .bind(fields.context_id)
    .bind(fields.statement)
    .bind(fields.kind)
    .bind(fields.year)
    .bind(created_by)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    fields: &QuestionFields<'_>,
    now: PrimitiveDateTime,
) -> Result<Question, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "UPDATE questions
         SET code = $2, category_id = $3, context_id = $4, statement = $5, kind = $6,
             year = $7, updated_at = $8
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(fields.code)
    .bind(fields.category_id)
    .bind(fields.context_id)
    .bind(fields.statement)
    .bind(fields.kind)
    .bind(fields.year)
    .bind(now)
    .fetch_one(executor)
    .await
}

/// Replaces the whole option set; positions follow slice order starting at 1.
pub(crate) async fn replace_options(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    question_id: &str,
    options: &[NewOption<'_>],
) -> Result<Vec<QuestionOption>, sqlx::Error> {
    sqlx::query("DELETE FROM question_options WHERE question_id = $1")
        .bind(question_id)
        .execute(&mut **tx)
        .await?;

    let mut created = Vec::with_capacity(options.len());
    for (index, option) in options.iter().enumerate() {
        let row = sqlx::query_as::<_, QuestionOption>(&format!(
            "INSERT INTO question_options (id, question_id, label, is_correct, position)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {OPTION_COLUMNS}"
        ))
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(question_id)
        .bind(option.label.trim())
        .bind(option.is_correct)
        .bind(index as i32 + 1)
        .fetch_one(&mut **tx)
        .await?;
        created.push(row);
    }

    Ok(created)
}

pub(crate) async fn list_options(
    executor: impl sqlx::PgExecutor<'_>,
    question_ids: &[String],
) -> Result<Vec<QuestionOption>, sqlx::Error> {
    if question_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, QuestionOption>(&format!(
        "SELECT {OPTION_COLUMNS} FROM question_options
         WHERE question_id = ANY($1)
         ORDER BY question_id, position"
    ))
    .bind(question_ids)
    .fetch_all(executor)
    .await
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &QuestionFilter<'_>) {
    builder.push(" WHERE TRUE");
    if let Some(category_id) = filter.category_id {
        builder.push(" AND category_id = ");
        builder.push_bind(category_id.to_string());
    }
    if let Some(year) = filter.year {
        builder.push(" AND year = ");
        builder.push_bind(year);
    }
    if let Some(code) = filter.code {
        builder.push(" AND code ILIKE ");
        builder.push_bind(format!("%{}%", code.replace('%', "\\%").replace('_', "\\_")));
    }
}

pub(crate) async fn list(
    executor: impl sqlx::PgExecutor<'_>,
    filter: &QuestionFilter<'_>,
    skip: i64,
    limit: i64,
) -> Result<Vec<Question>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM questions"));
    push_filters(&mut builder, filter);
    builder.push(" ORDER BY created_at DESC, code OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<Question>().fetch_all(executor).await
}

pub(crate) async fn count(
    executor: impl sqlx::PgExecutor<'_>,
    filter: &QuestionFilter<'_>,
) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM questions");
    push_filters(&mut builder, filter);
    builder.build_query_scalar::<i64>().fetch_one(executor).await
}

pub(crate) async fn delete(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM questions WHERE id = $1").bind(id).execute(executor).await?;
    Ok(())
}

/// Number of exams whose committed set includes the question.
pub(crate) async fn count_exam_refs(
    executor: impl sqlx::PgExecutor<'_>,
    question_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(DISTINCT exam_id) FROM exam_questions WHERE question_id = $1")
        .bind(question_id)
        .fetch_one(executor)
        .await
}

/// Number of referencing exams that are attempt-locked.
pub(crate) async fn count_locked_exam_refs(
    executor: impl sqlx::PgExecutor<'_>,
    question_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(DISTINCT eq.exam_id)
         FROM exam_questions eq
         WHERE eq.question_id = $1
           AND EXISTS (SELECT 1 FROM attempts a WHERE a.exam_id = eq.exam_id)",
    )
    .bind(question_id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn existing_ids(
    executor: impl sqlx::PgExecutor<'_>,
    ids: &[String],
) -> Result<Vec<String>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_scalar::<_, String>("SELECT id FROM questions WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(executor)
        .await
}

/// `(category_id, question_id)` pairs for the random-draw pools.
pub(crate) async fn ids_by_categories(
    executor: impl sqlx::PgExecutor<'_>,
    category_ids: &[String],
) -> Result<Vec<(String, String)>, sqlx::Error> {
    if category_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, (String, String)>(
        "SELECT category_id, id FROM questions WHERE category_id = ANY($1) ORDER BY code",
    )
    .bind(category_ids)
    .fetch_all(executor)
    .await
}
