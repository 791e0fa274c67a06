use sqlx::Postgres;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::models::{ExamPostulation, PostulationScoreRule};
use crate::services::postulations::ScoreRuleDraft;

const COLUMNS: &str = "id, exam_id, name, description, created_at, updated_at";
const RULE_COLUMNS: &str = "id, postulation_id, subtest_id, min_score, position";

pub(crate) struct PostulationFields<'a> {
    pub(crate) name: &'a str,
    pub(crate) description: Option<&'a str>,
}

pub(crate) async fn list_for_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<Vec<ExamPostulation>, sqlx::Error> {
    sqlx::query_as::<_, ExamPostulation>(&format!(
        "SELECT {COLUMNS} FROM exam_postulations WHERE exam_id = $1 ORDER BY name"
    ))
    .bind(exam_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn find_in_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    id: &str,
) -> Result<Option<ExamPostulation>, sqlx::Error> {
    sqlx::query_as::<_, ExamPostulation>(&format!(
        "SELECT {COLUMNS} FROM exam_postulations WHERE exam_id = $1 AND id = $2"
    ))
    .bind(exam_id)
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn count_for_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM exam_postulations WHERE exam_id = $1")
        .bind(exam_id)
        .fetch_one(executor)
        .await
}

pub(crate) async fn name_taken(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    name: &str,
    except_id: Option<&str>,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(
            SELECT 1 FROM exam_postulations
            WHERE exam_id = $1 AND name = $2 AND ($3::varchar IS NULL OR id <> $3)
        )",
    )
    .bind(exam_id)
    .bind(name)
    .bind(except_id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    exam_id: &str,
    fields: &PostulationFields<'_>,
    now: PrimitiveDateTime,
) -> Result<ExamPostulation, sqlx::Error> {
    sqlx::query_as::<_, ExamPostulation>(&format!(
        "INSERT INTO exam_postulations (id, exam_id, name, description, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $5)
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(exam_id)
    .bind(fields.name)
    .bind(fields.description)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    fields: &PostulationFields<'_>,
    now: PrimitiveDateTime,
) -> Result<ExamPostulation, sqlx::Error> {
    sqlx::query_as::<_, ExamPostulation>(&format!(
        "UPDATE exam_postulations SET name = $2, description = $3, updated_at = $4
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(fields.name)
    .bind(fields.description)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn delete(executor: impl sqlx::PgExecutor<'_>, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM exam_postulations WHERE id = $1").bind(id).execute(executor).await?;
    Ok(())
}

pub(crate) async fn count_rules(
    executor: impl sqlx::PgExecutor<'_>,
    postulation_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM postulation_score_rules WHERE postulation_id = $1")
        .bind(postulation_id)
        .fetch_one(executor)
        .await
}

pub(crate) async fn list_rules(
    executor: impl sqlx::PgExecutor<'_>,
    postulation_id: &str,
) -> Result<Vec<PostulationScoreRule>, sqlx::Error> {
    sqlx::query_as::<_, PostulationScoreRule>(&format!(
        "SELECT {RULE_COLUMNS} FROM postulation_score_rules
         WHERE postulation_id = $1 ORDER BY position"
    ))
    .bind(postulation_id)
    .fetch_all(executor)
    .await
}

/// Rules of every postulation in the exam, for building the exam view in one query.
pub(crate) async fn list_rules_for_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<Vec<PostulationScoreRule>, sqlx::Error> {
    sqlx::query_as::<_, PostulationScoreRule>(
        "SELECT r.id, r.postulation_id, r.subtest_id, r.min_score, r.position
         FROM postulation_score_rules r
         JOIN exam_postulations p ON p.id = r.postulation_id
         WHERE p.exam_id = $1
         ORDER BY r.postulation_id, r.position",
    )
    .bind(exam_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn replace_rules(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    postulation_id: &str,
    rules: &[ScoreRuleDraft],
) -> Result<Vec<PostulationScoreRule>, sqlx::Error> {
    sqlx::query("DELETE FROM postulation_score_rules WHERE postulation_id = $1")
        .bind(postulation_id)
        .execute(&mut **tx)
        .await?;

    let mut stored = Vec::with_capacity(rules.len());
    for (index, rule) in rules.iter().enumerate() {
        let row = sqlx::query_as::<_, PostulationScoreRule>(&format!(
            "INSERT INTO postulation_score_rules (id, postulation_id, subtest_id, min_score, position)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {RULE_COLUMNS}"
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(postulation_id)
        .bind(rule.subtest_id.as_deref())
        .bind(rule.min_score)
        .bind(index as i32 + 1)
        .fetch_one(&mut **tx)
        .await?;
        stored.push(row);
    }

    Ok(stored)
}
