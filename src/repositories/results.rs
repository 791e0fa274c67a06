use sqlx::types::Json;
use time::PrimitiveDateTime;

use crate::db::models::ExamResult;
use crate::services::scoring::ScoreSummary;

const COLUMNS: &str = "\
    id, attempt_id, exam_id, user_id, score, max_score, passed, correct_count, answered_count, \
    question_count, time_used_seconds, breakdown, ip_address, user_agent, created_at";

pub(crate) struct CreateResult<'a> {
    pub(crate) id: &'a str,
    pub(crate) attempt_id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) user_id: &'a str,
    pub(crate) summary: &'a ScoreSummary,
    pub(crate) time_used_seconds: i64,
    pub(crate) ip_address: Option<&'a str>,
    pub(crate) user_agent: Option<&'a str>,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ExamResultRow {
    #[sqlx(flatten)]
    pub(crate) result: ExamResult,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) attempt_number: i32,
    pub(crate) voided: bool,
}

/// Results are append-only: a second insert for the same attempt is ignored.
pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateResult<'_>,
) -> Result<Option<ExamResult>, sqlx::Error> {
    sqlx::query_as::<_, ExamResult>(&format!(
        "INSERT INTO results (
            id, attempt_id, exam_id, user_id, score, max_score, passed, correct_count,
            answered_count, question_count, time_used_seconds, breakdown, ip_address,
            user_agent, created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)
        ON CONFLICT (attempt_id) DO NOTHING
        RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.attempt_id)
    .bind(params.exam_id)
    .bind(params.user_id)
    .bind(params.summary.score)
    .bind(params.summary.max_score)
    .bind(params.summary.passed)
    .bind(params.summary.correct_count)
    .bind(params.summary.answered_count)
    .bind(params.summary.question_count)
    .bind(params.time_used_seconds)
    .bind(Json(&params.summary.breakdown))
    .bind(params.ip_address)
    .bind(params.user_agent)
    .bind(params.created_at)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_by_attempt(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
) -> Result<Option<ExamResult>, sqlx::Error> {
    sqlx::query_as::<_, ExamResult>(&format!(
        "SELECT {COLUMNS} FROM results WHERE attempt_id = $1"
    ))
    .bind(attempt_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_for_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    skip: i64,
    limit: i64,
) -> Result<Vec<ExamResultRow>, sqlx::Error> {
    sqlx::query_as::<_, ExamResultRow>(
        "SELECT r.id, r.attempt_id, r.exam_id, r.user_id, r.score, r.max_score, r.passed,
                r.correct_count, r.answered_count, r.question_count, r.time_used_seconds,
                r.breakdown, r.ip_address, r.user_agent, r.created_at,
                u.username, u.full_name, a.attempt_number,
                (a.state = 'voided') AS voided
         FROM results r
         JOIN attempts a ON a.id = r.attempt_id
         JOIN users u ON u.id = r.user_id
         WHERE r.exam_id = $1
         ORDER BY r.created_at DESC
         OFFSET $2 LIMIT $3",
    )
    .bind(exam_id)
    .bind(skip.max(0))
    .bind(limit.clamp(1, 1000))
    .fetch_all(executor)
    .await
}

pub(crate) async fn count_for_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM results WHERE exam_id = $1")
        .bind(exam_id)
        .fetch_one(executor)
        .await
}
