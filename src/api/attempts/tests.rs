use axum::http::{Method, StatusCode};
use serde_json::{json, Value};
use time::Duration;

use crate::core::time::primitive_now_utc;
use crate::db::types::QuestionKind;
use crate::test_support::{self, TestContext};

struct Setup {
    admin_token: String,
    teacher_token: String,
    exam_id: String,
}

/// Two single-choice questions worth 10 each; threshold 11, so one right answer fails.
async fn published_exam(ctx: &TestContext) -> Setup {
    let admin = test_support::insert_admin(ctx.state.db(), "exam-admin").await;
    let teacher = test_support::insert_teacher(ctx.state.db(), "teacher-one").await;
    let admin_token = test_support::bearer_token(&admin.id, ctx.state.settings());
    let teacher_token = test_support::bearer_token(&teacher.id, ctx.state.settings());

    let category = test_support::seed_category(ctx.state.db(), "Logic").await;
    let mut ids = Vec::new();
    for code in ["LOG-001", "LOG-002"] {
        let (question, _) = test_support::seed_question(
            ctx.state.db(),
            &category.id,
            code,
            QuestionKind::Single,
            &[("yes", true), ("no", false)],
            &admin.id,
        )
        .await;
        ids.push(question.id);
    }

    let exam_id = test_support::publish_exam(
        ctx,
        &admin_token,
        json!({}),
        &[(&ids[0], 10.0), (&ids[1], 10.0)],
    )
    .await;

    Setup { admin_token, teacher_token, exam_id }
}

fn option_id(question: &Value, label: &str) -> String {
    question["options"]
        .as_array()
        .expect("options")
        .iter()
        .find(|option| option["label"] == label)
        .and_then(|option| option["id"].as_str())
        .expect("option id")
        .to_string()
}

async fn start(ctx: &TestContext, setup: &Setup) -> (StatusCode, Value) {
    test_support::send(
        ctx,
        Method::POST,
        &format!("/api/v1/exams/{}/attempts", setup.exam_id),
        Some(&setup.teacher_token),
        None,
    )
    .await
}

async fn answer(
    ctx: &TestContext,
    token: &str,
    attempt_id: &str,
    question_id: &str,
    selected: &[String],
) -> (StatusCode, Value) {
    test_support::send(
        ctx,
        Method::PATCH,
        &format!("/api/v1/attempts/{attempt_id}/answers/{question_id}"),
        Some(token),
        Some(json!({"selected_option_ids": selected})),
    )
    .await
}

async fn expire(ctx: &TestContext, attempt_id: &str) {
    sqlx::query("UPDATE attempts SET deadline_at = $2 WHERE id = $1")
        .bind(attempt_id)
        .bind(primitive_now_utc() - Duration::minutes(1))
        .execute(ctx.state.db())
        .await
        .expect("move deadline");
}

#[tokio::test]
async fn teacher_takes_an_exam_end_to_end() {
    let ctx = test_support::setup_test_context().await;
    let setup = published_exam(&ctx).await;

    let (status, started) = start(&ctx, &setup).await;
    assert_eq!(status, StatusCode::CREATED, "response: {started}");
    assert_eq!(started["attempt"]["state"], "in_progress");
    assert_eq!(started["attempt"]["attempt_number"], 1);
    assert_eq!(started["question_count"], 2);
    assert!(started["questions"][0]["options"][0].get("is_correct").is_none());
    let attempt_id = started["attempt"]["id"].as_str().expect("attempt id").to_string();

    let first = &started["questions"][0];
    let second = &started["questions"][1];
    let first_id = first["question_id"].as_str().unwrap();
    let second_id = second["question_id"].as_str().unwrap();

    let (status, body) = answer(
        &ctx,
        &setup.teacher_token,
        &attempt_id,
        first_id,
        &[option_id(first, "yes"), option_id(first, "no")],
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "response: {body}");

    let (status, body) =
        answer(&ctx, &setup.teacher_token, &attempt_id, first_id, &[option_id(first, "yes")])
            .await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    let (status, _) =
        answer(&ctx, &setup.teacher_token, &attempt_id, second_id, &[option_id(second, "no")])
            .await;
    assert_eq!(status, StatusCode::OK);

    let (status, navigation) = test_support::send(
        &ctx,
        Method::GET,
        &format!("/api/v1/attempts/{attempt_id}"),
        Some(&setup.teacher_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(navigation["answered_count"], 2);
    assert_eq!(navigation["questions"][0]["question_id"], first_id);

    let (status, body) = start(&ctx, &setup).await;
    assert_eq!(status, StatusCode::CONFLICT, "response: {body}");
    assert_eq!(body["code"], "ATTEMPT_ALREADY_IN_PROGRESS");

    let (status, submitted) = test_support::send(
        &ctx,
        Method::POST,
        &format!("/api/v1/attempts/{attempt_id}/submit"),
        Some(&setup.teacher_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {submitted}");
    assert_eq!(submitted["attempt"]["state"], "submitted");
    assert_eq!(submitted["result"]["score"], 10.0);
    assert_eq!(submitted["result"]["max_score"], 20.0);
    assert_eq!(submitted["result"]["passed"], false);
    assert_eq!(submitted["result"]["correct_count"], 1);

    let (status, body) = test_support::send(
        &ctx,
        Method::POST,
        &format!("/api/v1/attempts/{attempt_id}/submit"),
        Some(&setup.teacher_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ATTEMPT_CLOSED");

    let (status, result) = test_support::send(
        &ctx,
        Method::GET,
        &format!("/api/v1/attempts/{attempt_id}/result"),
        Some(&setup.teacher_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["breakdown"].as_array().unwrap().len(), 2);

    let (status, body) = start(&ctx, &setup).await;
    assert_eq!(status, StatusCode::CONFLICT, "response: {body}");
    assert_eq!(body["code"], "ATTEMPT_LIMIT_REACHED");
}

#[tokio::test]
async fn voided_attempts_free_the_slot_but_keep_the_ordinal() {
    let ctx = test_support::setup_test_context().await;
    let setup = published_exam(&ctx).await;

    let (_, started) = start(&ctx, &setup).await;
    let attempt_id = started["attempt"]["id"].as_str().expect("attempt id").to_string();
    let (status, _) = test_support::send(
        &ctx,
        Method::POST,
        &format!("/api/v1/attempts/{attempt_id}/submit"),
        Some(&setup.teacher_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = test_support::send(
        &ctx,
        Method::POST,
        &format!("/api/v1/attempts/{attempt_id}/void"),
        Some(&setup.teacher_token),
        Some(json!({"reason": "Proctor flagged the session"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "response: {body}");

    let (status, voided) = test_support::send(
        &ctx,
        Method::POST,
        &format!("/api/v1/attempts/{attempt_id}/void"),
        Some(&setup.admin_token),
        Some(json!({"reason": "Proctor flagged the session"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {voided}");
    assert_eq!(voided["state"], "voided");
    assert_eq!(voided["void_reason"], "Proctor flagged the session");

    let (status, results) = test_support::send(
        &ctx,
        Method::GET,
        &format!("/api/v1/exams/{}/results", setup.exam_id),
        Some(&setup.admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {results}");
    assert_eq!(results["total_count"], 1);
    assert_eq!(results["items"][0]["voided"], true);

    let (status, again) = start(&ctx, &setup).await;
    assert_eq!(status, StatusCode::CREATED, "response: {again}");
    assert_eq!(again["attempt"]["attempt_number"], 2);
}

#[tokio::test]
async fn late_answers_close_the_attempt_instead_of_saving() {
    let ctx = test_support::setup_test_context().await;
    let setup = published_exam(&ctx).await;

    let (_, started) = start(&ctx, &setup).await;
    let attempt_id = started["attempt"]["id"].as_str().expect("attempt id").to_string();
    let question = &started["questions"][0];
    let question_id = question["question_id"].as_str().unwrap();
    let (status, _) = answer(
        &ctx,
        &setup.teacher_token,
        &attempt_id,
        question_id,
        &[option_id(question, "yes")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    expire(&ctx, &attempt_id).await;
    let (status, body) = answer(
        &ctx,
        &setup.teacher_token,
        &attempt_id,
        question_id,
        &[option_id(question, "no")],
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "response: {body}");
    assert_eq!(body["code"], "TIME_EXPIRED");

    let (status, result) = test_support::send(
        &ctx,
        Method::GET,
        &format!("/api/v1/attempts/{attempt_id}/result"),
        Some(&setup.teacher_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {result}");
    assert_eq!(result["score"], 10.0);
    assert_eq!(result["answered_count"], 1);

    let (_, navigation) = test_support::send(
        &ctx,
        Method::GET,
        &format!("/api/v1/attempts/{attempt_id}"),
        Some(&setup.teacher_token),
        None,
    )
    .await;
    assert_eq!(navigation["attempt"]["state"], "submitted");
    assert_eq!(navigation["attempt"]["completed_at"], navigation["attempt"]["deadline_at"]);
    assert_eq!(navigation["attempt"]["remaining_seconds"], 0);
}

#[tokio::test]
async fn finalizing_the_exam_submits_open_attempts() {
    let ctx = test_support::setup_test_context().await;
    let setup = published_exam(&ctx).await;

    let (_, started) = start(&ctx, &setup).await;
    let attempt_id = started["attempt"]["id"].as_str().expect("attempt id").to_string();

    let (status, body) = test_support::send(
        &ctx,
        Method::POST,
        &format!("/api/v1/exams/{}/finalize", setup.exam_id),
        Some(&setup.admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {body}");

    let (status, result) = test_support::send(
        &ctx,
        Method::GET,
        &format!("/api/v1/attempts/{attempt_id}/result"),
        Some(&setup.teacher_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {result}");
    assert_eq!(result["score"], 0.0);
    assert_eq!(result["answered_count"], 0);

    let (status, body) = start(&ctx, &setup).await;
    assert_eq!(status, StatusCode::CONFLICT, "response: {body}");
    assert_eq!(body["code"], "EXAM_NOT_AVAILABLE");
}

#[tokio::test]
async fn only_the_owner_may_answer() {
    let ctx = test_support::setup_test_context().await;
    let setup = published_exam(&ctx).await;
    let other = test_support::insert_teacher(ctx.state.db(), "teacher-two").await;
    let other_token = test_support::bearer_token(&other.id, ctx.state.settings());

    let (_, started) = start(&ctx, &setup).await;
    let attempt_id = started["attempt"]["id"].as_str().expect("attempt id").to_string();
    let question = &started["questions"][0];

    let (status, body) = answer(
        &ctx,
        &other_token,
        &attempt_id,
        question["question_id"].as_str().unwrap(),
        &[option_id(question, "yes")],
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "response: {body}");

    let (status, _) = test_support::send(
        &ctx,
        Method::GET,
        &format!("/api/v1/attempts/{attempt_id}"),
        Some(&other_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn simultaneous_starts_open_a_single_attempt() {
    let ctx = test_support::setup_test_context().await;
    let setup = published_exam(&ctx).await;

    let ((first, first_body), (second, second_body)) =
        tokio::join!(start(&ctx, &setup), start(&ctx, &setup));

    let mut statuses = [first, second];
    statuses.sort();
    assert_eq!(
        statuses,
        [StatusCode::CREATED, StatusCode::CONFLICT],
        "responses: {first_body} / {second_body}"
    );
    let loser = if first == StatusCode::CONFLICT { &first_body } else { &second_body };
    assert_eq!(loser["code"], "ATTEMPT_ALREADY_IN_PROGRESS");

    let open: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM attempts WHERE exam_id = $1 AND state = 'in_progress'",
    )
    .bind(&setup.exam_id)
    .fetch_one(ctx.state.db())
    .await
    .expect("count attempts");
    assert_eq!(open, 1);
}

async fn stored_selection(
    ctx: &TestContext,
    token: &str,
    attempt_id: &str,
    question_id: &str,
) -> Value {
    let (status, navigation) = test_support::send(
        ctx,
        Method::GET,
        &format!("/api/v1/attempts/{attempt_id}"),
        Some(token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {navigation}");
    navigation["questions"]
        .as_array()
        .expect("questions")
        .iter()
        .find(|question| question["question_id"] == question_id)
        .map(|question| question["selected_option_ids"].clone())
        .expect("question in navigation")
}

#[tokio::test]
async fn answers_replace_the_previous_selection() {
    let ctx = test_support::setup_test_context().await;
    let setup = published_exam(&ctx).await;

    let (_, started) = start(&ctx, &setup).await;
    let attempt_id = started["attempt"]["id"].as_str().expect("attempt id").to_string();
    let question = &started["questions"][0];
    let question_id = question["question_id"].as_str().unwrap();
    let yes = option_id(question, "yes");
    let no = option_id(question, "no");

    for _ in 0..2 {
        let (status, body) =
            answer(&ctx, &setup.teacher_token, &attempt_id, question_id, &[yes.clone()]).await;
        assert_eq!(status, StatusCode::OK, "response: {body}");
        assert_eq!(body["selected_option_ids"], json!([yes]));
    }

    let rows: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM attempt_answers WHERE attempt_id = $1 AND question_id = $2",
    )
    .bind(&attempt_id)
    .bind(question_id)
    .fetch_one(ctx.state.db())
    .await
    .expect("count answers");
    assert_eq!(rows, 1);
    assert_eq!(
        stored_selection(&ctx, &setup.teacher_token, &attempt_id, question_id).await,
        json!([yes])
    );

    let (status, body) =
        answer(&ctx, &setup.teacher_token, &attempt_id, question_id, &[no.clone()]).await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    assert_eq!(
        stored_selection(&ctx, &setup.teacher_token, &attempt_id, question_id).await,
        json!([no])
    );

    let (status, body) = answer(&ctx, &setup.teacher_token, &attempt_id, question_id, &[]).await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    assert_eq!(
        stored_selection(&ctx, &setup.teacher_token, &attempt_id, question_id).await,
        json!([])
    );
}
