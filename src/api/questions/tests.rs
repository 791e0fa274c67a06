use std::time::{Duration, Instant};

use axum::http::{Method, StatusCode};
use serde_json::json;

use crate::db::types::QuestionKind;
use crate::repositories::questions::NewOption;
use crate::{repositories, test_support};

fn question_body(category_id: &str, code: &str) -> serde_json::Value {
    json!({
        "code": code,
        "category_id": category_id,
        "statement": "What is 2 + 2?",
        "kind": "single",
        "year": 2024,
        "options": [
            {"label": "3", "is_correct": false},
            {"label": "4", "is_correct": true},
            {"label": "5", "is_correct": false}
        ]
    })
}

#[tokio::test]
async fn admin_manages_the_question_bank() {
    let ctx = test_support::setup_test_context().await;
    let admin = test_support::insert_admin(ctx.state.db(), "bank-admin").await;
    let token = test_support::bearer_token(&admin.id, ctx.state.settings());

    let (status, category) = test_support::send(
        &ctx,
        Method::POST,
        "/api/v1/categories",
        Some(&token),
        Some(json!({"name": "Arithmetic"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {category}");
    let category_id = category["id"].as_str().expect("category id");

    let (status, created) = test_support::send(
        &ctx,
        Method::POST,
        "/api/v1/questions",
        Some(&token),
        Some(question_body(category_id, "ARI-001")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {created}");
    let question_id = created["id"].as_str().expect("question id").to_string();
    assert_eq!(created["options"].as_array().unwrap().len(), 3);
    assert_eq!(created["options"][1]["position"], 2);

    let (status, list) = test_support::send(
        &ctx,
        Method::GET,
        &format!("/api/v1/questions?category_id={category_id}&code=ari"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {list}");
    assert_eq!(list["total_count"], 1);

    let mut replacement = question_body(category_id, "ARI-001");
    replacement["kind"] = json!("multiple");
    replacement["options"] = json!([
        {"label": "even", "is_correct": true},
        {"label": "prime", "is_correct": true}
    ]);
    let (status, updated) = test_support::send(
        &ctx,
        Method::PUT,
        &format!("/api/v1/questions/{question_id}"),
        Some(&token),
        Some(replacement),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {updated}");
    assert_eq!(updated["kind"], "multiple");
    assert_eq!(updated["options"].as_array().unwrap().len(), 2);

    let (status, categories) =
        test_support::send(&ctx, Method::GET, "/api/v1/categories", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(categories[0]["question_count"], 1);

    let (status, _) = test_support::send(
        &ctx,
        Method::DELETE,
        &format!("/api/v1/questions/{question_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = test_support::send(
        &ctx,
        Method::GET,
        &format!("/api/v1/questions/{question_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn invalid_questions_report_field_errors() {
    let ctx = test_support::setup_test_context().await;
    let admin = test_support::insert_admin(ctx.state.db(), "bank-admin").await;
    let token = test_support::bearer_token(&admin.id, ctx.state.settings());
    let category = test_support::seed_category(ctx.state.db(), "Geometry").await;

    let mut two_correct = question_body(&category.id, "GEO-001");
    two_correct["options"][0]["is_correct"] = json!(true);
    let (status, body) = test_support::send(
        &ctx,
        Method::POST,
        "/api/v1/questions",
        Some(&token),
        Some(two_correct),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "response: {body}");
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["errors"]["options"].is_array());

    let (status, _) = test_support::send(
        &ctx,
        Method::POST,
        "/api/v1/questions",
        Some(&token),
        Some(question_body(&category.id, "GEO-001")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let mut duplicate = question_body("missing-category", "GEO-001");
    duplicate["options"][2]["label"] = json!("");
    let (status, body) = test_support::send(
        &ctx,
        Method::POST,
        "/api/v1/questions",
        Some(&token),
        Some(duplicate),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "response: {body}");
    assert!(body["errors"]["options.2.label"].is_array(), "response: {body}");

    let (status, body) = test_support::send(
        &ctx,
        Method::POST,
        "/api/v1/questions",
        Some(&token),
        Some(question_body("missing-category", "GEO-001")),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "response: {body}");
    assert!(body["errors"]["code"].is_array());
    assert!(body["errors"]["category_id"].is_array());
}

#[tokio::test]
async fn teachers_cannot_touch_the_bank() {
    let ctx = test_support::setup_test_context().await;
    let teacher = test_support::insert_teacher(ctx.state.db(), "teacher-one").await;
    let token = test_support::bearer_token(&teacher.id, ctx.state.settings());

    let (status, body) =
        test_support::send(&ctx, Method::GET, "/api/v1/questions", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn question_edits_hold_off_attempt_starts_until_commit() {
    let ctx = test_support::setup_test_context().await;
    let admin = test_support::insert_admin(ctx.state.db(), "bank-admin").await;
    let teacher = test_support::insert_teacher(ctx.state.db(), "teacher-one").await;
    let admin_token = test_support::bearer_token(&admin.id, ctx.state.settings());
    let teacher_token = test_support::bearer_token(&teacher.id, ctx.state.settings());

    let category = test_support::seed_category(ctx.state.db(), "Logic").await;
    let (question, _) = test_support::seed_question(
        ctx.state.db(),
        &category.id,
        "LOG-001",
        QuestionKind::Single,
        &[("yes", true), ("no", false)],
        &admin.id,
    )
    .await;
    let exam_id =
        test_support::publish_exam(&ctx, &admin_token, json!({}), &[(&question.id, 20.0)]).await;

    let edit = async {
        let mut tx = ctx.state.db().begin().await.expect("begin");
        super::lock_for_edit(&mut tx, &question.id).await.expect("edit lock");
        tokio::time::sleep(Duration::from_millis(400)).await;
        repositories::questions::replace_options(
            &mut tx,
            &question.id,
            &[
                NewOption { label: "true", is_correct: true },
                NewOption { label: "false", is_correct: false },
            ],
        )
        .await
        .expect("replace options");
        let commit_started = Instant::now();
        tx.commit().await.expect("commit");
        commit_started
    };
    let start = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let (status, body) = test_support::send(
            &ctx,
            Method::POST,
            &format!("/api/v1/exams/{exam_id}/attempts"),
            Some(&teacher_token),
            None,
        )
        .await;
        (status, body, Instant::now())
    };
    let (commit_started, (status, started, started_at)) = tokio::join!(edit, start);

    assert_eq!(status, StatusCode::CREATED, "response: {started}");
    assert!(started_at > commit_started, "attempt started before the edit committed");

    let shown = &started["questions"][0];
    let labels: Vec<&str> = shown["options"]
        .as_array()
        .expect("options")
        .iter()
        .filter_map(|option| option["label"].as_str())
        .collect();
    assert_eq!(labels, ["true", "false"]);
    let attempt_id = started["attempt"]["id"].as_str().expect("attempt id");
    let option_id = shown["options"][0]["id"].as_str().expect("option id");

    let (status, body) = test_support::send(
        &ctx,
        Method::PATCH,
        &format!("/api/v1/attempts/{attempt_id}/answers/{}", question.id),
        Some(&teacher_token),
        Some(json!({"selected_option_ids": [option_id]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {body}");

    let (status, submitted) = test_support::send(
        &ctx,
        Method::POST,
        &format!("/api/v1/attempts/{attempt_id}/submit"),
        Some(&teacher_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {submitted}");
    assert_eq!(submitted["result"]["score"], 20.0);

    let mut replacement = question_body(&category.id, "LOG-001");
    replacement["statement"] = json!("Changed after the attempt");
    let (status, body) = test_support::send(
        &ctx,
        Method::PUT,
        &format!("/api/v1/questions/{}", question.id),
        Some(&admin_token),
        Some(replacement),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "response: {body}");
    assert_eq!(body["code"], "EXAM_LOCKED");
}
