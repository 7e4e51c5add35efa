mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn start_attempt(app: &Router, learner_id: &str, kind: &str, target_id: &str) -> Value {
    let (status, json) = post_json(
        app,
        "/api/v1/attempts",
        json!({ "learner_id": learner_id, "kind": kind, "target_id": target_id }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "start failed: {}", json);
    json
}

/// The seeded correct submission for each test question.
fn correct_value(question_id: &str) -> Value {
    match question_id {
        "q-mc" => json!("mc-b"),
        "q-tf" => json!("tf-true"),
        "q-blank" => json!("Tenochtitlan"),
        "q-order" => json!(["the", "cat", "sat", "down"]),
        "q-match" => json!([
            { "left": "perro", "right": "dog" },
            { "left": "gato", "right": "cat" },
        ]),
        "q2-mc" => json!("q2-a"),
        other => panic!("unknown question id {}", other),
    }
}

fn wrong_value(question_id: &str) -> Value {
    match question_id {
        "q-mc" => json!("mc-a"),
        "q-tf" => json!("tf-false"),
        "q-blank" => json!("Teotihuacan"),
        "q-order" => json!(["cat", "the", "sat", "down"]),
        "q-match" => json!([
            { "left": "perro", "right": "cat" },
            { "left": "gato", "right": "dog" },
        ]),
        "q2-mc" => json!("q2-b"),
        other => panic!("unknown question id {}", other),
    }
}

async fn submit(
    app: &Router,
    attempt_id: &str,
    question_id: &str,
    value: Value,
    seconds: u32,
) -> (StatusCode, Value) {
    post_json(
        app,
        &format!("/api/v1/attempts/{}/answers", attempt_id),
        json!({
            "question_id": question_id,
            "value": value,
            "seconds_spent": seconds,
            "idempotency_key": format!("{}:{}:{}", attempt_id, question_id, uuid::Uuid::new_v4()),
        }),
    )
    .await
}

fn question_ids(start_response: &Value) -> Vec<String> {
    start_response["questions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_start_unit_attempt_returns_sanitized_questions() {
    let (app, db) = common::create_test_app().await;
    let learner_id = common::create_learner(&db, 5, 0).await;

    let started = start_attempt(&app, &learner_id, "unit", "test-unit").await;

    assert_eq!(started["total_questions"], 5);
    let questions = started["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 5);

    // Correctness flags must never reach the client.
    for question in questions {
        for option in question["options"].as_array().unwrap() {
            assert!(option.get("is_correct").is_none());
        }
        assert!(question["content"].get("correct_text").is_none());
        assert!(question["content"].get("correct_sentence").is_none());
        assert!(question["content"].get("pairs").is_none());
    }
}

#[tokio::test]
async fn test_start_rejects_unknown_learner_and_target() {
    let (app, db) = common::create_test_app().await;

    let (status, _) = post_json(
        &app,
        "/api/v1/attempts",
        json!({ "learner_id": "no-such-learner", "kind": "unit", "target_id": "test-unit" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let learner_id = common::create_learner(&db, 5, 0).await;
    let (status, _) = post_json(
        &app,
        "/api/v1/attempts",
        json!({ "learner_id": learner_id, "kind": "unit", "target_id": "no-such-unit" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submit_wrong_answer_debits_one_heart() {
    let (app, db) = common::create_test_app().await;
    let learner_id = common::create_learner(&db, 5, 0).await;

    let started = start_attempt(&app, &learner_id, "unit", "test-unit").await;
    let attempt_id = started["attempt_id"].as_str().unwrap();

    let (status, body) = submit(&app, attempt_id, "q-mc", correct_value("q-mc"), 10).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["correct"], true);
    assert_eq!(body["hearts_remaining"], 5);

    let (status, body) = submit(&app, attempt_id, "q-tf", wrong_value("q-tf"), 10).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["correct"], false);
    assert_eq!(body["hearts_remaining"], 4);
}

#[tokio::test]
async fn test_hearts_never_go_negative() {
    let (app, db) = common::create_test_app().await;
    let learner_id = common::create_learner(&db, 1, 0).await;

    let started = start_attempt(&app, &learner_id, "unit", "test-unit").await;
    let attempt_id = started["attempt_id"].as_str().unwrap();

    let (_, body) = submit(&app, attempt_id, "q-mc", wrong_value("q-mc"), 5).await;
    assert_eq!(body["hearts_remaining"], 0);

    // Already at zero: stays at zero, no error.
    let (status, body) = submit(&app, attempt_id, "q-tf", wrong_value("q-tf"), 5).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hearts_remaining"], 0);
}

#[tokio::test]
async fn test_resume_reproduces_the_question_order() {
    let (app, db) = common::create_test_app().await;
    let learner_id = common::create_learner(&db, 5, 0).await;

    let started = start_attempt(&app, &learner_id, "unit", "test-unit").await;
    let attempt_id = started["attempt_id"].as_str().unwrap();
    let order = question_ids(&started);

    // Answer the first two questions in presentation order.
    submit(&app, attempt_id, &order[0], correct_value(&order[0]), 10).await;
    submit(&app, attempt_id, &order[1], wrong_value(&order[1]), 10).await;

    let (status, resumed) = get_json(
        &app,
        &format!("/api/v1/attempts/{}?learner_id={}", attempt_id, learner_id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Exact original order, regardless of how many answers were submitted.
    assert_eq!(question_ids(&resumed), order);
    assert_eq!(resumed["resume_index"], 2);

    let answers = resumed["answers"].as_object().unwrap();
    assert_eq!(answers.len(), 2);
    assert_eq!(answers[&order[0]]["is_correct"], true);
    assert_eq!(answers[&order[1]]["is_correct"], false);
}

#[tokio::test]
async fn test_resume_requires_the_owning_learner() {
    let (app, db) = common::create_test_app().await;
    let learner_id = common::create_learner(&db, 5, 0).await;
    let intruder_id = common::create_learner(&db, 5, 0).await;

    let started = start_attempt(&app, &learner_id, "unit", "test-unit").await;
    let attempt_id = started["attempt_id"].as_str().unwrap();

    let (status, _) = get_json(
        &app,
        &format!("/api/v1/attempts/{}?learner_id={}", attempt_id, intruder_id),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_complete_scores_the_attempt_and_is_idempotent() {
    let (app, db) = common::create_test_app().await;
    let learner_id = common::create_learner(&db, 5, 0).await;

    let started = start_attempt(&app, &learner_id, "unit", "test-unit").await;
    let attempt_id = started["attempt_id"].as_str().unwrap();

    // All five correct, 30 seconds each: elapsed equals the ideal budget.
    for question_id in question_ids(&started) {
        let (status, body) =
            submit(&app, attempt_id, &question_id, correct_value(&question_id), 30).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["correct"], true, "question {}", question_id);
    }

    let (status, completed) =
        post_json(&app, &format!("/api/v1/attempts/{}/complete", attempt_id), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed["score"], 100.0);
    assert_eq!(completed["correct_answers"], 5);
    assert_eq!(completed["total_questions"], 5);
    assert_eq!(completed["passed"], true);

    // base 30 + accuracy 15 + speed 5 + perfect 10, no retries, first run.
    let experience = &completed["experience"];
    assert_eq!(experience["base"], 30);
    assert_eq!(experience["accuracy_bonus"], 15);
    assert_eq!(experience["speed_bonus"], 5);
    assert_eq!(experience["perfect_bonus"], 10);
    assert_eq!(experience["total"], 60);

    // Second completion is rejected and changes nothing.
    let (status, _) =
        post_json(&app, &format!("/api/v1/attempts/{}/complete", attempt_id), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The attempt is now closed to submissions as well.
    let (status, _) = submit(&app, attempt_id, "q-mc", correct_value("q-mc"), 5).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, economy) = get_json(&app, &format!("/api/v1/learners/{}/economy", learner_id)).await;
    assert_eq!(economy["experience"], 60);
    assert_eq!(economy["streak"], 1);
}

#[tokio::test]
async fn test_unit_recompletion_grants_no_second_award() {
    let (app, db) = common::create_test_app().await;
    let learner_id = common::create_learner(&db, 5, 0).await;

    for round in 0..2 {
        let started = start_attempt(&app, &learner_id, "unit", "test-unit").await;
        let attempt_id = started["attempt_id"].as_str().unwrap().to_string();
        for question_id in question_ids(&started) {
            submit(&app, &attempt_id, &question_id, correct_value(&question_id), 30).await;
        }
        let (status, completed) =
            post_json(&app, &format!("/api/v1/attempts/{}/complete", attempt_id), json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(completed["passed"], true);
        if round == 0 {
            assert!(completed.get("experience").is_some());
        } else {
            // Already completed: the pass stands but nothing is re-granted.
            assert!(completed.get("experience").is_none());
        }
    }

    let (_, economy) = get_json(&app, &format!("/api/v1/learners/{}/economy", learner_id)).await;
    assert_eq!(economy["experience"], 60);
    assert_eq!(economy["streak"], 1);
}

#[tokio::test]
async fn test_review_attempt_draws_from_missed_questions() {
    let (app, db) = common::create_test_app().await;
    let learner_id = common::create_learner(&db, 5, 0).await;

    // No missed questions yet: nothing to review.
    let (status, _) = post_json(
        &app,
        "/api/v1/attempts",
        json!({ "learner_id": learner_id, "kind": "review", "target_id": "test-curriculum" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Miss one question in a unit attempt.
    let started = start_attempt(&app, &learner_id, "unit", "test-unit").await;
    let attempt_id = started["attempt_id"].as_str().unwrap();
    submit(&app, attempt_id, "q-mc", wrong_value("q-mc"), 5).await;

    let reviewed = start_attempt(&app, &learner_id, "review", "test-curriculum").await;
    let ids = question_ids(&reviewed);
    assert!(ids.contains(&"q-mc".to_string()));
    assert!(ids.len() <= 10);
}
