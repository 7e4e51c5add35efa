mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn purchase(app: &Router, learner_id: &str, hearts: u32) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/hearts/purchase")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_string(&json!({ "learner_id": learner_id, "hearts": hearts }))
                        .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn balances(app: &Router, learner_id: &str) -> Value {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/learners/{}/economy", learner_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_purchase_exchanges_tokens_for_hearts() {
    let (app, db) = common::create_test_app().await;
    let learner_id = common::create_learner(&db, 2, 100).await;

    // 3 hearts at 10 tokens each.
    let (status, body) = purchase(&app, &learner_id, 3).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hearts"], 5);
    assert_eq!(body["tokens"], 70);

    let economy = balances(&app, &learner_id).await;
    assert_eq!(economy["hearts"], 5);
    assert_eq!(economy["tokens"], 70);
}

#[tokio::test]
async fn test_purchase_over_capacity_is_rejected_with_balances_unchanged() {
    let (app, db) = common::create_test_app().await;
    let learner_id = common::create_learner(&db, 4, 100).await;

    // 4 + 2 would exceed the 5-heart cap: no partial fill.
    let (status, _) = purchase(&app, &learner_id, 2).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let economy = balances(&app, &learner_id).await;
    assert_eq!(economy["hearts"], 4);
    assert_eq!(economy["tokens"], 100);
}

#[tokio::test]
async fn test_purchase_without_funds_is_rejected_with_balances_unchanged() {
    let (app, db) = common::create_test_app().await;
    let learner_id = common::create_learner(&db, 0, 5).await;

    let (status, _) = purchase(&app, &learner_id, 1).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

    let economy = balances(&app, &learner_id).await;
    assert_eq!(economy["hearts"], 0);
    assert_eq!(economy["tokens"], 5);
}

#[tokio::test]
async fn test_purchase_validation_and_unknown_learner() {
    let (app, db) = common::create_test_app().await;

    let (status, _) = purchase(&app, "no-such-learner", 1).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let learner_id = common::create_learner(&db, 0, 100).await;
    let (status, _) = purchase(&app, &learner_id, 0).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
