#![allow(dead_code)]

use axum::Router;
use mongodb::bson::{doc, Document};
use mongodb::Database;
use std::sync::Arc;
use uuid::Uuid;

use lingopath_api::{config::Config, create_router, services::AppState};

pub async fn create_test_app() -> (Router, Database) {
    // Initialize tracing for tests
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    // Load test environment from .env.test
    dotenvy::from_filename(".env.test").ok();

    // Load test configuration
    let config = Config::load().expect("Failed to load test configuration");

    eprintln!("Test config loaded - Redis URI: {}", config.redis_uri);

    // Connect to test databases
    let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri)
        .await
        .expect("Failed to connect to test MongoDB");

    let redis_client =
        redis::Client::open(config.redis_uri.clone()).expect("Failed to create test Redis client");

    // Create app state (connection is established inside)
    let app_state = Arc::new(
        AppState::new(config.clone(), mongo_client.clone(), redis_client)
            .await
            .expect("Failed to initialize test app state"),
    );

    let db = mongo_client.database(&config.mongo_database);

    // Seed test content
    seed_content(&db).await;

    (create_router(app_state), db)
}

/// Insert a learner with the given balances; returns the generated id.
pub async fn create_learner(db: &Database, hearts: i32, tokens: i32) -> String {
    let learner_id = format!("learner-{}", Uuid::new_v4());
    let now = mongodb::bson::DateTime::now();
    db.collection::<Document>("learners")
        .insert_one(doc! {
            "_id": &learner_id,
            "name": "Test Learner",
            "hearts": hearts,
            "tokens": tokens,
            "experience": 0,
            "streak": 0,
            "createdAt": now,
            "updatedAt": now,
        })
        .await
        .expect("Failed to seed learner");
    learner_id
}

async fn seed_content(db: &Database) {
    // Curriculum with two mandatory units and a final test.
    seed(
        db,
        "curricula",
        doc! { "_id": "test-curriculum", "title": "Spanish Basics", "is_active": true },
    )
    .await;

    seed(
        db,
        "units",
        doc! {
            "_id": "test-unit",
            "curriculum_id": "test-curriculum",
            "title": "Greetings",
            "is_mandatory": true,
            "is_active": true,
            "base_experience": 50,
            "sort_order": 1,
        },
    )
    .await;
    seed(
        db,
        "units",
        doc! {
            "_id": "test-unit-2",
            "curriculum_id": "test-curriculum",
            "title": "Numbers",
            "is_mandatory": true,
            "is_active": true,
            "base_experience": 40,
            "sort_order": 2,
        },
    )
    .await;

    // One question of every type under "test-unit".
    seed(
        db,
        "questions",
        doc! {
            "_id": "q-mc",
            "unit_id": "test-unit",
            "title": "How do you say 'hello'?",
            "content": { "type": "multiple_choice", "prompt": "Pick the greeting" },
            "answers": [
                { "id": "mc-a", "text": "adiós", "is_correct": false },
                { "id": "mc-b", "text": "hola", "is_correct": true },
                { "id": "mc-c", "text": "gracias", "is_correct": false },
            ],
            "is_active": true,
        },
    )
    .await;
    seed(
        db,
        "questions",
        doc! {
            "_id": "q-tf",
            "unit_id": "test-unit",
            "title": "'Buenos días' means good morning",
            "content": { "type": "true_false", "statement": "'Buenos días' means good morning" },
            "answers": [
                { "id": "tf-true", "text": "true", "is_correct": true },
                { "id": "tf-false", "text": "false", "is_correct": false },
            ],
            "is_active": true,
        },
    )
    .await;
    seed(
        db,
        "questions",
        doc! {
            "_id": "q-blank",
            "unit_id": "test-unit",
            "title": "Fill in the capital",
            "content": {
                "type": "fill_in_blank",
                "sentence": "The Aztec capital was ___",
                "correct_text": "Tenochtitlan",
            },
            "answers": [],
            "is_active": true,
        },
    )
    .await;
    seed(
        db,
        "questions",
        doc! {
            "_id": "q-order",
            "unit_id": "test-unit",
            "title": "Order the sentence",
            "content": {
                "type": "order_words",
                "words": ["the", "cat", "sat", "down"],
                "correct_sentence": "the cat sat down",
            },
            "answers": [],
            "is_active": true,
        },
    )
    .await;
    seed(
        db,
        "questions",
        doc! {
            "_id": "q-match",
            "unit_id": "test-unit",
            "title": "Match the animals",
            "content": {
                "type": "matching",
                "pairs": [
                    { "left": "perro", "right": "dog" },
                    { "left": "gato", "right": "cat" },
                ],
            },
            "answers": [],
            "is_active": true,
        },
    )
    .await;

    // A single easy question for the second unit.
    seed(
        db,
        "questions",
        doc! {
            "_id": "q2-mc",
            "unit_id": "test-unit-2",
            "title": "How do you say 'two'?",
            "content": { "type": "multiple_choice" },
            "answers": [
                { "id": "q2-a", "text": "dos", "is_correct": true },
                { "id": "q2-b", "text": "tres", "is_correct": false },
            ],
            "is_active": true,
        },
    )
    .await;

    seed(
        db,
        "final_tests",
        doc! {
            "_id": "test-final",
            "curriculum_id": "test-curriculum",
            "title": "Spanish Basics Final",
            "is_active": true,
            "passing_score": 70.0,
            "base_experience": 100,
            "question_ids": ["q-mc", "q-tf"],
        },
    )
    .await;
}

/// Insert, tolerating the duplicate key error raced in by parallel tests.
async fn seed(db: &Database, collection: &str, document: Document) {
    let result = db.collection::<Document>(collection).insert_one(document).await;
    if let Err(e) = result {
        if let mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we)) =
            *e.kind
        {
            if we.code == 11000 {
                return;
            }
        }
        panic!("Failed to seed {}: {:?}", collection, e);
    }
}
