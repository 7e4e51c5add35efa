#![allow(dead_code)]

use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod errors;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

pub fn create_router(app_state: std::sync::Arc<services::AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any); // TODO: restrict to specific origins in production

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/v1/attempts", attempts_routes())
        .nest("/api/v1/hearts", hearts_routes())
        .nest("/api/v1/learners", learners_routes())
        .with_state(app_state)
        .layer(cors)
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn attempts_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route("/", post(handlers::attempts::start_attempt))
        .route("/{id}", get(handlers::attempts::resume_attempt))
        .route("/{id}/answers", post(handlers::attempts::submit_answer))
        .route("/{id}/complete", post(handlers::attempts::complete_attempt))
}

fn hearts_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new().route("/purchase", post(handlers::economy::purchase_hearts))
}

fn learners_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new().route("/{id}/economy", get(handlers::economy::get_economy))
}
