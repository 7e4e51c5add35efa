use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::{
    errors::EngineError,
    extractors::AppJson,
    models::attempt::{ResumeQuery, StartAttemptRequest, SubmitAnswerRequest},
    services::{attempt_service::AttemptService, AppState},
};

fn attempt_service(state: &AppState) -> AttemptService {
    AttemptService::new(state.mongo.clone(), state.redis.clone(), state.reward.clone())
}

pub async fn start_attempt(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<StartAttemptRequest>,
) -> Result<impl IntoResponse, EngineError> {
    req.validate()
        .map_err(|e| EngineError::Validation(e.to_string()))?;

    tracing::info!(
        "Starting {} attempt for learner_id={}, target_id={}",
        req.kind.as_str(),
        req.learner_id,
        req.target_id
    );

    let response = attempt_service(&state).start(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
    AppJson(req): AppJson<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, EngineError> {
    req.validate()
        .map_err(|e| EngineError::Validation(e.to_string()))?;

    tracing::info!("Submitting answer for attempt: {}", attempt_id);

    let response = attempt_service(&state).submit(&attempt_id, &req).await?;
    Ok((StatusCode::OK, Json(response)))
}

pub async fn resume_attempt(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
    Query(query): Query<ResumeQuery>,
) -> Result<impl IntoResponse, EngineError> {
    tracing::info!(
        "Resuming attempt {} for learner {}",
        attempt_id,
        query.learner_id
    );

    let response = attempt_service(&state)
        .resume(&attempt_id, &query.learner_id)
        .await?;
    Ok((StatusCode::OK, Json(response)))
}

pub async fn complete_attempt(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    tracing::info!("Completing attempt: {}", attempt_id);

    let response = attempt_service(&state).complete(&attempt_id).await?;
    Ok((StatusCode::OK, Json(response)))
}
