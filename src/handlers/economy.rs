use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::{
    errors::EngineError,
    extractors::AppJson,
    models::economy::{EconomyResponse, PurchaseHeartsRequest},
    services::{economy_service::EconomyService, AppState},
};

pub async fn purchase_hearts(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<PurchaseHeartsRequest>,
) -> Result<impl IntoResponse, EngineError> {
    req.validate()
        .map_err(|e| EngineError::Validation(e.to_string()))?;

    tracing::info!(
        "Heart purchase request: learner_id={}, hearts={}",
        req.learner_id,
        req.hearts
    );

    let service = EconomyService::new(state.mongo.clone());
    let response = service.purchase_hearts(&req.learner_id, req.hearts).await?;
    Ok((StatusCode::OK, Json(response)))
}

pub async fn get_economy(
    State(state): State<Arc<AppState>>,
    Path(learner_id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let service = EconomyService::new(state.mongo.clone());
    let learner = service.get_learner(&learner_id).await?;

    Ok((
        StatusCode::OK,
        Json(EconomyResponse {
            learner_id: learner.id,
            hearts: learner.hearts,
            tokens: learner.tokens,
            experience: learner.experience,
            streak: learner.streak,
        }),
    ))
}
