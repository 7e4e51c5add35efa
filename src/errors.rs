use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::json;

/// Engine error taxonomy. Every service returns this; handlers convert it
/// straight into an HTTP response, so a failed side effect can never produce
/// a success response.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Attempt / question / learner / target absent. Terminal.
    #[error("{0} not found")]
    NotFound(String),

    /// Operation conflicts with current state (completed attempt,
    /// over-capacity heart credit, duplicate completion).
    #[error("{0}")]
    InvalidState(String),

    /// Request rejected before any store access.
    #[error("{0}")]
    Validation(String),

    /// Not enough tokens (or other spendable resource) to cover the request.
    #[error("{0}")]
    InsufficientResource(String),

    /// Transient or unexpected store failure. Not retried here; the whole
    /// request is safe to retry from the client.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl EngineError {
    pub fn not_found(what: impl Into<String>) -> Self {
        EngineError::NotFound(what.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        EngineError::InvalidState(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::InvalidState(_) => StatusCode::CONFLICT,
            EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::InsufficientResource(_) => StatusCode::PAYMENT_REQUIRED,
            EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<mongodb::error::Error> for EngineError {
    fn from(e: mongodb::error::Error) -> Self {
        EngineError::Store(anyhow::Error::new(e))
    }
}

impl From<redis::RedisError> for EngineError {
    fn from(e: redis::RedisError) -> Self {
        EngineError::Store(anyhow::Error::new(e))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Store(anyhow::Error::new(e))
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {:#}", self);
        } else {
            tracing::warn!("request rejected: {}", self);
        }
        let body = json!({
            "message": self.to_string(),
            "status": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}

/// Mongo duplicate-key write error (code 11000). Used to detect lost races
/// on composite-keyed documents.
pub fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    if let mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we)) =
        *e.kind
    {
        we.code == 11000
    } else {
        false
    }
}
