use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crewline_db::StoreError;

/// The request-level error taxonomy. Every handler failure maps to one of
/// these; the wire body is always `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Authorization(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("service unavailable")]
    Unavailable,

    #[error("internal error")]
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Authorization(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // The 500 body stays generic; details go to the log only.
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            StoreError::Conflict(msg) => ApiError::Validation(msg),
            StoreError::InvalidTransition { from, to } => {
                ApiError::Validation(format!("invalid status transition: {from} -> {to}"))
            }
            StoreError::Unavailable(msg) => {
                error!("durable store unavailable: {msg}");
                ApiError::Unavailable
            }
            StoreError::Sqlite(e) => {
                error!("sqlite error: {e}");
                ApiError::Internal
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
