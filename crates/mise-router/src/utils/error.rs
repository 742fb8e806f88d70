use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failure kinds of the routing core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouterError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Malformed fragment from the model backend. Dropped by the relay.
    #[error("Malformed stream fragment: {0}")]
    StreamIntegrity(String),
}

impl From<sqlx::Error> for RouterError {
    fn from(err: sqlx::Error) -> Self {
        RouterError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for RouterError {
    fn from(err: serde_json::Error) -> Self {
        RouterError::Persistence(err.to_string())
    }
}

impl From<reqwest::Error> for RouterError {
    fn from(err: reqwest::Error) -> Self {
        RouterError::Backend(err.to_string())
    }
}

impl RouterError {
    pub fn status(&self) -> StatusCode {
        match self {
            RouterError::Validation(_) => StatusCode::BAD_REQUEST,
            RouterError::NotFound(_) => StatusCode::NOT_FOUND,
            RouterError::Backend(_) => StatusCode::SERVICE_UNAVAILABLE,
            RouterError::Persistence(_) | RouterError::StreamIntegrity(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short tag for the `error` field of HTTP error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            RouterError::Validation(_) => "BadRequest",
            RouterError::NotFound(_) => "NotFound",
            RouterError::Backend(_) => "BackendUnavailable",
            RouterError::Persistence(_) => "PersistenceError",
            RouterError::StreamIntegrity(_) => "StreamError",
        }
    }

    fn detail(self) -> String {
        match self {
            RouterError::Validation(msg)
            | RouterError::NotFound(msg)
            | RouterError::Backend(msg)
            | RouterError::Persistence(msg)
            | RouterError::StreamIntegrity(msg) => msg,
        }
    }
}

/// HTTP face of a failed request
#[derive(Error, Debug)]
pub enum ApiError {
    /// Body rejected before it reached the router
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Router(#[from] RouterError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BadRequest", msg),
            ApiError::Router(err) => (err.status(), err.kind(), err.detail()),
        };

        if status.is_server_error() {
            tracing::error!("{} ({}): {}", error, status, message);
        } else {
            tracing::warn!("{} ({}): {}", error, status, message);
        }

        (status, Json(ErrorResponse { error, message })).into_response()
    }
}
