//! Mapping of internal failures onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::llm::{UpstreamError, UpstreamErrorKind};
use crate::relay::RelayError;
use crate::sessions::StoreError;

/// Error returned by every handler; renders as `{ "error": ... }` or a forwarded provider body.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),
    /// No caller identity on the request.
    #[error("{0}")]
    Unauthorized(String),
    /// Unknown resource.
    #[error("{0}")]
    NotFound(String),
    /// Provider failure before anything was forwarded.
    #[error(transparent)]
    Upstream(UpstreamError),
    /// Anything else.
    #[error("{0}")]
    Internal(String),
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Validation(message) => Self::Validation(message),
            RelayError::Upstream(err) => Self::Upstream(err),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(format!("Session {id} not found")),
            other => {
                tracing::error!("session store failure: {other}");
                Self::Internal("Session storage failure".to_string())
            }
        }
    }
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn upstream_response(err: UpstreamError) -> Response {
    if let Some(code) = err.status {
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_GATEWAY);
        // Provider bodies are JSON in practice; pass them through untouched when they are.
        return match serde_json::from_str::<serde_json::Value>(&err.detail) {
            Ok(body) => (status, Json(body)).into_response(),
            Err(_) => error_body(status, err.detail),
        };
    }

    let status = match err.kind {
        UpstreamErrorKind::Network if err.timed_out => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    };
    error_body(status, format!("Upstream {} error: {}", err.kind, err.detail))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(message) => error_body(StatusCode::BAD_REQUEST, message),
            Self::Unauthorized(message) => error_body(StatusCode::UNAUTHORIZED, message),
            Self::NotFound(message) => error_body(StatusCode::NOT_FOUND, message),
            Self::Upstream(err) => upstream_response(err),
            Self::Internal(message) => error_body(StatusCode::INTERNAL_SERVER_ERROR, message),
        }
    }
}
