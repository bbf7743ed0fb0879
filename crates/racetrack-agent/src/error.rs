//! API error types

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use racetrack_tracker::{RemoteError, TrackingError};
use serde::Serialize;
use thiserror::Error;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone()),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg.clone()),
        };

        let body = Json(ErrorResponse {
            error: error_type.into(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<TrackingError> for ApiError {
    fn from(err: TrackingError) -> Self {
        let message = err.to_string();
        match err {
            TrackingError::PermissionDenied(_) => ApiError::Forbidden(message),
            TrackingError::InvalidState { .. } | TrackingError::SyncInProgress => {
                ApiError::Conflict(message)
            }
            TrackingError::Metadata(RemoteError::NotFound(_)) => ApiError::NotFound(message),
            TrackingError::Metadata(_) | TrackingError::SyncDrain(_) => {
                ApiError::ServiceUnavailable(message)
            }
            _ => ApiError::Internal(message),
        }
    }
}
