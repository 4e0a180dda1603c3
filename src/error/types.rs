//! API error types

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced to the caller
///
/// Store failures are deliberately absent: the rotation selector recovers
/// from them locally and they never change the response.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Server configuration error: {0}")]
    Configuration(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Upstream(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();

        let status = match self {
            ApiError::Configuration(_) => {
                tracing::error!(error = %message, "Configuration error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Unauthorized(_) => {
                tracing::warn!(error = %message, "Authentication failed");
                StatusCode::UNAUTHORIZED
            }
            ApiError::InvalidRequest(_) => {
                tracing::warn!(error = %message, "Invalid request");
                StatusCode::BAD_REQUEST
            }
            ApiError::Upstream(detail) => {
                tracing::error!(error = %detail, "Failed to fetch from upstream");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    [(header::CONTENT_TYPE, "text/plain")],
                    format!("Internal Server Error\n{}", detail),
                )
                    .into_response();
            }
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

/// JSON error body: `{"error": {"message": "..."}}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
            },
        }
    }
}
