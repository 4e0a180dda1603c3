//! Authentication middleware
//!
//! A single shared secret (`ACCESS_KEY`) gates every proxied request. Callers
//! present it in the `x-goog-api-key` header, the same header Gemini clients
//! already send, so an existing SDK only needs its key and base URL changed.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::error::ApiError;
use crate::server::state::AppState;
use crate::services::forwarder::API_KEY_HEADER;

/// Result of checking a caller credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Authorized,
    Unauthorized,
    /// No secret configured: an operator problem, not a caller one
    Misconfigured,
}

/// Compare the supplied credential with the configured secret, byte for byte
pub fn authenticate(configured: Option<&str>, supplied: Option<&str>) -> AuthOutcome {
    let configured = match configured {
        Some(secret) if !secret.is_empty() => secret,
        _ => return AuthOutcome::Misconfigured,
    };

    match supplied {
        Some(supplied) if constant_time_compare(supplied, configured) => AuthOutcome::Authorized,
        _ => AuthOutcome::Unauthorized,
    }
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Middleware rejecting requests that do not carry the shared secret
///
/// # Errors
/// - 401 Unauthorized: missing or mismatched `x-goog-api-key`
/// - 500 Internal Server Error: `ACCESS_KEY` is not configured
pub async fn require_access_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let supplied = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| std::str::from_utf8(v.as_bytes()).ok());

    match authenticate(state.settings.access_key.as_deref(), supplied) {
        AuthOutcome::Authorized => Ok(next.run(request).await),
        AuthOutcome::Unauthorized => {
            tracing::warn!(
                path = %request.uri().path(),
                credential_present = supplied.is_some(),
                "Rejected request with invalid access key"
            );
            Err(ApiError::Unauthorized("Invalid API Key provided.".to_string()))
        }
        AuthOutcome::Misconfigured => {
            tracing::error!("ACCESS_KEY is not configured");
            Err(ApiError::Configuration("Access key is not set.".to_string()))
        }
    }
}
