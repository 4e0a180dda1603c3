//! Pass-through proxy handler
//!
//! Every path other than the health routes lands here after the access key
//! check. The request head and body are taken as separate extractors, so the
//! head is inspected first and the body stream is consumed exactly once, by
//! the upstream call.

use axum::{
    body::Body,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, Method, Uri},
    response::Response,
};

use crate::error::ApiError;
use crate::server::state::AppState;
use crate::services::{ForwardError, KeyPool};

/// Forward the request upstream with the next key from the pool
///
/// ANY /{*path}
pub async fn forward_request(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let pool = KeyPool::resolve(state.settings.api_keys.as_deref())
        .map_err(|e| ApiError::Configuration(e.to_string()))?;

    let selector = state.selector()?;

    // The cursor write keeps running after the handle is dropped.
    let selection = selector.select_and_advance(&pool).await;

    let content_type = headers.get(CONTENT_TYPE).cloned();

    state
        .forwarder
        .forward(method, &uri, content_type, body, &selection.key)
        .await
        .map_err(|e| match e {
            ForwardError::InboundBody(_) => ApiError::InvalidRequest(e.to_string()),
            _ => ApiError::Upstream(e.to_string()),
        })
}
