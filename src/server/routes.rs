//! Application routing
//!
//! This module defines all HTTP routes for the application.

use axum::{middleware, routing::any, Router};
use tower_http::limit::RequestBodyLimitLayer;

use crate::api::{health, proxy};
use crate::middleware::{auth::require_access_key, logging::log_request};
use crate::server::state::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // Everything that is not a health route is proxied upstream with its
    // body streamed through.
    let mut proxied = Router::new().fallback(proxy::forward_request);

    // Opt-in cap: a declared length over the limit is refused with 413, an
    // undeclared one fails the stream once it crosses the limit.
    if let Some(limit) = state.settings.max_request_body_bytes {
        proxied = proxied.layer(RequestBodyLimitLayer::new(limit));
    }

    // Last added = outermost = runs first, so the access key is checked
    // before any of the body is read.
    let proxied = proxied
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_access_key,
        ))
        .with_state(state.clone());

    // Health routes (no authentication, no configuration required); any
    // method is answered so these paths are never proxied.
    Router::new()
        .route("/", any(health::liveness))
        .route("/index.html", any(health::liveness))
        .route("/health", any(health::health_check))
        .fallback_service(proxied)
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
