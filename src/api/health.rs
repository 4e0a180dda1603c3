//! Health check endpoints
//!
//! Neither endpoint touches authentication, the key pool, the counter store
//! or the upstream, so they answer even on a half-configured deployment.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::server::state::AppState;

/// Fixed liveness acknowledgement
pub const LIVENESS_TEXT: &str = "Proxy is Running!";

/// Response for the health check endpoint
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub uptime_seconds: u64,
}

/// Liveness probe
///
/// ANY / and ANY /index.html
pub async fn liveness() -> &'static str {
    LIVENESS_TEXT
}

/// Service status with version and uptime
///
/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.settings.app_version.clone(),
        environment: state.settings.environment.to_string(),
        uptime_seconds: state.uptime_seconds(),
    })
}
