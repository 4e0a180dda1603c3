//! Application state container
//!
//! This module defines the shared application state that is passed
//! to all request handlers via Axum's state extraction.
//!
//! Nothing in here changes after startup. The rotation cursor is the only
//! value shared between requests and it lives in the counter store.

use anyhow::Context;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::error::ApiError;
use crate::services::{RotationSelector, UpstreamForwarder};
use crate::store::{CounterStore, KvRestStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Counter store holding the rotation cursor; `None` when not configured
    pub store: Option<Arc<dyn CounterStore>>,

    /// Upstream forwarder
    pub forwarder: UpstreamForwarder,

    /// Application start time (for uptime calculation)
    pub start_time: Instant,
}

impl AppState {
    /// Create a new application state
    ///
    /// A missing store URL or token is not an error here; proxied requests
    /// report it as a configuration error instead.
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let settings = Arc::new(settings);

        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        let store: Option<Arc<dyn CounterStore>> =
            match (&settings.kv_rest_api_url, &settings.kv_rest_api_token) {
                (Some(url), Some(token)) => {
                    tracing::debug!(url = %url, cursor_key = %settings.cursor_key, "Creating counter store client");
                    let store = KvRestStore::with_client(client.clone(), url, token.clone())
                        .context("Failed to create counter store client")?;
                    Some(Arc::new(store) as Arc<dyn CounterStore>)
                }
                _ => None,
            };

        let forwarder = UpstreamForwarder::new(client, settings.upstream_base_url.clone());

        tracing::info!(
            upstream = %settings.upstream_base_url,
            store_configured = store.is_some(),
            rotation_mode = %settings.rotation_mode,
            "Application state initialized"
        );

        Ok(Self {
            settings,
            store,
            forwarder,
            start_time: Instant::now(),
        })
    }

    /// Replace the counter store
    pub fn with_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the rotation selector for one request
    pub fn selector(&self) -> Result<RotationSelector, ApiError> {
        let store = self.store.clone().ok_or_else(|| {
            ApiError::Configuration("Counter store is not configured.".to_string())
        })?;

        Ok(RotationSelector::new(store, self.settings.cursor_key.clone())
            .with_mode(self.settings.rotation_mode)
            .with_cas_attempts(self.settings.cas_attempts))
    }

    /// Get the application uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_requires_url_and_token() {
        let settings = Settings {
            kv_rest_api_url: Some("https://kv.example.com".to_string()),
            ..Settings::default()
        };
        let state = AppState::new(settings).unwrap();
        assert!(state.store.is_none());
        assert!(matches!(state.selector(), Err(ApiError::Configuration(_))));
    }

    #[test]
    fn test_store_created_when_configured() {
        let settings = Settings {
            kv_rest_api_url: Some("https://kv.example.com".to_string()),
            kv_rest_api_token: Some("token".to_string()),
            ..Settings::default()
        };
        let state = AppState::new(settings).unwrap();
        assert!(state.store.is_some());
        assert!(state.selector().is_ok());
    }
}
