//! Application settings and configuration
//!
//! This module provides configuration management for the proxy, loading
//! settings from environment variables with sensible defaults.
//!
//! Only malformed values fail [`Settings::load`]. Secrets, the key pool and
//! the counter store location are optional here: their absence is reported
//! per request as a configuration error so that the liveness route keeps
//! answering on a half-configured deployment.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;

/// Default upstream generative-language API host
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default store key holding the rotation cursor
pub const DEFAULT_CURSOR_KEY: &str = "gemini_rr_index";

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[value(alias = "dev")]
    Development,
    #[value(alias = "stage")]
    Staging,
    #[value(alias = "prod")]
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => anyhow::bail!("Invalid environment: {}. Expected: development, staging, or production", s),
        }
    }
}

/// How the rotation cursor is advanced in the counter store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationMode {
    /// Plain read then fire-and-forget write; concurrent requests may pick the same key
    #[default]
    Relaxed,
    /// Advance with the store's compare-and-swap, retrying on conflict
    Strict,
}

impl fmt::Display for RotationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationMode::Relaxed => write!(f, "relaxed"),
            RotationMode::Strict => write!(f, "strict"),
        }
    }
}

impl std::str::FromStr for RotationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "relaxed" | "weak" => Ok(RotationMode::Relaxed),
            "strict" | "cas" => Ok(RotationMode::Strict),
            _ => anyhow::bail!("Invalid rotation mode: {}. Expected: relaxed or strict", s),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    // App settings
    pub app_name: String,
    pub app_version: String,
    pub environment: Environment,
    pub log_level: String,

    // Server settings
    pub host: String,
    pub port: u16,
    /// Optional cap on proxied request bodies; unset streams any size
    pub max_request_body_bytes: Option<usize>,

    // Caller authentication
    #[serde(skip_serializing)]
    pub access_key: Option<String>,

    // Upstream
    pub upstream_base_url: String,
    /// Raw comma-delimited key pool, parsed on every request
    #[serde(skip_serializing)]
    pub api_keys: Option<String>,

    // Counter store
    pub kv_rest_api_url: Option<String>,
    #[serde(skip_serializing)]
    pub kv_rest_api_token: Option<String>,
    pub cursor_key: String,

    // Rotation
    pub rotation_mode: RotationMode,
    pub cas_attempts: u32,
}

impl Settings {
    /// Load settings from environment variables with defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignored in production typically)
        dotenvy::dotenv().ok();

        let settings = Self {
            app_name: env_or_default("APP_NAME", "gemini-rotation-proxy"),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: env_or_default("ENVIRONMENT", "development")
                .parse()
                .unwrap_or_default(),
            log_level: env_or_default("LOG_LEVEL", "info"),

            host: env_or_default("HOST", "0.0.0.0"),
            port: env_or_default("PORT", "8000")
                .parse()
                .context("Invalid PORT value")?,
            max_request_body_bytes: env_non_empty("MAX_REQUEST_BODY_BYTES")
                .map(|v| v.parse::<usize>())
                .transpose()
                .context("Invalid MAX_REQUEST_BODY_BYTES value")?,

            access_key: env_non_empty("ACCESS_KEY"),

            upstream_base_url: env_or_default("UPSTREAM_BASE_URL", DEFAULT_UPSTREAM_BASE_URL),
            api_keys: env_non_empty("GEMINI_API_KEYS"),

            kv_rest_api_url: env_non_empty("KV_REST_API_URL"),
            kv_rest_api_token: env_non_empty("KV_REST_API_TOKEN"),
            cursor_key: env_or_default("ROTATION_CURSOR_KEY", DEFAULT_CURSOR_KEY),

            rotation_mode: env_or_default("ROTATION_MODE", "relaxed")
                .parse()
                .context("Invalid ROTATION_MODE value")?,
            cas_attempts: env_or_default("ROTATION_CAS_ATTEMPTS", "3")
                .parse()
                .context("Invalid ROTATION_CAS_ATTEMPTS value")?,
        };

        settings.validate()?;

        Ok(settings)
    }

    /// Validate settings
    ///
    /// Missing secrets are not an error here; they are reported per request.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port cannot be 0");
        }

        if self.cas_attempts == 0 {
            anyhow::bail!("ROTATION_CAS_ATTEMPTS must be > 0");
        }

        if self.cursor_key.trim().is_empty() {
            anyhow::bail!("ROTATION_CURSOR_KEY cannot be empty");
        }

        if self.max_request_body_bytes == Some(0) {
            anyhow::bail!("MAX_REQUEST_BODY_BYTES must be > 0 when set");
        }

        check_base_url("UPSTREAM_BASE_URL", &self.upstream_base_url)?;

        if let Some(ref kv_url) = self.kv_rest_api_url {
            check_base_url("KV_REST_API_URL", kv_url)?;
        }

        Ok(())
    }

    /// Names of the per-request settings that are currently absent
    ///
    /// Used at startup to warn operators; requests touching these still
    /// fail with a configuration error.
    pub fn missing_request_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.access_key.is_none() {
            missing.push("ACCESS_KEY");
        }
        if self.api_keys.is_none() {
            missing.push("GEMINI_API_KEYS");
        }
        if self.kv_rest_api_url.is_none() {
            missing.push("KV_REST_API_URL");
        }
        if self.kv_rest_api_token.is_none() {
            missing.push("KV_REST_API_TOKEN");
        }
        missing
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Get the server address string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "gemini-rotation-proxy".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: Environment::Development,
            log_level: "info".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_request_body_bytes: None,
            access_key: None,
            upstream_base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            api_keys: None,
            kv_rest_api_url: None,
            kv_rest_api_token: None,
            cursor_key: DEFAULT_CURSOR_KEY.to_string(),
            rotation_mode: RotationMode::Relaxed,
            cas_attempts: 3,
        }
    }
}

/// Helper function to get environment variable with default
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Paths are appended to these URLs, so `mailto:`-style URLs are refused
fn check_base_url(name: &str, value: &str) -> Result<()> {
    let url = url::Url::parse(value).with_context(|| format!("Invalid {}: {}", name, value))?;
    if url.cannot_be_a_base() {
        anyhow::bail!("Invalid {}: {} cannot be used as a base URL", name, value);
    }
    Ok(())
}

/// Environment variable treated as absent when empty
fn env_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}
