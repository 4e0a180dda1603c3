//! Gemini rotation proxy library

// Public modules
pub mod api;
pub mod config;
pub mod error;
pub mod middleware;
pub mod server;
pub mod services;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use error::ApiError;
pub use server::{create_router, App, AppState};
