//! Middleware module
//!
//! Contains HTTP middleware for authentication and request logging.

pub mod auth;
pub mod logging;

pub use auth::{authenticate, require_access_key, AuthOutcome};
pub use logging::{log_request, TraceId, REQUEST_ID_HEADER, TRACE_ID_HEADER};
