//! Services module
//!
//! Contains the per-request building blocks of the proxy: key pool
//! resolution, cursor-based key rotation and upstream forwarding.

pub mod forwarder;
pub mod key_pool;
pub mod rotation;

pub use forwarder::{ForwardError, UpstreamForwarder, API_KEY_HEADER};
pub use key_pool::{KeyPool, KeyPoolError};
pub use rotation::{RotationSelector, Selection};
