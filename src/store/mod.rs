//! Durable counter store
//!
//! The rotation cursor lives outside the process so that every request sees
//! the same value no matter which worker or instance serves it. The store is
//! only ever used through [`CounterStore`]: a plain `get`/`set` pair with no
//! transactional guarantee between the two calls, plus an optional
//! compare-and-swap used by strict rotation.

mod kv_rest;
#[cfg(test)]
pub mod memory;

pub use kv_rest::KvRestStore;

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by a counter store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed store payload: {0}")]
    Malformed(String),

    #[error("Invalid store URL: {0}")]
    InvalidUrl(String),

    #[error("Operation not supported by this store: {0}")]
    Unsupported(&'static str),
}

/// Key-value contract the rotation selector relies on
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read a value; `Ok(None)` when the key has never been written
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Unconditionally write a value
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Write `new` only if the current value equals `expected`
    /// (`None` matches an absent key). Returns whether the swap happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool, StoreError> {
        let _ = (key, expected, new);
        Err(StoreError::Unsupported("compare_and_swap"))
    }
}
