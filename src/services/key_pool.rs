//! Upstream key pool
//!
//! The pool is rebuilt from the raw configured string on every request, so
//! an operator editing `GEMINI_API_KEYS` changes membership and order for
//! the next request. Duplicates are kept: listing a key twice gives it two
//! turns per rotation.

use thiserror::Error;

/// Reasons the configured pool cannot be used
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyPoolError {
    #[error("Key pool is not set.")]
    Missing,

    #[error("Key pool is empty.")]
    Empty,
}

/// Ordered, non-empty list of upstream API keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPool {
    keys: Vec<String>,
}

impl KeyPool {
    /// Parse a comma-delimited pool: split on `,`, trim, drop empty tokens
    pub fn resolve(raw: Option<&str>) -> Result<Self, KeyPoolError> {
        let raw = match raw {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Err(KeyPoolError::Missing),
        };

        let keys: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();

        if keys.is_empty() {
            return Err(KeyPoolError::Empty);
        }

        Ok(Self { keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false for a resolved pool
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key at `index`, wrapping around the pool length
    pub fn key_at(&self, index: usize) -> &str {
        &self.keys[index % self.keys.len()]
    }
}
