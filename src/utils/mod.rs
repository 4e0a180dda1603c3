//! Utility modules

pub mod string;

pub use string::{mask_key, truncate_str};
