//! String utilities
//!
//! Contains helper functions for safe string manipulation.

/// Safely truncate a string at a character boundary
///
/// # Example
/// ```
/// use gemini_rotation_proxy::utils::truncate_str;
///
/// assert_eq!(truncate_str("Grüße, Welt", 4), "Grüß");
/// assert_eq!(truncate_str("short", 100), "short");
/// ```
pub fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Mask a credential for logging (first 8 chars + `...`)
///
/// Short values are fully hidden since a prefix would reveal most of them.
///
/// # Example
/// ```
/// use gemini_rotation_proxy::utils::mask_key;
///
/// assert_eq!(mask_key("AIzaSyA-very-long-upstream-key"), "AIzaSyA-...");
/// assert_eq!(mask_key("k1"), "***");
/// ```
pub fn mask_key(key: &str) -> String {
    if key.chars().count() > 12 {
        format!("{}...", truncate_str(key, 8))
    } else {
        "***".to_string()
    }
}
