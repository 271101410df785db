//! Prompt cache key derivation.
//!
//! A key is the hex SHA-256 of the UTF-8 string `"{model}|{temperature}|{prompt}"`.
//! The temperature is rendered the way previously written cache files render it
//! (`0.2`, `1.0`, `0.75`), so keys written by earlier runs stay addressable.
//! The key always covers the full prompt, even though the stored audit copy
//! is truncated.

use sha2::{Digest, Sha256};

/// Maximum characters of prompt text kept in a stored [`PromptEntry`](crate::store::PromptEntry).
pub const STORED_PROMPT_CHARS: usize = 500;

/// Maximum characters of prompt text kept in a [`CallRecord`](crate::store::CallRecord).
pub const PROMPT_PREVIEW_CHARS: usize = 200;

/// Derive the cache key for a `(prompt, model, temperature)` triple.
pub fn prompt_key(prompt: &str, model: &str, temperature: f64) -> String {
    let material = format!("{model}|{}|{prompt}", format_temperature(temperature));
    hex::encode(Sha256::digest(material.as_bytes()))
}

/// Render a float with a trailing `.0` for whole numbers (`1` -> `1.0`).
pub fn format_temperature(temperature: f64) -> String {
    if temperature.is_finite() && temperature.fract() == 0.0 {
        format!("{temperature:.1}")
    } else {
        temperature.to_string()
    }
}

/// First `max_chars` characters of `text`, cut on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
