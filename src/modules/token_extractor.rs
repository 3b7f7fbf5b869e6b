//! Normalizes pasted text into refresh-token candidates.
//!
//! Users paste either an exported JSON array of accounts or an arbitrary
//! blob with one or more tokens in it; both shapes funnel into the same
//! ordered, deduplicated list.

use std::collections::HashSet;

use serde_json::Value;

use crate::modules::logger;

/// Shape prefix of a Google refresh token.
const TOKEN_PREFIX: &str = "1//";

lazy_static::lazy_static! {
    static ref TOKEN_PATTERN: regex::Regex =
        regex::Regex::new(r"1//[A-Za-z0-9_\-]+").expect("token pattern compiles");
}

/// Extracts refresh-token candidates from free-form input.
///
/// Tries the structured path first (a JSON array of objects carrying a
/// `refresh_token` field), then falls back to scanning the raw text. An
/// empty result is a value, not an error; the caller decides what an empty
/// batch means.
pub fn extract_refresh_tokens(input: &str) -> Vec<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut tokens = Vec::new();

    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        match serde_json::from_str::<Vec<Value>>(trimmed) {
            Ok(items) => {
                for item in &items {
                    if let Some(token) = item.get("refresh_token").and_then(Value::as_str) {
                        if token.starts_with(TOKEN_PREFIX) {
                            tokens.push(token.to_string());
                        }
                    }
                }
            }
            Err(e) => {
                // Not actually JSON; the regex scan below still applies.
                logger::log_debug(&format!(
                    "[TokenExtractor] JSON parse failed, falling back to scan: {}",
                    e
                ));
            }
        }
    }

    if tokens.is_empty() {
        for found in TOKEN_PATTERN.find_iter(trimmed) {
            tokens.push(found.as_str().to_string());
        }
    }

    dedup_preserving_order(tokens)
}

fn dedup_preserving_order(tokens: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens
        .into_iter()
        .filter(|token| seen.insert(token.clone()))
        .collect()
}
