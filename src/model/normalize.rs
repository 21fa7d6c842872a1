//! Indicator normalization helpers
//!
//! Used to build dedup keys and to clean up model output before it is committed.

use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;

static DEFANGED_DOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*[\[\(\{]\s*(?:\.|dot)\s*[\]\)\}]\s*").unwrap());
static DEFANGED_COLON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[\[\(\{]\s*:\s*[\]\)\}]\s*").unwrap());
static DEFANGED_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bhxxp(s?)\b").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Undo common defanging (`1.2.3[.]4`, `evil(.)com`, `hxxps://`)
pub fn refang(indicator: &str) -> String {
    let value = DEFANGED_DOT.replace_all(indicator, ".");
    let value = DEFANGED_COLON.replace_all(&value, ":");
    DEFANGED_SCHEME.replace_all(&value, "http$1").into_owned()
}

/// Normalized form of a network indicator: refanged, lowercased, canonical IPs
pub fn normalize_network_indicator(indicator: &str) -> String {
    let refanged = refang(indicator.trim());
    let lowered = refanged.to_lowercase();
    let trimmed = lowered.trim_end_matches('.');

    match trimmed.parse::<IpAddr>() {
        Ok(ip) => ip.to_string(),
        Err(_) => trimmed.to_string(),
    }
}

/// Normalized form of a host indicator: case-insensitive, collapsed whitespace
pub fn normalize_host_indicator(indicator: &str) -> String {
    collapse_whitespace(indicator).to_lowercase()
}

/// Collapse runs of whitespace into single spaces and trim
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Truncate to at most `max_chars` characters (char boundary safe)
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

/// Treat empty or "null"-like strings from the model as absent
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
