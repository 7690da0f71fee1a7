//! SQL-injection pattern screen.
//!
//! A cheap local filter run before the remote risk call: requests carrying
//! classic injection markers are refused outright without spending a round
//! trip on them. Patterns cover the quote/comment/equals-chain family in both
//! literal and percent-encoded form.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static SQL_INJECTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // Quote, comment or hash marker
        r"(?i)(%27)|(')|(--)|(%23)|(#)",
        // Equals followed by a quote/semicolon terminator on the same line
        r"(?i)((%3D)|(=))[^\n]*((%27)|(')|(--)|(%3B)|(;))",
        // Quote followed by 'or' in any encoding mix
        r"(?i)\w*((%27)|('))((%6F)|o|(%4F))((%72)|r|(%52))",
        // Quoted UNION
        r"(?i)((%27)|('))union",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("injection pattern must compile"))
    .collect()
});

fn text_is_suspicious(text: &str) -> bool {
    SQL_INJECTION_PATTERNS.iter().any(|p| p.is_match(text))
}

/// Recursively scan a JSON value for injection markers. Only string leaves
/// can match; numbers, booleans and nulls are clean by construction.
pub fn contains_injection(value: &Value) -> bool {
    match value {
        Value::String(s) => text_is_suspicious(s),
        Value::Array(items) => items.iter().any(contains_injection),
        Value::Object(map) => map.values().any(contains_injection),
        _ => false,
    }
}

/// Scan a raw query string as-is, before any decoding.
pub fn query_contains_injection(query: &str) -> bool {
    text_is_suspicious(query)
}
