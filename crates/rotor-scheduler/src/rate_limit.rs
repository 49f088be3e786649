//! Rate-limit detection from the transfer's last reported error.

use serde::Serialize;

/// Information about a detected rate-limit event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitDetected {
    pub matched_marker: String,
}

/// Check an error message for any of the configured markers.
///
/// Matching is a plain case-sensitive substring search; the first marker
/// in configuration order wins.
pub fn detect_rate_limit(last_error: Option<&str>, markers: &[String]) -> Option<RateLimitDetected> {
    let error = last_error.filter(|e| !e.is_empty())?;
    markers
        .iter()
        .filter(|m| !m.is_empty())
        .find(|m| error.contains(m.as_str()))
        .map(|m| RateLimitDetected {
            matched_marker: m.clone(),
        })
}
