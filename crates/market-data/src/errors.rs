//! Provider-facing error taxonomy and the rate-limit text sniffer.
//!
//! Grounded on the teacher's `errors::MarketDataError` / `RetryClass` split:
//! one enum for "what went wrong", one classification for "what to do
//! about it". Callers above this crate must never see a provider-native
//! error type, only [`ProviderError`].

use thiserror::Error;

/// Errors a [`crate::port::MarketProvider`] call can produce.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Connection aborted, timed out, or the provider returned a
    /// 5xx-equivalent. Worth retrying with backoff.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// The provider reported (or we inferred from its response text)
    /// that we're being rate limited.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Terminal: bad symbol, unsupported operation, malformed request.
    #[error("permanent provider error: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Transient(_) => RetryClass::WithBackoff,
            Self::RateLimited { .. } => RetryClass::RateLimited,
            Self::Permanent(_) => RetryClass::Never,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    Never,
    WithBackoff,
    RateLimited,
}

/// Default wait, in seconds, when a rate-limit message carries no
/// explicit number (spec.md §4.1: "otherwise defaults to 15 seconds").
pub const DEFAULT_RATE_LIMIT_WAIT_SECS: u64 = 15;

/// Literal substrings (case-insensitive) that alone mark a message as a
/// rate-limit condition, with no number to extract. Kept as a
/// configurable table per the Open Question in spec.md §9 ("rate-limit
/// detection based on Vietnamese error substrings is brittle").
pub const RATE_LIMIT_MARKERS: &[&str] = &[
    "quá nhiều request",
    "thử lại sau",
    "too many requests",
    "rate limit",
];

/// Scan `message` for a rate-limit condition, extracting a retry-after
/// duration in seconds when present. Returns `None` if the message does
/// not look like a rate-limit message at all.
///
/// Six independent triggers, per spec.md §4.1: the four literal
/// [`RATE_LIMIT_MARKERS`], plus `"<N> giây"` and `"retry after <N>
/// seconds"` as numeric patterns — either of those classifies the
/// message on its own, not only when one of the literal markers is also
/// present. Any match without a parseable number falls back to
/// [`DEFAULT_RATE_LIMIT_WAIT_SECS`].
pub fn parse_rate_limit(message: &str) -> Option<u64> {
    let lower = message.to_lowercase();
    let giay_seconds = extract_giay_seconds(&lower);
    let retry_after_seconds = extract_retry_after_seconds(&lower);
    let literal_marker = RATE_LIMIT_MARKERS.iter().any(|marker| lower.contains(marker));

    if !literal_marker && giay_seconds.is_none() && retry_after_seconds.is_none() {
        return None;
    }
    Some(giay_seconds.or(retry_after_seconds).unwrap_or(DEFAULT_RATE_LIMIT_WAIT_SECS))
}

/// Match `"<N> giây"`: a run of ASCII digits immediately (modulo
/// whitespace) before the literal word `"giây"`.
fn extract_giay_seconds(lower: &str) -> Option<u64> {
    let idx = lower.find("giây")?;
    let prefix = lower[..idx].trim_end();
    let digits: String = prefix.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.chars().rev().collect::<String>().parse().ok()
}

/// Match `"retry after <N> seconds"` specifically, not just any digits
/// preceding the word "seconds" — `"request #45, wait 10 seconds"` does
/// not count, since it never says "retry after".
fn extract_retry_after_seconds(lower: &str) -> Option<u64> {
    let idx = lower.find("retry after")?;
    let rest = lower[idx + "retry after".len()..].trim_start();
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let rest = rest[digits.len()..].trim_start();
    if !rest.starts_with("second") {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_vietnamese_retry_seconds() {
        let wait = parse_rate_limit("quá nhiều request, thử lại sau 30 giây");
        assert_eq!(wait, Some(30));
    }

    #[test]
    fn detects_english_retry_seconds() {
        let wait = parse_rate_limit("Too many requests. retry after 45 seconds please");
        assert_eq!(wait, Some(45));
    }

    #[test]
    fn defaults_when_no_number_present() {
        let wait = parse_rate_limit("rate limit exceeded");
        assert_eq!(wait, Some(DEFAULT_RATE_LIMIT_WAIT_SECS));
    }

    #[test]
    fn non_rate_limit_message_returns_none() {
        assert_eq!(parse_rate_limit("symbol not found"), None);
    }

    #[test]
    fn giay_pattern_alone_triggers_without_any_literal_marker() {
        let wait = parse_rate_limit("máy chủ đang bận, vui lòng đợi 20 giây");
        assert_eq!(wait, Some(20));
    }

    #[test]
    fn retry_after_seconds_pattern_alone_triggers_without_any_literal_marker() {
        let wait = parse_rate_limit("server busy, retry after 45 seconds");
        assert_eq!(wait, Some(45));
    }

    #[test]
    fn seconds_preceded_by_digits_without_retry_after_is_not_rate_limited() {
        assert_eq!(parse_rate_limit("page loaded in 10 seconds"), None);
    }

    #[test]
    fn case_insensitive() {
        let wait = parse_rate_limit("QUÁ NHIỀU REQUEST, THỬ LẠI SAU 5 GIÂY");
        assert_eq!(wait, Some(5));
    }

    #[test]
    fn retry_class_mapping() {
        assert_eq!(
            ProviderError::Transient("x".into()).retry_class(),
            RetryClass::WithBackoff
        );
        assert_eq!(
            ProviderError::RateLimited { retry_after_secs: 1 }.retry_class(),
            RetryClass::RateLimited
        );
        assert_eq!(
            ProviderError::Permanent("x".into()).retry_class(),
            RetryClass::Never
        );
    }
}
