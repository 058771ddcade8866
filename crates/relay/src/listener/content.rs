//! Text helpers applied to every surfaced message

use regex::Regex;
use std::sync::LazyLock;

/// Maximum stored snippet length, in characters
pub const SNIPPET_MAX: usize = 500;

/// Maximum stored body preview length, in characters
pub const BODY_PREVIEW_MAX: usize = 1000;

const TRUNCATION_MARKER: &str = "...";

static NUMERIC_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{6,8}\b").expect("numeric code regex is valid"));

static ALPHANUMERIC_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z0-9]{8,}\b").expect("alphanumeric code regex is valid"));

/// Cut `text` to at most `max` characters, ending in `...` when cut
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(TRUNCATION_MARKER.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

/// Find a verification-code-shaped token
///
/// A run of 6-8 digits wins over a run of 8+ uppercase alphanumerics.
pub fn detect_code(body: &str) -> Option<String> {
    NUMERIC_CODE
        .find(body)
        .or_else(|| ALPHANUMERIC_CODE.find(body))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_code_detected() {
        assert_eq!(detect_code("Your code is 482910"), Some("482910".to_string()));
        assert_eq!(detect_code("PIN: 12345678."), Some("12345678".to_string()));
    }

    #[test]
    fn test_plain_text_has_no_code() {
        assert_eq!(detect_code("Hello, this is a plain update."), None);
        assert_eq!(detect_code("Meeting at 12:30 on 2024"), None);
    }

    #[test]
    fn test_alphanumeric_code_detected() {
        assert_eq!(
            detect_code("Use token AB12CD34EF to continue"),
            Some("AB12CD34EF".to_string())
        );
        assert_eq!(detect_code("lowercase abcd1234efgh"), None);
    }

    #[test]
    fn test_digits_preferred_over_alphanumerics() {
        assert_eq!(
            detect_code("Ref ABCDEFGH1 code 654321"),
            Some("654321".to_string())
        );
    }

    #[test]
    fn test_long_digit_runs_are_not_numeric_codes() {
        // 10 digits: too long for the numeric pattern, but still an 8+ run
        assert_eq!(detect_code("call 0123456789"), Some("0123456789".to_string()));
        assert_eq!(detect_code("12345"), None);
    }

    #[test]
    fn test_truncate_snippet() {
        let snippet = "a".repeat(600);
        let stored = truncate(&snippet, SNIPPET_MAX);
        assert_eq!(stored.chars().count(), 500);
        assert!(stored.starts_with(&"a".repeat(497)));
        assert!(stored.ends_with("..."));
        assert_eq!(&stored[..497], &snippet[..497]);
    }

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(truncate("short", SNIPPET_MAX), "short");
        let exact = "b".repeat(BODY_PREVIEW_MAX);
        assert_eq!(truncate(&exact, BODY_PREVIEW_MAX), exact);
    }

    #[test]
    fn test_truncate_counts_characters() {
        let text = "é".repeat(1200);
        let stored = truncate(&text, BODY_PREVIEW_MAX);
        assert_eq!(stored.chars().count(), 1000);
    }
}
