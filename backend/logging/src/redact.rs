//! Log Redaction
//!
//! Scrubs API keys and bearer tokens from strings prior to logging.

use regex::Regex;
use std::sync::LazyLock;

static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(sk-[a-zA-Z0-9]{16,})|(Bearer\s+[a-zA-Z0-9\-\._~+/]+=*)").unwrap()
});

/// `"api_key": "..."`, `apiKey=...` and similar key/value forms.
static KEY_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)("?(?:api[_-]?key|authorization|token)"?\s*[:=]\s*"?)([^"\s,&}]+)"#)
        .unwrap()
});

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = API_KEY_RE.replace_all(input, "[REDACTED_TOKEN]");
    KEY_FIELD_RE
        .replace_all(&redacted, "${1}[REDACTED]")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_keys_and_bearer_tokens() {
        let raw = "POST with Bearer eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9 key sk-0123456789abcdef0123";
        let clean = redact_sensitive_data(raw);
        assert!(!clean.contains("eyJhbGci"));
        assert!(!clean.contains("sk-0123456789abcdef0123"));
    }

    #[test]
    fn redacts_key_fields_but_keeps_chain_data() {
        let raw = r#"{"api_key": "abc123", "block": 1234567890, "address": "0xdeadbeef"}"#;
        let clean = redact_sensitive_data(raw);
        assert!(!clean.contains("abc123"));
        assert!(clean.contains("1234567890"));
        assert!(clean.contains("0xdeadbeef"));
    }
}
