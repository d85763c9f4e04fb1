// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Audit Redaction
//!
//! Regex scrub applied to request data before persistence. Two layers:
//!
//! - **Field redaction**: values of sensitive keys (password, token,
//!   secret, key, auth) in JSON-ish and form-encoded text are replaced
//!   with `[REDACTED]`.
//! - **Value redaction**: free-standing emails and phone numbers are
//!   masked with the standard mask rule.
//!
//! Patterns are compiled once; redaction is single-pass per pattern.

use once_cell::sync::Lazy;
use regex::Regex;
use sentinel_dlp_domain::value_objects::masked_value::MaskedValue;

const REDACTED: &str = "[REDACTED]";

/// `"password": "..."` and friends in JSON bodies.
static JSON_FIELD: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r#"(?i)("(?:password|passwd|token|secret|key|auth[a-z_]*)"\s*:\s*)"[^"]*""#).ok()
});

/// `password=...` in form-encoded or query-string text.
static FORM_FIELD: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)\b((?:password|passwd|token|secret|key|auth[a-z_]*)=)[^&\s]+").ok()
});

static EMAIL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").ok());

static PHONE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\b1[3-9]\d{9}\b").ok());

/// Scrubs sensitive fields and values from request data.
pub fn redact(text: &str) -> String {
    let mut out = text.to_string();

    if let Some(regex) = JSON_FIELD.as_ref() {
        out = regex
            .replace_all(&out, format!("${{1}}\"{}\"", REDACTED))
            .into_owned();
    }
    if let Some(regex) = FORM_FIELD.as_ref() {
        out = regex
            .replace_all(&out, format!("${{1}}{}", REDACTED))
            .into_owned();
    }
    for pattern in [EMAIL.as_ref(), PHONE.as_ref()].into_iter().flatten() {
        out = pattern
            .replace_all(&out, |caps: &regex::Captures<'_>| {
                MaskedValue::mask(&caps[0]).as_str().to_string()
            })
            .into_owned();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_password_redacted() {
        let body = r#"{"password":"s3cr3t","user":"alice"}"#;
        let redacted = redact(body);
        assert!(!redacted.contains("s3cr3t"));
        assert!(redacted.contains(r#""password":"[REDACTED]""#));
        assert!(redacted.contains("alice"));
    }

    #[test]
    fn test_form_token_redacted() {
        let body = "user=alice&token=abc123xyz&x=1";
        let redacted = redact(body);
        assert!(!redacted.contains("abc123xyz"));
        assert!(redacted.contains("token=[REDACTED]"));
    }

    #[test]
    fn test_email_and_phone_masked() {
        let text = "contact alice@example.com or 13812345678";
        let redacted = redact(text);
        assert!(!redacted.contains("alice@example.com"));
        assert!(!redacted.contains("13812345678"));
        assert!(redacted.contains("al*************om"));
        assert!(redacted.contains("13*******78"));
    }

    #[test]
    fn test_auth_header_variants() {
        let body = r#"{"authorization":"Bearer abc","auth_token":"xyz"}"#;
        let redacted = redact(body);
        assert!(!redacted.contains("Bearer abc"));
        assert!(!redacted.contains("xyz"));
    }
}
