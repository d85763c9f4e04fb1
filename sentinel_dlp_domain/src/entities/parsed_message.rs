// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Parsed Message Entity
//!
//! The application-layer view of a reassembled flow, produced by the protocol
//! parser set and consumed by the content analyzers and the policy engine.
//!
//! A `ParsedMessage` is deliberately protocol-agnostic: protocol-specific
//! facts that don't fit the common fields (TLS SNI, SQL statement type, SMB
//! share) land in the free-form `metadata` map under documented keys. Parse
//! failures populate `error` and leave whatever fields were recovered -
//! a failed parse still flows through analysis and policy.
//!
//! ## Documented metadata keys
//!
//! | key | producer |
//! |-----|----------|
//! | `host` | HTTP parser (Host header) |
//! | `server_name` | TLS parser (SNI) |
//! | `tls_version`, `cipher_suites` | TLS parser |
//! | `encrypted` | TLS parser ("true") |
//! | `sql`, `statement_type`, `database`, `tables` | MySQL/PostgreSQL parsers |
//! | `share`, `smb_command` | SMB parser |
//! | `command`, `argument` | SMTP/FTP parsers |
//! | `sniffed_content_type` | generic fallback parser |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Application-layer message reconstructed from a flow.
///
/// Header and metadata maps are ordered (`BTreeMap`) so serialized forms are
/// deterministic, which the audit log and the tests rely on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedMessage {
    /// Claiming parser's protocol name ("http", "tls", "smtp", "ftp",
    /// "mysql", "postgresql", "smb", "generic").
    protocol: String,
    headers: BTreeMap<String, String>,
    /// Size-capped body bytes. The cap is enforced by the parser.
    body: Vec<u8>,
    content_type: Option<String>,
    url: Option<String>,
    method: Option<String>,
    status_code: Option<u16>,
    metadata: BTreeMap<String, String>,
    /// Populated when parsing failed; best-effort fields remain.
    error: Option<String>,
    /// Set when the source flow hit its buffer cap.
    truncated: bool,
}

impl ParsedMessage {
    pub fn new(protocol: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            ..Default::default()
        }
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body interpreted as UTF-8, lossily.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Whether the parser flagged this message as an encrypted stream.
    pub fn is_encrypted(&self) -> bool {
        self.metadata.get("encrypted").map(String::as_str) == Some("true")
    }

    // Builder-style mutators used by the parsers.

    pub fn insert_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    pub fn set_content_type(&mut self, ct: impl Into<String>) {
        self.content_type = Some(ct.into());
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = Some(url.into());
    }

    pub fn set_method(&mut self, method: impl Into<String>) {
        self.method = Some(method.into());
    }

    pub fn set_status_code(&mut self, status: u16) {
        self.status_code = Some(status);
    }

    pub fn insert_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    pub fn set_truncated(&mut self, truncated: bool) {
        self.truncated = truncated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypted_flag_reads_metadata() {
        let mut m = ParsedMessage::new("tls");
        assert!(!m.is_encrypted());
        m.insert_metadata("encrypted", "true");
        assert!(m.is_encrypted());
    }

    #[test]
    fn test_error_keeps_partial_fields() {
        let mut m = ParsedMessage::new("http");
        m.set_method("POST");
        m.set_error("body truncated mid-header");
        assert_eq!(m.method(), Some("POST"));
        assert!(m.error().is_some());
    }

    #[test]
    fn test_body_text_lossy() {
        let mut m = ParsedMessage::new("generic");
        m.set_body(vec![0x68, 0x69, 0xff]);
        assert!(m.body_text().starts_with("hi"));
    }
}
