// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Generic Fallback Parser
//!
//! The catch-all: empty headers, the raw (size-capped) body, and a
//! content-type guessed from the first 512 bytes. Always claims, always
//! succeeds - it is what makes registry dispatch total.

use sentinel_dlp_domain::entities::parsed_message::ParsedMessage;
use sentinel_dlp_domain::error::DlpError;
use sentinel_dlp_domain::services::protocol_parser::{ParseUnit, ProtocolParser};

const SNIFF_WINDOW: usize = 512;

/// Catch-all parser.
pub struct GenericParser {
    max_body_bytes: usize,
}

impl GenericParser {
    pub fn new(max_body_bytes: usize) -> Self {
        Self { max_body_bytes }
    }

    /// Guesses a content type from the sniff window.
    fn sniff_content_type(data: &[u8]) -> &'static str {
        let window = &data[..data.len().min(SNIFF_WINDOW)];
        if window.is_empty() {
            return "application/octet-stream";
        }

        // Binary magics first.
        if window.starts_with(b"\x89PNG\r\n\x1a\n") {
            return "image/png";
        }
        if window.starts_with(b"\xff\xd8\xff") {
            return "image/jpeg";
        }
        if window.starts_with(b"GIF87a") || window.starts_with(b"GIF89a") {
            return "image/gif";
        }
        if window.starts_with(b"%PDF-") {
            return "application/pdf";
        }
        if window.starts_with(b"PK\x03\x04") {
            return "application/zip";
        }

        let trimmed: &[u8] = {
            let mut s = window;
            while let Some((first, rest)) = s.split_first() {
                if first.is_ascii_whitespace() {
                    s = rest;
                } else {
                    break;
                }
            }
            s
        };
        if trimmed.starts_with(b"{") || trimmed.starts_with(b"[") {
            return "application/json";
        }
        if trimmed.starts_with(b"<?xml") {
            return "application/xml";
        }
        if trimmed.len() >= 5 && trimmed[..5].eq_ignore_ascii_case(b"<html") {
            return "text/html";
        }

        // Mostly printable → text.
        let printable = window
            .iter()
            .filter(|&&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..0x7f).contains(&b))
            .count();
        if printable * 10 >= window.len() * 9 {
            "text/plain"
        } else {
            "application/octet-stream"
        }
    }
}

impl ProtocolParser for GenericParser {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn claims(&self, _unit: &ParseUnit) -> bool {
        true
    }

    fn parse(&self, unit: &ParseUnit) -> Result<ParsedMessage, DlpError> {
        let mut message = ParsedMessage::new("generic");
        message.set_content_type(Self::sniff_content_type(&unit.payload));

        let body = &unit.payload[..unit.payload.len().min(self.max_body_bytes)];
        if body.len() < unit.payload.len() {
            message.set_truncated(true);
        }
        message.set_body(body.to_vec());
        Ok(message)
    }

    fn minimum_bytes(&self) -> usize {
        1
    }
}
