// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Protocol Parser Registry
//!
//! Detection and dispatch for the parser set. For each reassembled unit the
//! registry performs protocol detection - port heuristic plus magic-byte
//! sniffing, delegated to each parser's `claims()` - and hands the unit to
//! exactly one parser. Parsers are consulted in registration order; the
//! generic fallback claims everything, so dispatch always succeeds.
//!
//! Parse failures never stop the pipeline: an `Err` from a parser is folded
//! into a `ParsedMessage` whose `error` field is set.

pub mod ftp;
pub mod generic;
pub mod http;
pub mod mysql;
pub mod postgres;
pub mod smb;
pub mod smtp;
mod sql;
pub mod tls;

use crate::infrastructure::config::ParserConfig;
use sentinel_dlp_domain::entities::parsed_message::ParsedMessage;
use sentinel_dlp_domain::services::protocol_parser::{ParseUnit, ProtocolParser};
use std::sync::Arc;
use tracing::debug;

/// Ordered parser registry; the last entry is the catch-all.
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn ProtocolParser>>,
}

impl ParserRegistry {
    /// Builds the registry with the full default parser set.
    pub fn with_default_parsers(config: &ParserConfig) -> Self {
        let parsers: Vec<Arc<dyn ProtocolParser>> = vec![
            Arc::new(tls::TlsParser::new()),
            Arc::new(http::HttpParser::new(config.max_body_bytes)),
            Arc::new(smtp::SmtpParser::new()),
            Arc::new(ftp::FtpParser::new()),
            Arc::new(mysql::MySqlParser::new()),
            Arc::new(postgres::PostgresParser::new()),
            Arc::new(smb::SmbParser::new()),
            // Fallback must stay last.
            Arc::new(generic::GenericParser::new(config.max_body_bytes)),
        ];
        Self { parsers }
    }

    /// Registers an additional parser ahead of the fallback.
    pub fn register(&mut self, parser: Arc<dyn ProtocolParser>) {
        let fallback = self.parsers.pop();
        self.parsers.push(parser);
        if let Some(fallback) = fallback {
            self.parsers.push(fallback);
        }
    }

    /// Registered parser names, in dispatch order (for `plugin list`).
    pub fn parser_names(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }

    /// The claiming parser's requested minimum bytes for a unit destined to
    /// `port`. Used by the reassembler's emit threshold.
    pub fn minimum_bytes_for_port(&self, port: u16) -> usize {
        // Detection without payload falls back on the port heuristic alone.
        let probe = ParseUnit::new(
            sentinel_dlp_domain::value_objects::flow_key::FlowKey::new(
                sentinel_dlp_domain::entities::packet_record::TransportProtocol::Tcp,
                std::net::SocketAddr::from(([0, 0, 0, 0], 0)),
                std::net::SocketAddr::from(([0, 0, 0, 0], port)),
            ),
            Vec::new(),
            false,
        );
        self.parsers
            .iter()
            .find(|p| p.claims(&probe))
            .map(|p| p.minimum_bytes())
            .unwrap_or(16)
    }

    /// Dispatches one unit to exactly one parser.
    pub fn dispatch(&self, unit: &ParseUnit) -> ParsedMessage {
        for parser in &self.parsers {
            if !parser.claims(unit) {
                continue;
            }
            debug!(parser = parser.name(), port = unit.dest_port(), "parser claimed unit");
            let mut message = match parser.parse(unit) {
                Ok(message) => message,
                Err(e) => {
                    let mut message = ParsedMessage::new(parser.name());
                    message.set_error(e.to_string());
                    message
                }
            };
            if unit.truncated {
                message.set_truncated(true);
            }
            return message;
        }

        // Unreachable while the fallback is registered; still well-defined.
        let mut message = ParsedMessage::new("unknown");
        message.set_error("no parser claimed unit");
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_dlp_domain::entities::packet_record::TransportProtocol;
    use sentinel_dlp_domain::value_objects::flow_key::FlowKey;

    fn unit(port: u16, payload: &[u8]) -> ParseUnit {
        ParseUnit::new(
            FlowKey::new(
                TransportProtocol::Tcp,
                "192.168.1.100:50000".parse().unwrap(),
                format!("93.184.216.34:{}", port).parse().unwrap(),
            ),
            payload.to_vec(),
            false,
        )
    }

    #[test]
    fn test_exactly_one_parser_claims_each_unit() {
        let registry = ParserRegistry::with_default_parsers(&ParserConfig::default());
        let units = [
            unit(80, b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n"),
            unit(443, &[0x16, 0x03, 0x01, 0x00, 0x05, 0x01, 0x00, 0x00, 0x01, 0x00]),
            unit(25, b"MAIL FROM:<a@b.cd>\r\n"),
            unit(21, b"RETR secrets.txt\r\n"),
            unit(9999, b"\x00\x01\x02\x03"),
        ];
        for u in &units {
            let message = registry.dispatch(u);
            assert!(!message.protocol().is_empty());
        }
    }

    #[test]
    fn test_unknown_traffic_falls_back_to_generic() {
        let registry = ParserRegistry::with_default_parsers(&ParserConfig::default());
        let message = registry.dispatch(&unit(9999, b"\x00\x01binary soup"));
        assert_eq!(message.protocol(), "generic");
    }

    #[test]
    fn test_truncated_flag_propagates() {
        let registry = ParserRegistry::with_default_parsers(&ParserConfig::default());
        let mut u = unit(9999, b"data");
        u.truncated = true;
        assert!(registry.dispatch(&u).is_truncated());
    }

    #[test]
    fn test_fallback_survives_registration() {
        let mut registry = ParserRegistry::with_default_parsers(&ParserConfig::default());
        registry.register(Arc::new(generic::GenericParser::new(1024)));
        let names = registry.parser_names();
        assert_eq!(names.last(), Some(&"generic"));
    }
}
