// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # PostgreSQL Parser
//!
//! Parses frontend messages of the PostgreSQL wire protocol: the simple
//! query message `'Q'` (int32 length + NUL-terminated SQL) and the extended
//! protocol `'P'` Parse message (statement name + SQL). Startup messages
//! yield the database and user from their parameter list.

use super::sql;
use sentinel_dlp_domain::entities::parsed_message::ParsedMessage;
use sentinel_dlp_domain::error::DlpError;
use sentinel_dlp_domain::services::protocol_parser::{ParseUnit, ProtocolParser};

/// PostgreSQL frontend-message parser.
pub struct PostgresParser;

impl PostgresParser {
    pub fn new() -> Self {
        Self
    }

    fn read_len(payload: &[u8], at: usize) -> Option<usize> {
        let bytes = payload.get(at..at + 4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
    }

    fn parse_query(&self, payload: &[u8], message: &mut ParsedMessage) -> bool {
        let Some(len) = Self::read_len(payload, 1) else {
            return false;
        };
        let end = (1 + len).min(payload.len());
        let body = &payload[5..end.max(5)];
        let sql_text = String::from_utf8_lossy(body)
            .trim_end_matches('\0')
            .to_string();
        if sql_text.is_empty() {
            return false;
        }
        message.insert_metadata("statement_type", sql::statement_type(&sql_text));
        let tables = sql::extract_tables(&sql_text);
        if !tables.is_empty() {
            message.insert_metadata("tables", tables.join(","));
        }
        message.insert_metadata("sql", sql_text.clone());
        message.set_content_type("text/x-sql");
        message.set_body(sql_text.into_bytes());
        true
    }

    fn parse_startup(&self, payload: &[u8], message: &mut ParsedMessage) -> bool {
        // Startup: int32 length, int32 protocol (196608 for 3.0), then
        // NUL-separated key/value pairs.
        let Some(len) = Self::read_len(payload, 0) else {
            return false;
        };
        if len < 8 || payload.len() < 8 {
            return false;
        }
        let Some(protocol) = Self::read_len(payload, 4) else {
            return false;
        };
        if protocol != 196608 {
            return false;
        }
        let end = len.min(payload.len());
        let params = &payload[8..end];
        let mut parts = params.split(|&b| b == 0).map(|s| String::from_utf8_lossy(s));
        while let (Some(key), Some(value)) = (parts.next(), parts.next()) {
            match key.as_ref() {
                "database" => message.insert_metadata("database", value.into_owned()),
                "user" => message.insert_metadata("user", value.into_owned()),
                _ => {}
            }
        }
        true
    }
}

impl Default for PostgresParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolParser for PostgresParser {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn claims(&self, unit: &ParseUnit) -> bool {
        if unit.dest_port() == 5432 {
            return true;
        }
        matches!(unit.payload.first(), Some(&b'Q') | Some(&b'P'))
            && Self::read_len(&unit.payload, 1)
                .map(|len| len + 1 <= unit.payload.len() + 16)
                .unwrap_or(false)
    }

    fn parse(&self, unit: &ParseUnit) -> Result<ParsedMessage, DlpError> {
        let mut message = ParsedMessage::new("postgresql");
        let payload = &unit.payload;

        let parsed = match payload.first() {
            Some(&b'Q') => self.parse_query(payload, &mut message),
            Some(&b'P') => {
                // Parse message: 'P' len name\0 sql\0 ...
                if let Some(name_end) = payload
                    .get(5..)
                    .and_then(|rest| rest.iter().position(|&b| b == 0))
                {
                    let sql_start = 5 + name_end + 1;
                    let sql_end = payload[sql_start..]
                        .iter()
                        .position(|&b| b == 0)
                        .map(|i| sql_start + i)
                        .unwrap_or(payload.len());
                    let sql_text = String::from_utf8_lossy(&payload[sql_start..sql_end]).into_owned();
                    if sql_text.is_empty() {
                        false
                    } else {
                        message.insert_metadata("statement_type", sql::statement_type(&sql_text));
                        let tables = sql::extract_tables(&sql_text);
                        if !tables.is_empty() {
                            message.insert_metadata("tables", tables.join(","));
                        }
                        message.insert_metadata("sql", sql_text.clone());
                        message.set_content_type("text/x-sql");
                        message.set_body(sql_text.into_bytes());
                        true
                    }
                } else {
                    false
                }
            }
            _ => self.parse_startup(payload, &mut message),
        };

        if !parsed && message.metadata().is_empty() {
            message.set_error("unrecognized PostgreSQL frontend message");
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_dlp_domain::entities::packet_record::TransportProtocol;
    use sentinel_dlp_domain::value_objects::flow_key::FlowKey;

    pub(crate) fn simple_query(sql_text: &str) -> Vec<u8> {
        let mut packet = vec![b'Q'];
        packet.extend_from_slice(&((sql_text.len() + 5) as u32).to_be_bytes());
        packet.extend_from_slice(sql_text.as_bytes());
        packet.push(0);
        packet
    }

    fn unit(payload: &[u8]) -> ParseUnit {
        ParseUnit::new(
            FlowKey::new(
                TransportProtocol::Tcp,
                "192.168.1.100:50000".parse().unwrap(),
                "10.9.8.7:5432".parse().unwrap(),
            ),
            payload.to_vec(),
            false,
        )
    }

    #[test]
    fn test_simple_query() {
        let message = PostgresParser::new()
            .parse(&unit(&simple_query("UPDATE payroll SET salary = 1 WHERE id = 2")))
            .unwrap();
        assert_eq!(
            message.metadata().get("statement_type").map(String::as_str),
            Some("UPDATE")
        );
        assert_eq!(message.metadata().get("tables").map(String::as_str), Some("payroll"));
    }

    #[test]
    fn test_startup_message_parameters() {
        let mut params = Vec::new();
        params.extend_from_slice(b"user\0alice\0database\0hr\0\0");
        let mut packet = ((params.len() + 8) as u32).to_be_bytes().to_vec();
        packet.extend_from_slice(&196608u32.to_be_bytes());
        packet.extend_from_slice(&params);

        let message = PostgresParser::new().parse(&unit(&packet)).unwrap();
        assert_eq!(message.metadata().get("database").map(String::as_str), Some("hr"));
        assert_eq!(message.metadata().get("user").map(String::as_str), Some("alice"));
    }

    #[test]
    fn test_garbage_sets_error() {
        let message = PostgresParser::new().parse(&unit(b"\x00\x01")).unwrap();
        assert!(message.error().is_some());
    }
}
