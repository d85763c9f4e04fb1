// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # MySQL Parser
//!
//! Parses MySQL client command packets: 3-byte little-endian payload length,
//! sequence id, then the command byte. `COM_QUERY` (0x03) carries the SQL
//! text this stage exists for; `COM_INIT_DB` (0x02) names the database.
//! Statement type and table list are best-effort lexical results.

use super::sql;
use sentinel_dlp_domain::entities::parsed_message::ParsedMessage;
use sentinel_dlp_domain::error::DlpError;
use sentinel_dlp_domain::services::protocol_parser::{ParseUnit, ProtocolParser};

const COM_INIT_DB: u8 = 0x02;
const COM_QUERY: u8 = 0x03;
const COM_STMT_PREPARE: u8 = 0x16;

/// MySQL client-command parser.
pub struct MySqlParser;

impl MySqlParser {
    pub fn new() -> Self {
        Self
    }

    /// Whether the payload plausibly starts with a MySQL packet header whose
    /// declared length matches the buffer.
    fn looks_like_packet(payload: &[u8]) -> bool {
        if payload.len() < 5 {
            return false;
        }
        let declared =
            (payload[0] as usize) | ((payload[1] as usize) << 8) | ((payload[2] as usize) << 16);
        declared > 0 && declared + 4 <= payload.len() + 16
    }
}

impl Default for MySqlParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolParser for MySqlParser {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn claims(&self, unit: &ParseUnit) -> bool {
        if unit.dest_port() == 3306 {
            return true;
        }
        Self::looks_like_packet(&unit.payload)
            && matches!(unit.payload.get(4), Some(&COM_QUERY) | Some(&COM_INIT_DB))
    }

    fn parse(&self, unit: &ParseUnit) -> Result<ParsedMessage, DlpError> {
        let mut message = ParsedMessage::new("mysql");
        let payload = &unit.payload;

        if payload.len() < 5 {
            message.set_error("short MySQL packet");
            return Ok(message);
        }

        let declared =
            (payload[0] as usize) | ((payload[1] as usize) << 8) | ((payload[2] as usize) << 16);
        let command = payload[4];
        let body_end = (4 + declared).min(payload.len());
        let body = &payload[5..body_end.max(5)];

        match command {
            COM_QUERY | COM_STMT_PREPARE => {
                let sql_text = String::from_utf8_lossy(body).into_owned();
                message.insert_metadata("statement_type", sql::statement_type(&sql_text));
                let tables = sql::extract_tables(&sql_text);
                if !tables.is_empty() {
                    message.insert_metadata("tables", tables.join(","));
                }
                message.insert_metadata("sql", sql_text.clone());
                message.set_content_type("text/x-sql");
                message.set_body(sql_text.into_bytes());
            }
            COM_INIT_DB => {
                message.insert_metadata("database", String::from_utf8_lossy(body).into_owned());
            }
            other => {
                // Handshake, ping, quit: metadata-only.
                message.insert_metadata("mysql_command", format!("0x{:02x}", other));
            }
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_dlp_domain::entities::packet_record::TransportProtocol;
    use sentinel_dlp_domain::value_objects::flow_key::FlowKey;

    pub(crate) fn com_query(sql_text: &str) -> Vec<u8> {
        let body_len = sql_text.len() + 1;
        let mut packet = vec![
            (body_len & 0xff) as u8,
            ((body_len >> 8) & 0xff) as u8,
            ((body_len >> 16) & 0xff) as u8,
            0x00,
            COM_QUERY,
        ];
        packet.extend_from_slice(sql_text.as_bytes());
        packet
    }

    fn unit(payload: &[u8]) -> ParseUnit {
        ParseUnit::new(
            FlowKey::new(
                TransportProtocol::Tcp,
                "192.168.1.100:50000".parse().unwrap(),
                "10.9.8.7:3306".parse().unwrap(),
            ),
            payload.to_vec(),
            false,
        )
    }

    #[test]
    fn test_com_query_extracts_sql() {
        let message = MySqlParser::new()
            .parse(&unit(&com_query("SELECT ssn FROM customers WHERE id = 1")))
            .unwrap();
        assert_eq!(
            message.metadata().get("statement_type").map(String::as_str),
            Some("SELECT")
        );
        assert_eq!(message.metadata().get("tables").map(String::as_str), Some("customers"));
        assert!(message.body_text().contains("ssn"));
    }

    #[test]
    fn test_init_db_names_database() {
        let mut packet = vec![4, 0, 0, 0, COM_INIT_DB];
        packet.extend_from_slice(b"hr");
        let message = MySqlParser::new().parse(&unit(&packet)).unwrap();
        assert_eq!(message.metadata().get("database").map(String::as_str), Some("hr"));
    }

    #[test]
    fn test_short_packet_sets_error() {
        let message = MySqlParser::new().parse(&unit(&[1, 0])).unwrap();
        assert!(message.error().is_some());
    }
}
