// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SMTP Parser
//!
//! Parses SMTP command/response lines and tracks the command state within
//! the unit: envelope fields (`MAIL FROM`, `RCPT TO`) land in headers, and
//! everything after a `DATA` command becomes the message body that the
//! content analyzers inspect.

use sentinel_dlp_domain::entities::parsed_message::ParsedMessage;
use sentinel_dlp_domain::error::DlpError;
use sentinel_dlp_domain::services::protocol_parser::{ParseUnit, ProtocolParser};

const SMTP_COMMANDS: [&str; 10] = [
    "HELO", "EHLO", "MAIL", "RCPT", "DATA", "QUIT", "RSET", "NOOP", "VRFY", "AUTH",
];

/// SMTP command parser.
pub struct SmtpParser;

impl SmtpParser {
    pub fn new() -> Self {
        Self
    }

    fn starts_with_command(payload: &[u8]) -> bool {
        let head = String::from_utf8_lossy(&payload[..payload.len().min(8)]).to_ascii_uppercase();
        SMTP_COMMANDS.iter().any(|c| head.starts_with(c))
    }
}

impl Default for SmtpParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolParser for SmtpParser {
    fn name(&self) -> &'static str {
        "smtp"
    }

    fn claims(&self, unit: &ParseUnit) -> bool {
        if !unit.payload.is_empty() {
            return matches!(unit.dest_port(), 25 | 465 | 587) || Self::starts_with_command(&unit.payload);
        }
        matches!(unit.dest_port(), 25 | 465 | 587)
    }

    fn parse(&self, unit: &ParseUnit) -> Result<ParsedMessage, DlpError> {
        let mut message = ParsedMessage::new("smtp");
        let text = String::from_utf8_lossy(&unit.payload);

        let mut last_command = String::new();
        let mut in_data = false;
        let mut body = String::new();

        for line in text.split("\r\n") {
            if in_data {
                if line == "." {
                    in_data = false;
                    continue;
                }
                body.push_str(line);
                body.push('\n');
                continue;
            }

            let upper = line.to_ascii_uppercase();
            if upper.starts_with("MAIL FROM:") {
                message.insert_header("mail_from", line[10..].trim().trim_matches(['<', '>']));
                last_command = "MAIL".to_string();
            } else if upper.starts_with("RCPT TO:") {
                message.insert_header("rcpt_to", line[8..].trim().trim_matches(['<', '>']));
                last_command = "RCPT".to_string();
            } else if upper == "DATA" {
                in_data = true;
                last_command = "DATA".to_string();
            } else if let Some(cmd) = SMTP_COMMANDS.iter().find(|c| upper.starts_with(**c)) {
                last_command = (*cmd).to_string();
                let argument = line[cmd.len()..].trim();
                if !argument.is_empty() {
                    message.insert_metadata("argument", argument);
                }
            } else if !line.is_empty() && last_command.is_empty() {
                // Server banner or a reply code line.
                if line.len() >= 3 && line[..3].chars().all(|c| c.is_ascii_digit()) {
                    message.insert_metadata("reply", line);
                }
            }
        }

        if !last_command.is_empty() {
            message.insert_metadata("command", last_command);
        }
        if !body.is_empty() {
            message.set_content_type("message/rfc822");
            message.set_body(body.into_bytes());
        }
        if message.metadata().is_empty() && message.headers().is_empty() && message.body().is_empty()
        {
            message.set_error("no SMTP commands recognized");
        }

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_dlp_domain::entities::packet_record::TransportProtocol;
    use sentinel_dlp_domain::value_objects::flow_key::FlowKey;

    fn unit(payload: &[u8]) -> ParseUnit {
        ParseUnit::new(
            FlowKey::new(
                TransportProtocol::Tcp,
                "192.168.1.100:50000".parse().unwrap(),
                "93.184.216.34:25".parse().unwrap(),
            ),
            payload.to_vec(),
            false,
        )
    }

    #[test]
    fn test_envelope_and_data() {
        let payload = b"EHLO client.local\r\nMAIL FROM:<alice@corp.example>\r\nRCPT TO:<bob@evil.example>\r\nDATA\r\nSubject: q3 numbers\r\n\r\nconfidential attachment\r\n.\r\nQUIT\r\n";
        let message = SmtpParser::new().parse(&unit(payload)).unwrap();

        assert_eq!(
            message.headers().get("mail_from").map(String::as_str),
            Some("alice@corp.example")
        );
        assert_eq!(
            message.headers().get("rcpt_to").map(String::as_str),
            Some("bob@evil.example")
        );
        assert!(message.body_text().contains("confidential attachment"));
        assert_eq!(message.metadata().get("command").map(String::as_str), Some("QUIT"));
    }

    #[test]
    fn test_command_state_without_data() {
        let message = SmtpParser::new().parse(&unit(b"EHLO host\r\n")).unwrap();
        assert_eq!(message.metadata().get("command").map(String::as_str), Some("EHLO"));
        assert!(message.body().is_empty());
    }

    #[test]
    fn test_garbage_sets_error() {
        let message = SmtpParser::new().parse(&unit(b"\x00\x01\x02")).unwrap();
        assert!(message.error().is_some());
    }
}
