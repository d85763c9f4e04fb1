// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # FTP Parser
//!
//! Parses FTP control-channel command/response lines. Upload and download
//! commands (`STOR`, `RETR`, `APPE`) surface the transferred path in
//! metadata so policy can match on it; credentials surface as headers with
//! the password elided.

use sentinel_dlp_domain::entities::parsed_message::ParsedMessage;
use sentinel_dlp_domain::error::DlpError;
use sentinel_dlp_domain::services::protocol_parser::{ParseUnit, ProtocolParser};

const FTP_COMMANDS: [&str; 14] = [
    "USER", "PASS", "ACCT", "CWD", "QUIT", "RETR", "STOR", "APPE", "DELE", "LIST", "PASV", "PORT",
    "TYPE", "MKD",
];

/// FTP control-channel parser.
pub struct FtpParser;

impl FtpParser {
    pub fn new() -> Self {
        Self
    }

    fn starts_with_command(payload: &[u8]) -> bool {
        let head = String::from_utf8_lossy(&payload[..payload.len().min(5)]).to_ascii_uppercase();
        FTP_COMMANDS.iter().any(|c| head.starts_with(c))
    }
}

impl Default for FtpParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolParser for FtpParser {
    fn name(&self) -> &'static str {
        "ftp"
    }

    fn claims(&self, unit: &ParseUnit) -> bool {
        if unit.dest_port() == 21 {
            return true;
        }
        !unit.payload.is_empty() && Self::starts_with_command(&unit.payload)
    }

    fn parse(&self, unit: &ParseUnit) -> Result<ParsedMessage, DlpError> {
        let mut message = ParsedMessage::new("ftp");
        let text = String::from_utf8_lossy(&unit.payload);

        let mut recognized = false;
        for line in text.split("\r\n") {
            if line.is_empty() {
                continue;
            }
            let upper = line.to_ascii_uppercase();
            if let Some(cmd) = FTP_COMMANDS.iter().find(|c| upper.starts_with(**c)) {
                recognized = true;
                let argument = line[cmd.len()..].trim().to_string();
                message.insert_metadata("command", *cmd);
                match *cmd {
                    "USER" => message.insert_header("user", argument),
                    // Never carry the password value forward.
                    "PASS" => message.insert_header("password", "<elided>"),
                    "RETR" | "STOR" | "APPE" | "DELE" => {
                        message.insert_metadata("path", argument.clone());
                        message.insert_metadata("transfer", *cmd);
                    }
                    _ => {
                        if !argument.is_empty() {
                            message.insert_metadata("argument", argument);
                        }
                    }
                }
            } else if line.len() >= 3 && line[..3].chars().all(|c| c.is_ascii_digit()) {
                recognized = true;
                message.insert_metadata("reply", line);
            }
        }

        if !recognized {
            message.set_error("no FTP commands recognized");
        }
        Ok(message)
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
    fn test_upload_command_surfaces_path() {
        let message = FtpParser::new()
            .parse(&unit(21, b"STOR /exports/customer_list.csv\r\n"))
            .unwrap();
        assert_eq!(message.metadata().get("command").map(String::as_str), Some("STOR"));
        assert_eq!(
            message.metadata().get("path").map(String::as_str),
            Some("/exports/customer_list.csv")
        );
    }

    #[test]
    fn test_password_is_elided() {
        let message = FtpParser::new()
            .parse(&unit(21, b"USER alice\r\nPASS hunter2\r\n"))
            .unwrap();
        assert_eq!(message.headers().get("user").map(String::as_str), Some("alice"));
        assert_eq!(message.headers().get("password").map(String::as_str), Some("<elided>"));
        assert!(!format!("{:?}", message).contains("hunter2"));
    }

    #[test]
    fn test_reply_lines_recognized() {
        let message = FtpParser::new().parse(&unit(21, b"230 Login successful.\r\n")).unwrap();
        assert_eq!(
            message.metadata().get("reply").map(String::as_str),
            Some("230 Login successful.")
        );
    }
}
