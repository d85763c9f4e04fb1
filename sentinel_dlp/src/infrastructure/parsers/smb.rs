// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SMB Parser
//!
//! Recognizes SMB1 (`\xFFSMB`) and SMB2/3 (`\xFESMB`) units, optionally
//! behind a NetBIOS session header, and exposes the command name plus a
//! best-effort share/path extraction. Tree-connect paths are UTF-16LE in
//! both dialects; the extractor scans for a `\\server\share` shape rather
//! than walking dialect-specific offsets.

use sentinel_dlp_domain::entities::parsed_message::ParsedMessage;
use sentinel_dlp_domain::error::DlpError;
use sentinel_dlp_domain::services::protocol_parser::{ParseUnit, ProtocolParser};

/// SMB command parser.
pub struct SmbParser;

impl SmbParser {
    pub fn new() -> Self {
        Self
    }

    /// Strips the 4-byte NetBIOS session header when present.
    fn smb_body(payload: &[u8]) -> &[u8] {
        if payload.len() > 8 && payload[0] == 0x00 && payload[4..8] == [0xff, b'S', b'M', b'B'] {
            return &payload[4..];
        }
        if payload.len() > 8 && payload[0] == 0x00 && payload[4..8] == [0xfe, b'S', b'M', b'B'] {
            return &payload[4..];
        }
        payload
    }

    fn smb1_command_name(code: u8) -> &'static str {
        match code {
            0x72 => "negotiate",
            0x73 => "session_setup",
            0x75 => "tree_connect",
            0x2d => "open",
            0x2e => "read",
            0x2f => "write",
            0xa2 => "nt_create",
            0x04 => "close",
            _ => "other",
        }
    }

    fn smb2_command_name(code: u16) -> &'static str {
        match code {
            0x0000 => "negotiate",
            0x0001 => "session_setup",
            0x0003 => "tree_connect",
            0x0005 => "create",
            0x0008 => "read",
            0x0009 => "write",
            0x0006 => "close",
            0x0010 => "query_info",
            _ => "other",
        }
    }

    /// Scans for a UTF-16LE `\\server\share` string.
    fn extract_unc_path(body: &[u8]) -> Option<String> {
        // Decode every even-aligned UTF-16LE run of printable characters.
        let mut best: Option<String> = None;
        let mut current = String::new();
        for pair in body.chunks_exact(2) {
            let code = u16::from_le_bytes([pair[0], pair[1]]);
            if let Some(c) = char::from_u32(code as u32) {
                if code != 0 && !c.is_control() {
                    current.push(c);
                    continue;
                }
            }
            if current.starts_with("\\\\") && current.len() > 3 {
                best = Some(current.clone());
            }
            current.clear();
        }
        if current.starts_with("\\\\") && current.len() > 3 {
            best = Some(current);
        }
        best
    }
}

impl Default for SmbParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolParser for SmbParser {
    fn name(&self) -> &'static str {
        "smb"
    }

    fn claims(&self, unit: &ParseUnit) -> bool {
        let body = Self::smb_body(&unit.payload);
        if body.len() >= 4 && (body[..4] == [0xff, b'S', b'M', b'B'] || body[..4] == [0xfe, b'S', b'M', b'B'])
        {
            return true;
        }
        unit.payload.is_empty() && matches!(unit.dest_port(), 139 | 445)
    }

    fn parse(&self, unit: &ParseUnit) -> Result<ParsedMessage, DlpError> {
        let mut message = ParsedMessage::new("smb");
        let body = Self::smb_body(&unit.payload);

        if body.len() < 16 {
            message.set_error("short SMB header");
            return Ok(message);
        }

        if body[..4] == [0xff, b'S', b'M', b'B'] {
            message.insert_metadata("dialect", "smb1");
            message.insert_metadata("smb_command", Self::smb1_command_name(body[4]));
        } else if body[..4] == [0xfe, b'S', b'M', b'B'] {
            message.insert_metadata("dialect", "smb2");
            let command = u16::from_le_bytes([body[12], body[13]]);
            message.insert_metadata("smb_command", Self::smb2_command_name(command));
        } else {
            message.set_error("not an SMB header");
            return Ok(message);
        }

        if let Some(path) = Self::extract_unc_path(body) {
            // \\server\share[\path...]
            message.insert_metadata("path", path.clone());
            let share = path
                .trim_start_matches('\\')
                .splitn(2, '\\')
                .nth(1)
                .map(|rest| rest.split('\\').next().unwrap_or(rest))
                .unwrap_or_default();
            if !share.is_empty() {
                message.insert_metadata("share", share);
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

    fn unit(payload: &[u8]) -> ParseUnit {
        ParseUnit::new(
            FlowKey::new(
                TransportProtocol::Tcp,
                "192.168.1.100:50000".parse().unwrap(),
                "10.9.8.7:445".parse().unwrap(),
            ),
            payload.to_vec(),
            false,
        )
    }

    fn utf16le(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(|c| c.to_le_bytes()).collect()
    }

    pub(crate) fn smb2_tree_connect(path: &str) -> Vec<u8> {
        let mut body = vec![0xfe, b'S', b'M', b'B'];
        body.extend_from_slice(&[64, 0]); // structure size
        body.extend_from_slice(&[0; 6]);
        body.extend_from_slice(&0x0003u16.to_le_bytes()); // tree_connect
        body.extend_from_slice(&[0; 50]); // rest of the 64-byte header + fixed part
        body.extend_from_slice(&utf16le(path));
        body
    }

    #[test]
    fn test_smb2_tree_connect_share() {
        let message = SmbParser::new()
            .parse(&unit(&smb2_tree_connect("\\\\fileserver\\finance")))
            .unwrap();
        assert_eq!(message.metadata().get("dialect").map(String::as_str), Some("smb2"));
        assert_eq!(
            message.metadata().get("smb_command").map(String::as_str),
            Some("tree_connect")
        );
        assert_eq!(
            message.metadata().get("path").map(String::as_str),
            Some("\\\\fileserver\\finance")
        );
        assert_eq!(message.metadata().get("share").map(String::as_str), Some("finance"));
    }

    #[test]
    fn test_smb1_write_command() {
        let mut body = vec![0xff, b'S', b'M', b'B', 0x2f];
        body.extend_from_slice(&[0; 28]);
        let message = SmbParser::new().parse(&unit(&body)).unwrap();
        assert_eq!(message.metadata().get("dialect").map(String::as_str), Some("smb1"));
        assert_eq!(message.metadata().get("smb_command").map(String::as_str), Some("write"));
    }

    #[test]
    fn test_short_header_sets_error() {
        let message = SmbParser::new().parse(&unit(&[0xfe, b'S', b'M', b'B'])).unwrap();
        assert!(message.error().is_some());
    }
}
