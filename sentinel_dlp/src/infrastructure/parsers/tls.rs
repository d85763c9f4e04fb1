// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # TLS Parser
//!
//! Parses the ClientHello of a TLS handshake and exposes what is observable
//! without decryption: server name (SNI), offered cipher suites, and the
//! negotiated-version hint. The body is never decrypted - encrypted streams
//! are metadata-only unless a decryption helper is configured upstream -
//! and every TLS message carries `metadata.encrypted = "true"`.
//!
//! ## Record layout walked here
//!
//! ```text
//! record:    type(1)=0x16 version(2) length(2)
//! handshake: type(1)=0x01 length(3)
//! hello:     version(2) random(32) session_id(1+n)
//!            cipher_suites(2+n) compression(1+n) extensions(2+n)
//! ext 0x0000 server_name: list_len(2) type(1)=0 name_len(2) name
//! ext 0x002b supported_versions: list_len(1) versions(2 each)
//! ```

use sentinel_dlp_domain::entities::parsed_message::ParsedMessage;
use sentinel_dlp_domain::error::DlpError;
use sentinel_dlp_domain::services::protocol_parser::{ParseUnit, ProtocolParser};

const RECORD_HANDSHAKE: u8 = 0x16;
const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;
const EXT_SERVER_NAME: u16 = 0x0000;
const EXT_SUPPORTED_VERSIONS: u16 = 0x002b;

/// TLS ClientHello parser.
pub struct TlsParser;

impl TlsParser {
    pub fn new() -> Self {
        Self
    }

    fn version_name(major: u8, minor: u8) -> &'static str {
        match (major, minor) {
            (3, 1) => "TLS1.0",
            (3, 2) => "TLS1.1",
            (3, 3) => "TLS1.2",
            (3, 4) => "TLS1.3",
            _ => "unknown",
        }
    }
}

impl Default for TlsParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounds-checked big-endian cursor over the hello bytes.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        if end > self.data.len() {
            return None;
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Some(slice)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    fn u24(&mut self) -> Option<usize> {
        self.take(3)
            .map(|b| ((b[0] as usize) << 16) | ((b[1] as usize) << 8) | b[2] as usize)
    }
}

impl ProtocolParser for TlsParser {
    fn name(&self) -> &'static str {
        "tls"
    }

    fn claims(&self, unit: &ParseUnit) -> bool {
        let payload = &unit.payload;
        if payload.len() >= 3 && payload[0] == RECORD_HANDSHAKE && payload[1] == 0x03 {
            return true;
        }
        unit.payload.is_empty() && unit.dest_port() == 443
    }

    fn parse(&self, unit: &ParseUnit) -> Result<ParsedMessage, DlpError> {
        let mut message = ParsedMessage::new("tls");
        message.insert_metadata("encrypted", "true");

        let mut cursor = Cursor::new(&unit.payload);
        let parse_result = (|| -> Option<()> {
            let record_type = cursor.u8()?;
            if record_type != RECORD_HANDSHAKE {
                return None;
            }
            let rec_major = cursor.u8()?;
            let rec_minor = cursor.u8()?;
            let _record_len = cursor.u16()?;

            let handshake_type = cursor.u8()?;
            if handshake_type != HANDSHAKE_CLIENT_HELLO {
                return None;
            }
            let _handshake_len = cursor.u24()?;

            let hello_major = cursor.u8()?;
            let hello_minor = cursor.u8()?;
            message.insert_metadata(
                "tls_version",
                Self::version_name(hello_major.max(rec_major), hello_minor.max(rec_minor)),
            );

            let _random = cursor.take(32)?;
            let session_id_len = cursor.u8()? as usize;
            let _session_id = cursor.take(session_id_len)?;

            let cipher_len = cursor.u16()? as usize;
            let ciphers = cursor.take(cipher_len)?;
            let suites: Vec<String> = ciphers
                .chunks_exact(2)
                .map(|pair| format!("0x{:02x}{:02x}", pair[0], pair[1]))
                .collect();
            message.insert_metadata("cipher_suites", suites.join(","));

            let compression_len = cursor.u8()? as usize;
            let _compression = cursor.take(compression_len)?;

            let extensions_len = cursor.u16()? as usize;
            let extensions = cursor.take(extensions_len)?;
            let mut ext_cursor = Cursor::new(extensions);
            while let (Some(ext_type), Some(ext_len)) = (ext_cursor.u16(), ext_cursor.u16()) {
                let Some(ext_data) = ext_cursor.take(ext_len as usize) else {
                    break;
                };
                match ext_type {
                    EXT_SERVER_NAME => {
                        let mut sni = Cursor::new(ext_data);
                        let _list_len = sni.u16()?;
                        let name_type = sni.u8()?;
                        let name_len = sni.u16()? as usize;
                        if name_type == 0 {
                            if let Some(name) = sni.take(name_len) {
                                if let Ok(name) = std::str::from_utf8(name) {
                                    message.insert_metadata("server_name", name);
                                }
                            }
                        }
                    }
                    EXT_SUPPORTED_VERSIONS => {
                        let mut versions = Cursor::new(ext_data);
                        let list_len = versions.u8()? as usize;
                        let mut best: Option<(u8, u8)> = None;
                        if let Some(list) = versions.take(list_len) {
                            for pair in list.chunks_exact(2) {
                                let candidate = (pair[0], pair[1]);
                                if best.map_or(true, |b| candidate > b) {
                                    best = Some(candidate);
                                }
                            }
                        }
                        if let Some((major, minor)) = best {
                            message.insert_metadata("tls_version", Self::version_name(major, minor));
                        }
                    }
                    _ => {}
                }
            }
            Some(())
        })();

        if parse_result.is_none() {
            if unit.payload.is_empty() {
                message.set_error("no handshake bytes observed");
            } else {
                message.set_error("malformed or non-ClientHello TLS record");
            }
        }

        Ok(message)
    }

    fn minimum_bytes(&self) -> usize {
        // Record header plus the fixed ClientHello prefix.
        48
    }
}


#[cfg(test)]
mod tests {
    use super::tests_support::client_hello;
    use super::*;
    use sentinel_dlp_domain::entities::packet_record::TransportProtocol;
    use sentinel_dlp_domain::value_objects::flow_key::FlowKey;

    fn unit(payload: &[u8]) -> ParseUnit {
        ParseUnit::new(
            FlowKey::new(
                TransportProtocol::Tcp,
                "192.168.1.100:54321".parse().unwrap(),
                "8.8.8.8:443".parse().unwrap(),
            ),
            payload.to_vec(),
            false,
        )
    }

    #[test]
    fn test_client_hello_sni_and_metadata() {
        let parser = TlsParser::new();
        let message = parser.parse(&unit(&client_hello("example.com"))).unwrap();

        assert!(message.is_encrypted());
        assert_eq!(
            message.metadata().get("server_name").map(String::as_str),
            Some("example.com")
        );
        assert_eq!(
            message.metadata().get("tls_version").map(String::as_str),
            Some("TLS1.2")
        );
        assert_eq!(
            message.metadata().get("cipher_suites").map(String::as_str),
            Some("0x1301,0x1302")
        );
        assert!(message.error().is_none());
        assert!(message.body().is_empty());
    }

    #[test]
    fn test_malformed_record_still_encrypted() {
        let parser = TlsParser::new();
        let message = parser.parse(&unit(&[0x16, 0x03, 0x01, 0x00])).unwrap();
        assert!(message.is_encrypted());
        assert!(message.error().is_some());
    }

    #[test]
    fn test_claims_magic_bytes_not_port_alone_with_payload() {
        let parser = TlsParser::new();
        assert!(parser.claims(&unit(&client_hello("x.test"))));
        // Non-TLS payload on 443 is not claimed; HTTP CONNECT etc. exists.
        let mut http_on_443 = unit(b"GET / HTTP/1.1\r\n\r\n");
        assert!(!parser.claims(&http_on_443));
        http_on_443.payload.clear();
        assert!(parser.claims(&http_on_443));
    }
}
