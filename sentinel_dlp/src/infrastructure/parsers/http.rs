// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # HTTP Parser
//!
//! Decodes HTTP/1.x request and response units: start line, headers, and a
//! size-capped body. For requests the full URL is reconstructed - scheme
//! resolved from the destination port, `Host` header, and
//! `X-Forwarded-Proto`.
//!
//! Malformed input produces a best-effort message with `error` set; only
//! internal faults return `Err`.

use sentinel_dlp_domain::entities::parsed_message::ParsedMessage;
use sentinel_dlp_domain::error::DlpError;
use sentinel_dlp_domain::services::protocol_parser::{ParseUnit, ProtocolParser};

const HTTP_METHODS: [&str; 9] = [
    "GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH", "TRACE", "CONNECT",
];

/// HTTP/1.x parser.
pub struct HttpParser {
    max_body_bytes: usize,
}

impl HttpParser {
    pub fn new(max_body_bytes: usize) -> Self {
        Self { max_body_bytes }
    }

    fn looks_like_http(payload: &[u8]) -> bool {
        let head = &payload[..payload.len().min(10)];
        let Ok(text) = std::str::from_utf8(head) else {
            return false;
        };
        text.starts_with("HTTP/") || HTTP_METHODS.iter().any(|m| text.starts_with(m))
    }

    fn parse_request(&self, unit: &ParseUnit, text: &str, message: &mut ParsedMessage) {
        let mut lines = text.split("\r\n");
        let Some(request_line) = lines.next() else {
            message.set_error("empty request");
            return;
        };

        let mut parts = request_line.split(' ');
        let method = parts.next().unwrap_or_default();
        let path = parts.next().unwrap_or_default();
        message.set_method(method);

        let mut host = String::new();
        let mut forwarded_proto = None;
        for line in lines.by_ref() {
            if line.is_empty() {
                break;
            }
            let Some((name, value)) = line.split_once(':') else {
                message.set_error(format!("malformed header line: {:?}", line));
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim().to_string();
            if name == "host" {
                host = value.clone();
            } else if name == "x-forwarded-proto" {
                forwarded_proto = Some(value.clone());
            } else if name == "content-type" {
                message.set_content_type(value.clone());
            }
            message.insert_header(name, value);
        }

        // Scheme: forwarded proto wins, then the well-known TLS port.
        let scheme = forwarded_proto.unwrap_or_else(|| {
            if unit.dest_port() == 443 {
                "https".to_string()
            } else {
                "http".to_string()
            }
        });
        if !host.is_empty() {
            message.insert_metadata("host", host.clone());
            message.set_url(format!("{}://{}{}", scheme, host, path));
        } else {
            message.set_url(path);
        }
    }

    fn parse_response(&self, text: &str, message: &mut ParsedMessage) {
        let mut lines = text.split("\r\n");
        let Some(status_line) = lines.next() else {
            message.set_error("empty response");
            return;
        };

        let mut parts = status_line.split(' ');
        let _version = parts.next();
        match parts.next().and_then(|code| code.parse::<u16>().ok()) {
            Some(code) => message.set_status_code(code),
            None => message.set_error(format!("malformed status line: {:?}", status_line)),
        }

        for line in lines {
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                let name = name.trim().to_ascii_lowercase();
                let value = value.trim().to_string();
                if name == "content-type" {
                    message.set_content_type(value.clone());
                }
                message.insert_header(name, value);
            }
        }
    }
}

impl ProtocolParser for HttpParser {
    fn name(&self) -> &'static str {
        "http"
    }

    fn claims(&self, unit: &ParseUnit) -> bool {
        if Self::looks_like_http(&unit.payload) {
            return true;
        }
        unit.payload.is_empty() && matches!(unit.dest_port(), 80 | 8080)
    }

    fn parse(&self, unit: &ParseUnit) -> Result<ParsedMessage, DlpError> {
        let mut message = ParsedMessage::new("http");

        // Headers are ASCII; decode the head lossily and find the body split
        // on the raw bytes so binary bodies survive.
        let text = String::from_utf8_lossy(&unit.payload);
        let is_response = text.starts_with("HTTP/");
        if is_response {
            self.parse_response(&text, &mut message);
        } else {
            self.parse_request(unit, &text, &mut message);
        }

        if let Some(split) = find_header_end(&unit.payload) {
            let body = &unit.payload[split..];
            let capped = &body[..body.len().min(self.max_body_bytes)];
            if capped.len() < body.len() {
                message.set_truncated(true);
            }
            message.set_body(capped.to_vec());
        } else if message.error().is_none() && !text.contains("\r\n") {
            message.set_error("incomplete HTTP head");
        }

        if message.content_type().is_none() && !message.body().is_empty() {
            // Body with no declared type: leave typed analysis to the sniffer.
            message.set_content_type("application/octet-stream");
        }

        Ok(message)
    }

    fn minimum_bytes(&self) -> usize {
        // Enough for the request line and Host header of a typical request.
        64
    }
}

/// Byte offset just past the `\r\n\r\n` head terminator.
fn find_header_end(payload: &[u8]) -> Option<usize> {
    payload
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4)
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
    fn test_post_request_with_body() {
        let payload = b"POST /login HTTP/1.1\r\nHost: api.example.com\r\nContent-Type: application/json\r\n\r\n{\"password\":\"s3cr3t\",\"user\":\"alice\"}";
        let parser = HttpParser::new(1024 * 1024);
        let message = parser.parse(&unit(80, payload)).unwrap();

        assert_eq!(message.method(), Some("POST"));
        assert_eq!(message.url(), Some("http://api.example.com/login"));
        assert_eq!(message.content_type(), Some("application/json"));
        assert_eq!(message.body_text(), "{\"password\":\"s3cr3t\",\"user\":\"alice\"}");
        assert!(message.error().is_none());
    }

    #[test]
    fn test_scheme_resolution() {
        let parser = HttpParser::new(1024);

        let https = parser
            .parse(&unit(443, b"GET /x HTTP/1.1\r\nHost: example.com\r\n\r\n"))
            .unwrap();
        assert_eq!(https.url(), Some("https://example.com/x"));

        let forwarded = parser
            .parse(&unit(
                80,
                b"GET /x HTTP/1.1\r\nHost: example.com\r\nX-Forwarded-Proto: https\r\n\r\n",
            ))
            .unwrap();
        assert_eq!(forwarded.url(), Some("https://example.com/x"));
    }

    #[test]
    fn test_response_status_and_headers() {
        let parser = HttpParser::new(1024);
        let message = parser
            .parse(&unit(
                80,
                b"HTTP/1.1 302 Found\r\nLocation: /next\r\nContent-Type: text/html\r\n\r\n<a>moved</a>",
            ))
            .unwrap();
        assert_eq!(message.status_code(), Some(302));
        assert_eq!(message.headers().get("location").map(String::as_str), Some("/next"));
        assert_eq!(message.content_type(), Some("text/html"));
    }

    #[test]
    fn test_body_cap_marks_truncated() {
        let parser = HttpParser::new(4);
        let message = parser
            .parse(&unit(80, b"POST / HTTP/1.1\r\nHost: h\r\n\r\n0123456789"))
            .unwrap();
        assert_eq!(message.body(), b"0123");
        assert!(message.is_truncated());
    }

    #[test]
    fn test_malformed_input_sets_error() {
        let parser = HttpParser::new(1024);
        let message = parser.parse(&unit(80, b"GET")).unwrap();
        assert!(message.error().is_some());
    }

    #[test]
    fn test_claims_on_method_or_port() {
        let parser = HttpParser::new(1024);
        assert!(parser.claims(&unit(9999, b"DELETE /x HTTP/1.1\r\n")));
        assert!(parser.claims(&unit(80, b"")));
        assert!(!parser.claims(&unit(9999, b"\x16\x03\x01")));
    }
}
