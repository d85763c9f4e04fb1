// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Kernel Filter Expression
//!
//! Builds the filter handed to the capture backend: outbound TCP to the
//! configured monitored ports, excluding the non-routable prefixes. The
//! concrete syntax is per-backend (WinDivert filter language on Windows,
//! pcap/BPF-style elsewhere); the semantics are the compatibility contract,
//! and the user-space prefilter re-applies the same test regardless.

use super::prefilter;
use std::fmt::Write as _;

/// The semantic filter: monitored ports plus the excluded prefix list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterExpression {
    ports: Vec<u16>,
}

impl FilterExpression {
    /// Builds the filter for the given monitored destination ports.
    pub fn for_ports(ports: &[u16]) -> Self {
        let mut ports = ports.to_vec();
        ports.sort_unstable();
        ports.dedup();
        Self { ports }
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    /// Whether a destination port is monitored.
    pub fn matches_port(&self, port: u16) -> bool {
        self.ports.binary_search(&port).is_ok()
    }

    /// pcap/BPF-style rendering used by the raw-socket backends.
    pub fn to_bpf(&self) -> String {
        let mut expr = String::from("tcp and (");
        for (i, port) in self.ports.iter().enumerate() {
            if i > 0 {
                expr.push_str(" or ");
            }
            let _ = write!(expr, "dst port {}", port);
        }
        expr.push(')');
        for net in prefilter::excluded_v4_prefixes() {
            let _ = write!(expr, " and not dst net {}", net);
        }
        expr
    }

    /// WinDivert filter-language rendering.
    pub fn to_windivert(&self) -> String {
        let mut expr = String::from("outbound and tcp and (");
        for (i, port) in self.ports.iter().enumerate() {
            if i > 0 {
                expr.push_str(" or ");
            }
            let _ = write!(expr, "tcp.DstPort == {}", port);
        }
        expr.push(')');
        for net in prefilter::excluded_v4_prefixes() {
            let first = net.network();
            let last = net.broadcast();
            let _ = write!(
                expr,
                " and not (ip.DstAddr >= {} and ip.DstAddr <= {})",
                first, last
            );
        }
        expr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ports_deduplicated_and_matchable() {
        let f = FilterExpression::for_ports(&[443, 80, 443, 25]);
        assert_eq!(f.ports(), [25, 80, 443]);
        assert!(f.matches_port(80));
        assert!(!f.matches_port(8080));
    }

    #[test]
    fn test_bpf_contains_every_port_and_exclusion() {
        let f = FilterExpression::for_ports(&[80, 443, 21, 25, 3306]);
        let expr = f.to_bpf();
        for port in [21, 25, 80, 443, 3306] {
            assert!(expr.contains(&format!("dst port {}", port)), "{}", expr);
        }
        for net in [
            "127.0.0.0/8",
            "10.0.0.0/8",
            "172.16.0.0/12",
            "192.168.0.0/16",
            "169.254.0.0/16",
            "224.0.0.0/4",
            "255.255.255.255/32",
        ] {
            assert!(expr.contains(&format!("not dst net {}", net)), "{}", expr);
        }
    }

    #[test]
    fn test_windivert_rendering_is_outbound_only() {
        let f = FilterExpression::for_ports(&[443]);
        let expr = f.to_windivert();
        assert!(expr.starts_with("outbound and tcp"));
        assert!(expr.contains("tcp.DstPort == 443"));
        assert!(expr.contains("ip.DstAddr >= 10.0.0.0 and ip.DstAddr <= 10.255.255.255"));
    }
}
