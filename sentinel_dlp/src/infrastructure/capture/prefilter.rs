// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Address Prefilter
//!
//! Classification of destination addresses against the non-routable space
//! the pipeline must never inspect: loopback, RFC1918 private ranges,
//! link-local, multicast, and broadcast.
//!
//! The same test runs twice by design: once inside the kernel filter
//! expression (as an optimization) and once here in user space (as the
//! invariant). A packet that slips past the kernel filter - driver quirks,
//! filter-syntax gaps on a platform - is still discarded before any
//! downstream stage sees it.

use ipnet::{Ipv4Net, Ipv6Net};
use once_cell::sync::Lazy;
use std::net::IpAddr;

/// Why the prefilter discarded a destination. Doubles as the drop-metric
/// label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    Loopback,
    PrivateRange,
    LinkLocal,
    Multicast,
    Broadcast,
}

impl DropReason {
    /// Stable metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Loopback => "loopback",
            DropReason::PrivateRange => "private_range",
            DropReason::LinkLocal => "link_local",
            DropReason::Multicast => "multicast",
            DropReason::Broadcast => "broadcast",
        }
    }
}

/// The excluded IPv4 prefixes, in match order.
static EXCLUDED_V4: Lazy<Vec<(Ipv4Net, DropReason)>> = Lazy::new(|| {
    // Known-good literals; the fallback is unreachable.
    let parse = |s: &str| s.parse::<Ipv4Net>().unwrap_or_else(|_| Ipv4Net::default());
    vec![
        (parse("127.0.0.0/8"), DropReason::Loopback),
        (parse("10.0.0.0/8"), DropReason::PrivateRange),
        (parse("172.16.0.0/12"), DropReason::PrivateRange),
        (parse("192.168.0.0/16"), DropReason::PrivateRange),
        (parse("169.254.0.0/16"), DropReason::LinkLocal),
        (parse("224.0.0.0/4"), DropReason::Multicast),
        (parse("255.255.255.255/32"), DropReason::Broadcast),
    ]
});

/// The excluded IPv6 prefixes.
static EXCLUDED_V6: Lazy<Vec<(Ipv6Net, DropReason)>> = Lazy::new(|| {
    let parse = |s: &str| s.parse::<Ipv6Net>().unwrap_or_else(|_| Ipv6Net::default());
    vec![
        (parse("::1/128"), DropReason::Loopback),
        (parse("fc00::/7"), DropReason::PrivateRange),
        (parse("fe80::/10"), DropReason::LinkLocal),
        (parse("ff00::/8"), DropReason::Multicast),
    ]
});

/// Classifies a destination address. `Some` means the packet must be
/// discarded; the reason increments the matching drop counter.
pub fn classify_destination(addr: IpAddr) -> Option<DropReason> {
    match addr {
        IpAddr::V4(v4) => EXCLUDED_V4
            .iter()
            .find(|(net, _)| net.contains(&v4))
            .map(|(_, reason)| *reason),
        IpAddr::V6(v6) => EXCLUDED_V6
            .iter()
            .find(|(net, _)| net.contains(&v6))
            .map(|(_, reason)| *reason),
    }
}

/// The excluded IPv4 prefixes, for the kernel filter builder.
pub fn excluded_v4_prefixes() -> Vec<Ipv4Net> {
    EXCLUDED_V4.iter().map(|(net, _)| *net).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(s: &str) -> Option<DropReason> {
        classify_destination(s.parse().unwrap())
    }

    #[test]
    fn test_non_routable_space_is_dropped() {
        assert_eq!(classify("127.0.0.1"), Some(DropReason::Loopback));
        assert_eq!(classify("127.255.255.254"), Some(DropReason::Loopback));
        assert_eq!(classify("10.0.0.5"), Some(DropReason::PrivateRange));
        assert_eq!(classify("172.16.0.1"), Some(DropReason::PrivateRange));
        assert_eq!(classify("172.31.255.255"), Some(DropReason::PrivateRange));
        assert_eq!(classify("192.168.1.1"), Some(DropReason::PrivateRange));
        assert_eq!(classify("169.254.10.10"), Some(DropReason::LinkLocal));
        assert_eq!(classify("224.0.0.251"), Some(DropReason::Multicast));
        assert_eq!(classify("239.255.255.250"), Some(DropReason::Multicast));
        assert_eq!(classify("255.255.255.255"), Some(DropReason::Broadcast));
    }

    #[test]
    fn test_routable_space_passes() {
        assert_eq!(classify("8.8.8.8"), None);
        assert_eq!(classify("93.184.216.34"), None);
        assert_eq!(classify("172.32.0.1"), None); // just past 172.16/12
        assert_eq!(classify("11.0.0.1"), None); // just past 10/8
        assert_eq!(classify("2606:4700::1111"), None);
    }

    #[test]
    fn test_v6_equivalents() {
        assert_eq!(classify("::1"), Some(DropReason::Loopback));
        assert_eq!(classify("fe80::1"), Some(DropReason::LinkLocal));
        assert_eq!(classify("fd12:3456::1"), Some(DropReason::PrivateRange));
        assert_eq!(classify("ff02::fb"), Some(DropReason::Multicast));
    }
}
