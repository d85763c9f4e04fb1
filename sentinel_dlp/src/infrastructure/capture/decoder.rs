// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Frame Decoder
//!
//! Decodes raw captured frames into endpoint/payload tuples with
//! `etherparse`. Frames that are not IP, or whose transport is neither TCP,
//! UDP, nor ICMP, decode to `None` and are counted, never logged per-frame.

use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use sentinel_dlp_domain::entities::packet_record::{TcpObservation, TransportProtocol};
use std::net::{IpAddr, SocketAddr};

/// Link-layer framing the backend delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayer {
    /// Frames start with an Ethernet header (AF_PACKET).
    Ethernet,
    /// Frames start at the IP header (WinDivert, tunnel devices).
    Ip,
}

/// A decoded L3/L4 view of one frame.
#[derive(Debug, Clone)]
pub struct DecodedPacket {
    pub protocol: TransportProtocol,
    pub source: SocketAddr,
    pub destination: SocketAddr,
    pub payload: Vec<u8>,
    pub tcp: Option<TcpObservation>,
}

/// Decodes one frame. Returns `None` for anything the pipeline does not
/// inspect.
pub fn decode_frame(frame: &[u8], link: LinkLayer) -> Option<DecodedPacket> {
    let sliced = match link {
        LinkLayer::Ethernet => SlicedPacket::from_ethernet(frame).ok()?,
        LinkLayer::Ip => SlicedPacket::from_ip(frame).ok()?,
    };

    let (src_ip, dst_ip): (IpAddr, IpAddr) = match sliced.net.as_ref()? {
        NetSlice::Ipv4(v4) => (
            IpAddr::V4(v4.header().source_addr()),
            IpAddr::V4(v4.header().destination_addr()),
        ),
        NetSlice::Ipv6(v6) => (
            IpAddr::V6(v6.header().source_addr()),
            IpAddr::V6(v6.header().destination_addr()),
        ),
    };

    match sliced.transport? {
        TransportSlice::Tcp(tcp) => Some(DecodedPacket {
            protocol: TransportProtocol::Tcp,
            source: SocketAddr::new(src_ip, tcp.source_port()),
            destination: SocketAddr::new(dst_ip, tcp.destination_port()),
            payload: tcp.payload().to_vec(),
            tcp: Some(TcpObservation {
                syn: tcp.syn(),
                fin: tcp.fin(),
                rst: tcp.rst(),
            }),
        }),
        TransportSlice::Udp(udp) => Some(DecodedPacket {
            protocol: TransportProtocol::Udp,
            source: SocketAddr::new(src_ip, udp.source_port()),
            destination: SocketAddr::new(dst_ip, udp.destination_port()),
            payload: udp.payload().to_vec(),
            tcp: None,
        }),
        TransportSlice::Icmpv4(icmp) => Some(DecodedPacket {
            protocol: TransportProtocol::Icmp,
            source: SocketAddr::new(src_ip, 0),
            destination: SocketAddr::new(dst_ip, 0),
            payload: icmp.payload().to_vec(),
            tcp: None,
        }),
        TransportSlice::Icmpv6(icmp) => Some(DecodedPacket {
            protocol: TransportProtocol::Icmp,
            source: SocketAddr::new(src_ip, 0),
            destination: SocketAddr::new(dst_ip, 0),
            payload: icmp.payload().to_vec(),
            tcp: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::PacketBuilder;

    #[test]
    fn test_decode_tcp_over_ethernet() {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv4([192, 168, 1, 100], [8, 8, 8, 8], 64)
            .tcp(54321, 443, 1000, 64240);
        let payload = b"\x16\x03\x01";
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, payload).unwrap();

        let decoded = decode_frame(&frame, LinkLayer::Ethernet).unwrap();
        assert_eq!(decoded.protocol, TransportProtocol::Tcp);
        assert_eq!(decoded.source, "192.168.1.100:54321".parse().unwrap());
        assert_eq!(decoded.destination, "8.8.8.8:443".parse().unwrap());
        assert_eq!(decoded.payload, payload);
        let tcp = decoded.tcp.unwrap();
        assert!(!tcp.syn && !tcp.fin && !tcp.rst);
    }

    #[test]
    fn test_decode_udp_from_ip() {
        let builder = PacketBuilder::ipv4([10, 1, 2, 3], [8, 8, 4, 4], 64).udp(5353, 53);
        let payload = b"dns?";
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, payload).unwrap();

        let decoded = decode_frame(&frame, LinkLayer::Ip).unwrap();
        assert_eq!(decoded.protocol, TransportProtocol::Udp);
        assert_eq!(decoded.destination.port(), 53);
        assert!(decoded.tcp.is_none());
    }

    #[test]
    fn test_garbage_decodes_to_none() {
        assert!(decode_frame(&[0u8; 4], LinkLayer::Ethernet).is_none());
        assert!(decode_frame(b"not a packet at all", LinkLayer::Ip).is_none());
    }
}
