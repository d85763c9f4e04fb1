// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Packet Record Entity
//!
//! The unit of work produced by the traffic interceptor and carried through
//! the whole pipeline. A `PacketRecord` is one captured L4 segment with its
//! payload, endpoints, direction, and (once attribution has run) the identity
//! of the process that produced it.
//!
//! ## Ownership
//!
//! The interceptor owns a record until it is handed to the orchestrator
//! queue; each downstream stage owns the record it produces until queued or
//! dropped. Records are never shared mutably across stages.
//!
//! ## Invariants
//!
//! - Outbound records destined for non-routable space never enter the
//!   pipeline; the interceptor's prefilter discards them before emission.
//! - `record_id` is assigned exactly once at capture and is carried through
//!   to the audit record, which is what ties a decision back to its packet.

use crate::entities::process_identity::ProcessIdentity;
use crate::value_objects::flow_key::FlowKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

/// Direction of a captured packet relative to this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Inbound => f.write_str("inbound"),
            Direction::Outbound => f.write_str("outbound"),
        }
    }
}

/// Transport protocol of a captured packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    Tcp,
    Udp,
    Icmp,
}

impl TransportProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportProtocol::Tcp => "tcp",
            TransportProtocol::Udp => "udp",
            TransportProtocol::Icmp => "icmp",
        }
    }
}

impl std::fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TCP flags observed on a segment, as far as the reassembler cares.
///
/// Only the flags that drive flow phase transitions are modeled; the decoder
/// collapses everything else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpObservation {
    pub syn: bool,
    pub fin: bool,
    pub rst: bool,
}

/// One captured L4 segment with process attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketRecord {
    record_id: Uuid,
    captured_at: DateTime<Utc>,
    direction: Direction,
    protocol: TransportProtocol,
    source: SocketAddr,
    destination: SocketAddr,
    #[serde(with = "serde_bytes_vec")]
    payload: Vec<u8>,
    tcp: Option<TcpObservation>,
    process: Option<ProcessIdentity>,
}

impl PacketRecord {
    pub fn new(
        direction: Direction,
        protocol: TransportProtocol,
        source: SocketAddr,
        destination: SocketAddr,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            captured_at: Utc::now(),
            direction,
            protocol,
            source,
            destination,
            payload,
            tcp: None,
            process: None,
        }
    }

    /// Attaches the TCP flag observation from the decoder.
    pub fn with_tcp_observation(mut self, tcp: TcpObservation) -> Self {
        self.tcp = Some(tcp);
        self
    }

    pub fn record_id(&self) -> Uuid {
        self.record_id
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn protocol(&self) -> TransportProtocol {
        self.protocol
    }

    pub fn source(&self) -> SocketAddr {
        self.source
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn tcp_observation(&self) -> Option<TcpObservation> {
        self.tcp
    }

    /// The producing process, when attribution succeeded.
    ///
    /// A `None` here never drops the packet; the audit record renders the
    /// process fields as "unknown" instead.
    pub fn process(&self) -> Option<&ProcessIdentity> {
        self.process.as_ref()
    }

    /// Attaches (or clears) the attributed process identity.
    pub fn set_process(&mut self, process: Option<ProcessIdentity>) {
        self.process = process;
    }

    /// The direction-sensitive flow key for this record.
    pub fn flow_key(&self) -> FlowKey {
        FlowKey::new(self.protocol, self.source, self.destination)
    }

    pub fn is_outbound(&self) -> bool {
        self.direction == Direction::Outbound
    }
}

/// Payload serialization as a plain byte array.
///
/// The payload participates in serde so test fixtures can be written as
/// JSON; production paths never serialize whole packets.
mod serde_bytes_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.collect_seq(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        Vec::<u8>::deserialize(de)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PacketRecord {
        PacketRecord::new(
            Direction::Outbound,
            TransportProtocol::Tcp,
            "192.168.1.100:54321".parse().unwrap(),
            "8.8.8.8:443".parse().unwrap(),
            b"hello".to_vec(),
        )
    }

    #[test]
    fn test_record_id_is_stable() {
        let r = record();
        assert_eq!(r.record_id(), r.record_id());
        assert_ne!(r.record_id(), record().record_id());
    }

    #[test]
    fn test_flow_key_matches_endpoints() {
        let r = record();
        let key = r.flow_key();
        assert_eq!(key.source, r.source());
        assert_eq!(key.destination, r.destination());
        assert_eq!(key.protocol, TransportProtocol::Tcp);
    }

    #[test]
    fn test_attribution_is_optional() {
        let mut r = record();
        assert!(r.process().is_none());
        r.set_process(Some(crate::entities::process_identity::ProcessIdentity::unknown()));
        assert!(r.process().is_some());
    }
}
