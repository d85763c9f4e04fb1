// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Flow State Entity
//!
//! Per-flow reassembly state: an append-only payload buffer with a hard cap,
//! the observation-driven phase machine, and the bookkeeping the flow table
//! needs for TTL expiry and aggregate accounting.
//!
//! ## Phase Machine
//!
//! Phases follow TCP observation, not TCP state proper - the agent is a
//! passive observer and only sees one host's half of the handshake:
//!
//! ```text
//! first SYN           → New
//! payload both ways   → Established
//! FIN or RST observed → Closing
//! TTL / cap expiry    → Closed
//! ```
//!
//! ## Invariants
//!
//! - The buffer never exceeds its per-flow cap: overflow drops the oldest
//!   bytes and sets the `truncated` flag.
//! - A `Closed` flow accepts no further payload.

use crate::value_objects::flow_key::FlowKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observation-driven flow phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowPhase {
    New,
    Established,
    Closing,
    Closed,
}

impl std::fmt::Display for FlowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FlowPhase::New => "new",
            FlowPhase::Established => "established",
            FlowPhase::Closing => "closing",
            FlowPhase::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Reassembly state for one flow.
#[derive(Debug, Clone)]
pub struct FlowState {
    key: FlowKey,
    phase: FlowPhase,
    buffer: Vec<u8>,
    buffer_cap: usize,
    truncated: bool,
    outbound_payload_seen: bool,
    inbound_payload_seen: bool,
    created_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl FlowState {
    /// Creates a new flow in phase `New`.
    pub fn new(key: FlowKey, buffer_cap: usize) -> Self {
        let now = Utc::now();
        Self {
            key,
            phase: FlowPhase::New,
            buffer: Vec::new(),
            buffer_cap,
            truncated: false,
            outbound_payload_seen: false,
            inbound_payload_seen: false,
            created_at: now,
            last_seen: now,
        }
    }

    pub fn key(&self) -> FlowKey {
        self.key
    }

    pub fn phase(&self) -> FlowPhase {
        self.phase
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.last_seen = at;
    }

    /// Appends payload observed in the given direction, enforcing the cap.
    ///
    /// Returns the number of bytes evicted from the front of the buffer when
    /// the cap was exceeded; the flow is marked truncated in that case.
    /// Payload appended to a `Closed` flow is ignored entirely.
    pub fn append_payload(&mut self, data: &[u8], outbound: bool) -> usize {
        if self.phase == FlowPhase::Closed || data.is_empty() {
            return 0;
        }
        if outbound {
            self.outbound_payload_seen = true;
        } else {
            self.inbound_payload_seen = true;
        }
        if self.phase == FlowPhase::New && self.outbound_payload_seen && self.inbound_payload_seen {
            self.phase = FlowPhase::Established;
        }

        self.buffer.extend_from_slice(data);
        let mut evicted = 0;
        if self.buffer.len() > self.buffer_cap {
            evicted = self.buffer.len() - self.buffer_cap;
            self.buffer.drain(..evicted);
            self.truncated = true;
        }
        self.last_seen = Utc::now();
        evicted
    }

    /// Records a SYN observation. Only meaningful before payload flows.
    pub fn observe_syn(&mut self) {
        if self.phase == FlowPhase::New {
            // Already New at construction; SYN confirms it.
            self.last_seen = Utc::now();
        }
    }

    /// Records a FIN or RST observation, moving the flow toward teardown.
    pub fn observe_fin_or_rst(&mut self) {
        if self.phase != FlowPhase::Closed {
            self.phase = FlowPhase::Closing;
            self.last_seen = Utc::now();
        }
    }

    /// Drains the buffered payload without changing phase. Used for
    /// mid-flow parse-unit emission.
    pub fn take_buffer(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    /// Closes the flow (TTL expiry, cap eviction, or teardown completion) and
    /// releases its buffer. Returns the bytes that were still buffered.
    pub fn close(&mut self) -> Vec<u8> {
        self.phase = FlowPhase::Closed;
        std::mem::take(&mut self.buffer)
    }

    pub fn is_closed(&self) -> bool {
        self.phase == FlowPhase::Closed
    }

    /// Whether teardown has been observed (`Closing` or `Closed`).
    pub fn is_terminating(&self) -> bool {
        matches!(self.phase, FlowPhase::Closing | FlowPhase::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::packet_record::TransportProtocol;

    fn key() -> FlowKey {
        FlowKey::new(
            TransportProtocol::Tcp,
            "10.1.2.3:50000".parse().unwrap(),
            "93.184.216.34:80".parse().unwrap(),
        )
    }

    #[test]
    fn test_phase_progression() {
        let mut flow = FlowState::new(key(), 1024);
        assert_eq!(flow.phase(), FlowPhase::New);

        flow.append_payload(b"GET / HTTP/1.1\r\n", true);
        assert_eq!(flow.phase(), FlowPhase::New);

        flow.append_payload(b"HTTP/1.1 200 OK\r\n", false);
        assert_eq!(flow.phase(), FlowPhase::Established);

        flow.observe_fin_or_rst();
        assert_eq!(flow.phase(), FlowPhase::Closing);

        flow.close();
        assert_eq!(flow.phase(), FlowPhase::Closed);
    }

    #[test]
    fn test_cap_drops_oldest_and_marks_truncated() {
        let mut flow = FlowState::new(key(), 8);
        flow.append_payload(b"01234567", true);
        assert!(!flow.is_truncated());

        let evicted = flow.append_payload(b"AB", true);
        assert_eq!(evicted, 2);
        assert!(flow.is_truncated());
        assert_eq!(flow.buffer(), b"234567AB");
        assert_eq!(flow.buffered_len(), 8);
    }

    #[test]
    fn test_closed_flow_ignores_payload() {
        let mut flow = FlowState::new(key(), 1024);
        flow.append_payload(b"data", true);
        let drained = flow.close();
        assert_eq!(drained, b"data");

        flow.append_payload(b"more", true);
        assert_eq!(flow.buffered_len(), 0);
        assert!(flow.is_closed());
    }
}
