// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Protocol Parser Port
//!
//! One parser per wire protocol, dispatched by the parser registry. Parsers
//! are stateless per call: everything they need arrives in the
//! [`ParseUnit`] the reassembler emits.
//!
//! ## Contract
//!
//! - `claims()` performs protocol detection for this parser: port heuristic
//!   plus magic-byte sniffing. The registry dispatches each unit to exactly
//!   one parser (first claim in registration order; the generic fallback
//!   claims everything).
//! - `parse()` never fails the pipeline: on malformed input it returns a
//!   `ParsedMessage` with the `error` field populated and best-effort
//!   partial fields, reserving `Err` for internal faults.

use crate::entities::parsed_message::ParsedMessage;
use crate::error::DlpError;
use crate::value_objects::flow_key::FlowKey;

/// A reassembled payload unit ready for protocol parsing.
#[derive(Debug, Clone)]
pub struct ParseUnit {
    pub key: FlowKey,
    /// Reassembled payload, oldest byte first.
    pub payload: Vec<u8>,
    /// Whether the source flow dropped bytes at its cap.
    pub truncated: bool,
}

impl ParseUnit {
    pub fn new(key: FlowKey, payload: Vec<u8>, truncated: bool) -> Self {
        Self {
            key,
            payload,
            truncated,
        }
    }

    /// Destination port, the primary detection heuristic.
    pub fn dest_port(&self) -> u16 {
        self.key.destination.port()
    }
}

/// A single wire-protocol parser.
pub trait ProtocolParser: Send + Sync {
    /// Protocol name this parser produces ("http", "tls", ...).
    fn name(&self) -> &'static str;

    /// Whether this parser recognizes the unit (port heuristic + magic
    /// bytes).
    fn claims(&self, unit: &ParseUnit) -> bool;

    /// Parses the unit. Malformed input yields an error-field message, not
    /// an `Err`.
    fn parse(&self, unit: &ParseUnit) -> Result<ParsedMessage, DlpError>;

    /// Minimum buffered bytes before a mid-flow parse attempt is worthwhile.
    /// The reassembler emits early once this many bytes are buffered; flow
    /// close always emits regardless.
    fn minimum_bytes(&self) -> usize {
        16
    }
}
