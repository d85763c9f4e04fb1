// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Audit Record Entity
//!
//! The durable, append-only summary of one processed packet's disposition:
//! the decision plus network and process context. One record is written per
//! processed packet that matched any rule or whose action was not Allow.
//!
//! ## Wire stability
//!
//! The JSON field set is bit-stable - external consumers parse the audit
//! stream, so field names here are a compatibility contract:
//!
//! ```json
//! { "id", "timestamp", "event_type", "action", "user_id", "device_id",
//!   "source_ip", "dest_ip", "source_port", "dest_port", "dest_domain",
//!   "request_url", "request_data", "protocol", "risk_level", "risk_score",
//!   "result", "reason",
//!   "process_info": { "pid", "name", "path", "command_line", "parent_pid",
//!                     "user_name" },
//!   "details", "metadata" }
//! ```
//!
//! `request_data` is the redacted request-body digest - the audit sink scrubs
//! sensitive fields before persistence; this entity stores whatever it is
//! given and performs no redaction itself.

use crate::entities::decision::PolicyDecision;
use crate::entities::packet_record::PacketRecord;
use crate::entities::parsed_message::ParsedMessage;
use crate::entities::process_identity::ProcessIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Process context fields of an audit record.
///
/// Always present; a packet with no attribution renders as the "unknown"
/// placeholder rather than omitting the object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditProcessInfo {
    pub pid: u32,
    pub name: String,
    pub path: String,
    pub command_line: String,
    pub parent_pid: u32,
    pub user_name: String,
}

impl From<&ProcessIdentity> for AuditProcessInfo {
    fn from(p: &ProcessIdentity) -> Self {
        Self {
            pid: p.pid(),
            name: p.name().to_string(),
            path: p.path().to_string(),
            command_line: p.command_line().to_string(),
            parent_pid: p.parent_pid(),
            user_name: p.user_name().to_string(),
        }
    }
}

/// One durable audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"network_egress"`.
    pub event_type: String,
    /// The decided action's wire spelling.
    pub action: String,
    pub user_id: String,
    pub device_id: String,
    pub source_ip: String,
    pub dest_ip: String,
    pub source_port: u16,
    pub dest_port: u16,
    /// Destination domain when resolvable (SNI, Host header, or reverse DNS),
    /// best-effort.
    pub dest_domain: String,
    pub request_url: String,
    /// Redacted request-body digest.
    pub request_data: String,
    pub protocol: String,
    pub risk_level: String,
    pub risk_score: f64,
    /// `"success"` or `"failure"` of the executed action.
    pub result: String,
    pub reason: String,
    pub process_info: AuditProcessInfo,
    pub details: BTreeMap<String, String>,
    pub metadata: BTreeMap<String, String>,
}

impl AuditRecord {
    /// Assembles a record from the pipeline artifacts of one packet.
    ///
    /// `request_data` must already be redacted by the caller (the audit sink
    /// owns the scrub rules).
    #[allow(clippy::too_many_arguments)]
    pub fn from_pipeline(
        packet: &PacketRecord,
        message: &ParsedMessage,
        decision: &PolicyDecision,
        dest_domain: String,
        request_data: String,
        result_success: bool,
    ) -> Self {
        let process_info = match packet.process() {
            Some(p) => AuditProcessInfo::from(p),
            None => AuditProcessInfo::from(&ProcessIdentity::unknown()),
        };

        let mut details = BTreeMap::new();
        if !decision.matched_rules().is_empty() {
            details.insert("matched_rules".to_string(), decision.matched_rules().join(","));
        }
        if message.is_truncated() {
            details.insert("truncated".to_string(), "true".to_string());
        }
        if let Some(err) = message.error() {
            details.insert("parse_error".to_string(), err.to_string());
        }

        Self {
            id: decision.decision_id().to_string(),
            timestamp: Utc::now(),
            event_type: "network_egress".to_string(),
            action: decision.action().kind().to_string(),
            user_id: process_info.user_name.clone(),
            device_id: String::new(),
            source_ip: packet.source().ip().to_string(),
            dest_ip: packet.destination().ip().to_string(),
            source_port: packet.source().port(),
            dest_port: packet.destination().port(),
            dest_domain,
            request_url: message.url().unwrap_or_default().to_string(),
            request_data,
            protocol: message.protocol().to_string(),
            risk_level: decision.risk_level().as_str().to_string(),
            risk_score: decision.risk_score().value(),
            result: if result_success { "success" } else { "failure" }.to_string(),
            reason: decision.reason().to_string(),
            process_info,
            details,
            metadata: message.metadata().clone(),
        }
    }
}
