// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Decision Context and Policy Decision
//!
//! [`DecisionContext`] is the full bundle handed to the policy engine: the
//! packet, its parsed message, the analysis result, and optional enrichment
//! slots. [`PolicyDecision`] is the engine's output.
//!
//! ## Dotted-path snapshot
//!
//! Rule conditions address the context by dotted path. Rather than hand-rolled
//! reflection, the context renders itself once per evaluation into a
//! `serde_json::Value` snapshot ([`DecisionContext::to_snapshot`]) whose
//! top-level keys are the path roots:
//!
//! - `packet_record.*` - endpoints, protocol, direction, process identity
//!   (payload bytes are deliberately omitted from the snapshot)
//! - `parsed_message.*` - protocol, url, method, headers, metadata
//! - `analysis_result.*` - risk_level, risk_score, categories, hit summaries
//! - `user.*`, `device.*`, `session.*`, `environment.*` - enrichment slots,
//!   absent when null
//!
//! ## Invariants
//!
//! - If analysis risk is Critical the decision's action is Block, whatever
//!   the matched actions said; if High, at least Alert. The reducer lives in
//!   the policy engine; [`PolicyDecision::risk_floor_action`] is the shared
//!   definition of "at least".

use crate::entities::analysis_result::AnalysisResult;
use crate::entities::packet_record::PacketRecord;
use crate::entities::parsed_message::ParsedMessage;
use crate::entities::policy_rule::{ActionKind, PolicyAction};
use crate::value_objects::decision_id::DecisionId;
use crate::value_objects::risk::{RiskLevel, RiskScore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Enrichment slot content: free-form string attributes.
pub type Enrichment = BTreeMap<String, String>;

/// The aggregate input record handed to the policy engine.
#[derive(Debug, Clone)]
pub struct DecisionContext {
    packet: PacketRecord,
    message: ParsedMessage,
    analysis: AnalysisResult,
    user: Option<Enrichment>,
    device: Option<Enrichment>,
    session: Option<Enrichment>,
    environment: Option<Enrichment>,
}

impl DecisionContext {
    pub fn new(packet: PacketRecord, message: ParsedMessage, analysis: AnalysisResult) -> Self {
        Self {
            packet,
            message,
            analysis,
            user: None,
            device: None,
            session: None,
            environment: None,
        }
    }

    pub fn packet(&self) -> &PacketRecord {
        &self.packet
    }

    pub fn message(&self) -> &ParsedMessage {
        &self.message
    }

    pub fn analysis(&self) -> &AnalysisResult {
        &self.analysis
    }

    pub fn user(&self) -> Option<&Enrichment> {
        self.user.as_ref()
    }

    pub fn set_user(&mut self, user: Enrichment) {
        self.user = Some(user);
    }

    pub fn set_device(&mut self, device: Enrichment) {
        self.device = Some(device);
    }

    pub fn set_session(&mut self, session: Enrichment) {
        self.session = Some(session);
    }

    pub fn set_environment(&mut self, environment: Enrichment) {
        self.environment = Some(environment);
    }

    /// Renders the dotted-path snapshot for condition evaluation.
    ///
    /// Built once per evaluation; the evaluator resolves every condition
    /// against this value. Payload bytes and raw hit values never appear.
    pub fn to_snapshot(&self) -> Value {
        let process = match self.packet.process() {
            Some(p) => json!({
                "pid": p.pid(),
                "name": p.name(),
                "path": p.path(),
                "command_line": p.command_line(),
                "parent_pid": p.parent_pid(),
                "user_name": p.user_name(),
            }),
            None => Value::Null,
        };

        let hits: Vec<Value> = self
            .analysis
            .hits()
            .iter()
            .map(|h| {
                json!({
                    "type": h.hit_type(),
                    "category": h.category(),
                    "masked_value": h.masked().as_str(),
                    "confidence": h.confidence(),
                    "rule_id": h.rule_id(),
                })
            })
            .collect();

        let mut root = json!({
            "packet_record": {
                "record_id": self.packet.record_id().to_string(),
                "direction": self.packet.direction().to_string(),
                "protocol": self.packet.protocol().as_str(),
                "source_ip": self.packet.source().ip().to_string(),
                "source_port": self.packet.source().port(),
                "dest_ip": self.packet.destination().ip().to_string(),
                "dest_port": self.packet.destination().port(),
                "payload_len": self.packet.payload().len(),
                "process": process,
            },
            "parsed_message": {
                "protocol": self.message.protocol(),
                "url": self.message.url(),
                "method": self.message.method(),
                "status_code": self.message.status_code(),
                "content_type": self.message.content_type(),
                "headers": self.message.headers(),
                "metadata": self.message.metadata(),
                "truncated": self.message.is_truncated(),
                "encrypted": self.message.is_encrypted(),
            },
            "analysis_result": {
                "risk_score": self.analysis.risk_score().value(),
                "risk_level": self.analysis.risk_level().as_str(),
                "categories": self.analysis.categories(),
                "hit_count": self.analysis.hits().len(),
                "hits": hits,
            },
        });

        if let Value::Object(ref mut obj) = root {
            for (slot, value) in [
                ("user", &self.user),
                ("device", &self.device),
                ("session", &self.session),
                ("environment", &self.environment),
            ] {
                if let Some(map) = value {
                    obj.insert(slot.to_string(), json!(map));
                }
            }
        }
        root
    }
}

/// The policy engine's verdict for one packet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    decision_id: DecisionId,
    action: PolicyAction,
    /// Ids of every rule that matched, in evaluation order.
    matched_rules: Vec<String>,
    /// Aggregate confidence over the matched rules.
    confidence: f64,
    risk_level: RiskLevel,
    risk_score: RiskScore,
    /// Human-readable reason. Non-empty whenever `matched_rules` is.
    reason: String,
    #[serde(with = "duration_millis")]
    elapsed: Duration,
    decided_at: DateTime<Utc>,
}

impl PolicyDecision {
    pub fn new(
        action: PolicyAction,
        matched_rules: Vec<String>,
        confidence: f64,
        risk_score: RiskScore,
        reason: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            decision_id: DecisionId::new(),
            action,
            matched_rules,
            confidence: confidence.clamp(0.0, 1.0),
            risk_level: risk_score.level(),
            risk_score,
            reason: reason.into(),
            elapsed,
            decided_at: Utc::now(),
        }
    }

    pub fn decision_id(&self) -> DecisionId {
        self.decision_id
    }

    pub fn action(&self) -> &PolicyAction {
        &self.action
    }

    pub fn matched_rules(&self) -> &[String] {
        &self.matched_rules
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn risk_score(&self) -> RiskScore {
        self.risk_score
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn decided_at(&self) -> DateTime<Utc> {
        self.decided_at
    }

    /// Replaces the action as part of the risk-override reducer, appending
    /// the override note to the reason.
    pub fn override_action(&mut self, action: PolicyAction, note: &str) {
        self.action = action;
        if self.reason.is_empty() {
            self.reason = note.to_string();
        } else {
            self.reason.push_str("; ");
            self.reason.push_str(note);
        }
    }

    /// Raises the decision's risk score (never lowers), refreshing the level.
    pub fn raise_risk(&mut self, score: RiskScore) {
        self.risk_score = self.risk_score.raise_to(score);
        self.risk_level = self.risk_score.level();
    }

    /// The minimum action severity a risk level forces: Critical → Block,
    /// High → Alert, otherwise none.
    pub fn risk_floor_action(level: RiskLevel) -> Option<ActionKind> {
        match level {
            RiskLevel::Critical => Some(ActionKind::Block),
            RiskLevel::High => Some(ActionKind::Alert),
            _ => None,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(de)?))
    }
}
