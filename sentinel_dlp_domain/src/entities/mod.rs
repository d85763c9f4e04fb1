// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Entities
//!
//! The typed records that flow through the interception pipeline, in
//! hand-off order:
//!
//! 1. [`PacketRecord`] - produced by the interceptor, attributed by the
//!    attribution stage
//! 2. [`FlowState`] - per-flow reassembly state owned by the flow table
//! 3. [`ParsedMessage`] - application-layer view from the parser set
//! 4. [`AnalysisResult`] / [`SensitiveHit`] - content analysis output
//! 5. [`PolicyRule`] / [`DecisionContext`] / [`PolicyDecision`] - policy
//!    evaluation input and verdict
//! 6. [`ExecutionResult`] - action side-effect outcome
//! 7. [`AuditRecord`] - the durable disposition summary
//!
//! Each stage owns the record it produces until it is queued to the next
//! stage or dropped; stages never call each other directly.

pub mod analysis_result;
pub mod audit_record;
pub mod decision;
pub mod execution_result;
pub mod flow;
pub mod packet_record;
pub mod parsed_message;
pub mod policy_rule;
pub mod process_identity;

// Re-export all entity types for convenient access
pub use analysis_result::{AnalysisResult, SensitiveHit};
pub use audit_record::{AuditProcessInfo, AuditRecord};
pub use decision::{DecisionContext, Enrichment, PolicyDecision};
pub use execution_result::{
    AffectedData, EncryptedPayload, ExecutionResult, FirewallRule, QuarantinedFile, RedirectRule,
};
pub use flow::{FlowPhase, FlowState};
pub use packet_record::{Direction, PacketRecord, TcpObservation, TransportProtocol};
pub use parsed_message::ParsedMessage;
pub use policy_rule::{ActionKind, ConditionOperator, PolicyAction, PolicyRule, RuleCondition};
pub use process_identity::ProcessIdentity;
