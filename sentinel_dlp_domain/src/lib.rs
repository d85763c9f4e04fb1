// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Sentinel DLP Domain
//!
//! The domain layer of the Sentinel DLP agent: the data model of the
//! interception pipeline and the service ports its stages plug into. It is
//! completely independent of external concerns - no capture backend, no
//! tokio runtime, no file system, no OS tables.
//!
//! ## Pipeline data flow
//!
//! ```text
//! PacketRecord ──attribution──▶ PacketRecord(+ProcessIdentity)
//!      │
//!      ▼ reassembly (FlowState)
//! ParseUnit ──parsers──▶ ParsedMessage
//!      │
//!      ▼ analyzers
//! AnalysisResult ──┐
//!                  ▼
//!          DecisionContext ──policy──▶ PolicyDecision
//!                                          │
//!                                          ▼ executors
//!                                    ExecutionResult ──▶ AuditRecord
//! ```
//!
//! ## Module Structure
//!
//! - [`entities`] - identified, mutable records flowing between stages
//! - [`value_objects`] - immutable, self-validating values (risk, masks,
//!   flow keys, ids)
//! - [`services`] - the ports implemented by infrastructure adapters
//! - [`error`] - the [`DlpError`] failure taxonomy
//!
//! ## Invariants enforced here
//!
//! - Risk scores cannot leave `[0, 1]`
//! - Masked values follow the two-edge mask rule; raw matches never
//!   serialize and are wiped on drop
//! - Flow buffers cannot exceed their caps; overflow truncates oldest-first
//! - Rule evaluation order (priority desc, id lexical) is defined once
//! - The audit JSON field set is bit-stable

pub mod entities;
pub mod error;
pub mod services;
pub mod value_objects;

// Re-export the high-traffic types at the crate root
pub use entities::{
    AnalysisResult, AuditRecord, DecisionContext, ExecutionResult, FlowState, PacketRecord,
    ParsedMessage, PolicyDecision, PolicyRule, ProcessIdentity, SensitiveHit,
};
pub use error::{DlpError, RetryKind};
pub use value_objects::{DecisionId, FlowKey, MaskedValue, RiskLevel, RiskScore};
