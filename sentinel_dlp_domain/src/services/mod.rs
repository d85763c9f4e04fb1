// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Service Ports
//!
//! The seams between the pipeline core and its collaborators. Everything
//! here is a trait; the infrastructure layer provides the implementations
//! and the application layer wires them together at Start.
//!
//! CPU-bound ports (parsers, analyzers, predictors) are synchronous; ports
//! that wrap I/O (packet source, process resolver, executors, audit sink,
//! notification channels, OCR) are async via `async_trait`.
//!
//! Peripheral enrichment paths - OCR, ML scoring, stream decryption - are
//! deliberately port-only here: the core contracts their interfaces and
//! ships at most a trivial implementation.

pub mod action_executor;
pub mod audit_sink;
pub mod content_analyzer;
pub mod notification;
pub mod packet_source;
pub mod process_resolver;
pub mod protocol_parser;

pub use action_executor::ActionExecutor;
pub use audit_sink::{AuditQuery, AuditSink};
pub use content_analyzer::{ContentAnalyzer, DecryptionHelper, OcrEngine, RiskPredictor};
pub use notification::{Notification, NotificationChannel, NotificationSeverity};
pub use packet_source::{ComponentHealth, PacketSource};
pub use process_resolver::ProcessResolver;
pub use protocol_parser::{ParseUnit, ProtocolParser};
