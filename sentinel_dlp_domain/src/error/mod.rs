// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error Module
//!
//! Error types for the DLP agent domain layer. All failure modes that can
//! occur anywhere in the interception pipeline are expressed as variants of a
//! single [`DlpError`] enum so that stage boundaries, the orchestrator, and
//! the execution retry policy can classify failures without downcasting.
//!
//! ## Error Categories
//!
//! - **Startup**: `InvalidConfiguration`, `PermissionDenied`, `DriverError` -
//!   these abort `Start`; everything else is per-record.
//! - **Per-record**: `ParseError`, `AnalyzerError`, `PolicyEvaluation` - logged,
//!   attached to the record, never fatal.
//! - **Execution**: `ExecutorRetryable` (goes through the retry policy),
//!   `ExecutorTerminal` (recorded, notification emitted).
//! - **Lifecycle**: `Cancelled` for deadline/shutdown propagation,
//!   `Aggregate` for multi-error accumulation on Stop/Cleanup paths.

mod dlp_error;

pub use dlp_error::{DlpError, RetryKind};
