// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # DLP Error System
//!
//! This module provides the hierarchical error system for the agent. It
//! categorizes failures, provides actionable error messages, and supports
//! both automated recovery (retry classification) and human-readable
//! diagnostics (structured log fields via `category()`).
//!
//! ## Design Principles
//!
//! - **Specific**: each variant represents one failure mode
//! - **Categorized**: `category()` yields a stable string for structured logs
//!   and per-stage metrics labels
//! - **Recoverable**: `is_retryable()` drives the execution retry policy;
//!   retryable executor failures carry a typed [`RetryKind`] rather than a
//!   free-form message so that retry matching survives message rewording
//! - **Aggregating**: `Aggregate` preserves every sub-cause from Stop/Cleanup
//!   paths instead of discarding all but the first
//!
//! ## Propagation Policy
//!
//! Per-stage errors are logged with structured fields and attached to the
//! record's metadata; they do not propagate upward past the orchestrator
//! worker. `InvalidConfiguration`, `PermissionDenied` and `DriverError`
//! raised during `Start` abort startup. `Cancelled` is returned by any long
//! operation whose cancellation token fires; partial side effects are rolled
//! back before it is surfaced.

use thiserror::Error;

/// Classification of a retryable executor failure.
///
/// The execution manager retries an attempt only when the error's kind is a
/// member of the configured retryable set. Kinds serialize to the wire
/// strings used in configuration files ("timeout", "connection_error",
/// "temporary_failure").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryKind {
    /// The attempt exceeded its deadline.
    Timeout,
    /// A transport-level connection failed or was refused.
    ConnectionError,
    /// A transient condition that is expected to clear (resource contention,
    /// table busy, driver momentarily unavailable).
    TemporaryFailure,
}

impl RetryKind {
    /// Stable configuration-file spelling of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryKind::Timeout => "timeout",
            RetryKind::ConnectionError => "connection_error",
            RetryKind::TemporaryFailure => "temporary_failure",
        }
    }

    /// Parses the configuration-file spelling. Unknown spellings yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "timeout" => Some(RetryKind::Timeout),
            "connection_error" => Some(RetryKind::ConnectionError),
            "temporary_failure" => Some(RetryKind::TemporaryFailure),
            _ => None,
        }
    }
}

impl std::fmt::Display for RetryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain-specific errors for the DLP interception pipeline.
///
/// Each variant includes a descriptive message. Errors are cloneable so they
/// can be attached to records, logged, and counted without consuming them.
#[derive(Error, Debug, Clone)]
pub enum DlpError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Driver error: {0}")]
    DriverError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Analyzer error: {0}")]
    AnalyzerError(String),

    #[error("Policy evaluation error: {0}")]
    PolicyEvaluation(String),

    #[error("Executor error ({kind}): {message}")]
    ExecutorRetryable { kind: RetryKind, message: String },

    #[error("Executor error (terminal): {0}")]
    ExecutorTerminal(String),

    #[error("Notification error: {0}")]
    NotificationError(String),

    #[error("Audit error: {0}")]
    AuditError(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("Multiple errors ({})", .0.len())]
    Aggregate(Vec<DlpError>),
}

impl DlpError {
    /// Creates a new configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates a new permission error
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Creates a new driver error
    pub fn driver_error(msg: impl Into<String>) -> Self {
        Self::DriverError(msg.into())
    }

    /// Creates a new parse error
    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Creates a new analyzer error
    pub fn analyzer_error(msg: impl Into<String>) -> Self {
        Self::AnalyzerError(msg.into())
    }

    /// Creates a new policy evaluation error
    pub fn policy_evaluation(msg: impl Into<String>) -> Self {
        Self::PolicyEvaluation(msg.into())
    }

    /// Creates a retryable executor error of the given kind
    pub fn executor_retryable(kind: RetryKind, msg: impl Into<String>) -> Self {
        Self::ExecutorRetryable {
            kind,
            message: msg.into(),
        }
    }

    /// Creates a terminal executor error
    pub fn executor_terminal(msg: impl Into<String>) -> Self {
        Self::ExecutorTerminal(msg.into())
    }

    /// Creates a new notification error
    pub fn notification_error(msg: impl Into<String>) -> Self {
        Self::NotificationError(msg.into())
    }

    /// Creates a new audit error
    pub fn audit_error(msg: impl Into<String>) -> Self {
        Self::AuditError(msg.into())
    }

    /// Creates a cancellation error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Creates a new IO error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::IoError(msg.into())
    }

    /// Creates a new resource exhausted error
    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    /// Creates a new internal error
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Creates a new metrics error
    pub fn metrics_error(msg: impl Into<String>) -> Self {
        Self::MetricsError(msg.into())
    }

    /// Folds a list of sub-errors into a single error.
    ///
    /// Returns `Ok(())` when the list is empty, the sole error when there is
    /// exactly one, and `Aggregate` otherwise. Stop/Cleanup paths use this to
    /// preserve every sub-cause.
    pub fn aggregate(errors: Vec<DlpError>) -> Result<(), DlpError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.into_iter().next().unwrap_or_else(|| {
                DlpError::InternalError("empty aggregate".to_string())
            })),
            _ => Err(DlpError::Aggregate(errors)),
        }
    }

    /// Returns the retry kind when this error is eligible for retry.
    pub fn retry_kind(&self) -> Option<RetryKind> {
        match self {
            DlpError::ExecutorRetryable { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Checks whether the error may succeed on retry
    pub fn is_retryable(&self) -> bool {
        self.retry_kind().is_some()
    }

    /// Checks whether the error aborts Start when raised during startup
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            DlpError::InvalidConfiguration(_) | DlpError::DriverError(_) | DlpError::AuditError(_)
        )
    }

    /// Checks whether the error represents cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DlpError::Cancelled(_))
    }

    /// Gets the error category for structured log fields and metric labels
    pub fn category(&self) -> &'static str {
        match self {
            DlpError::InvalidConfiguration(_) => "configuration",
            DlpError::PermissionDenied(_) => "permission",
            DlpError::DriverError(_) => "driver",
            DlpError::ParseError(_) => "parse",
            DlpError::AnalyzerError(_) => "analyzer",
            DlpError::PolicyEvaluation(_) => "policy",
            DlpError::ExecutorRetryable { .. } => "executor_retryable",
            DlpError::ExecutorTerminal(_) => "executor_terminal",
            DlpError::NotificationError(_) => "notification",
            DlpError::AuditError(_) => "audit",
            DlpError::Cancelled(_) => "cancellation",
            DlpError::IoError(_) => "io",
            DlpError::SerializationError(_) => "serialization",
            DlpError::ResourceExhausted(_) => "resource",
            DlpError::InternalError(_) => "internal",
            DlpError::MetricsError(_) => "metrics",
            DlpError::Aggregate(_) => "aggregate",
        }
    }
}

// Implement conversion from standard library errors
impl From<std::io::Error> for DlpError {
    fn from(err: std::io::Error) -> Self {
        DlpError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for DlpError {
    fn from(err: serde_json::Error) -> Self {
        DlpError::SerializationError(err.to_string())
    }
}
