// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Execution Result Entity
//!
//! Outcome of carrying out one policy decision: success flag, the error when
//! it failed, the side-effect artifact the executor produced, attempt count
//! (for the retry metric), and timing.

use crate::entities::policy_rule::ActionKind;
use crate::error::DlpError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// A drop rule installed by the Block executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub rule_id: String,
    pub source: SocketAddr,
    pub destination: SocketAddr,
    /// Optional lifetime; `None` means until explicitly removed.
    pub ttl_seconds: Option<u64>,
}

/// A file moved into quarantine by the Quarantine executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantinedFile {
    pub quarantine_id: String,
    pub original_path: PathBuf,
    pub quarantine_path: PathBuf,
    /// SHA-256 of the file content, hex-encoded.
    pub hash: String,
    pub size: u64,
}

/// A redirect rule installed by the Redirect executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectRule {
    pub rule_id: String,
    pub original_destination: SocketAddr,
    pub safe_destination: SocketAddr,
    pub protocol: String,
}

/// An encrypted payload artifact produced by the Encrypt executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub key_id: String,
    pub algorithm: String,
    /// Ciphertext length in bytes; ciphertext itself is persisted out-of-band.
    pub ciphertext_len: usize,
}

/// The side-effect artifact of an execution, when any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AffectedData {
    FirewallRule(FirewallRule),
    QuarantinedFile(QuarantinedFile),
    RedirectRule(RedirectRule),
    EncryptedPayload(EncryptedPayload),
    None,
}

/// Outcome of one decision execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    action: ActionKind,
    success: bool,
    /// Error string when execution failed (category-prefixed).
    error: Option<String>,
    affected: AffectedData,
    /// Total attempts made, including the successful one.
    attempts: u32,
    #[serde(with = "duration_millis")]
    elapsed: Duration,
    executed_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn success(action: ActionKind, affected: AffectedData, attempts: u32, elapsed: Duration) -> Self {
        Self {
            action,
            success: true,
            error: None,
            affected,
            attempts,
            elapsed,
            executed_at: Utc::now(),
        }
    }

    pub fn failure(action: ActionKind, error: &DlpError, attempts: u32, elapsed: Duration) -> Self {
        Self {
            action,
            success: false,
            error: Some(format!("{}: {}", error.category(), error)),
            affected: AffectedData::None,
            attempts,
            elapsed,
            executed_at: Utc::now(),
        }
    }

    pub fn action(&self) -> ActionKind {
        self.action
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn affected(&self) -> &AffectedData {
        &self.affected
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn executed_at(&self) -> DateTime<Utc> {
        self.executed_at
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RetryKind;

    #[test]
    fn test_success_result() {
        let r = ExecutionResult::success(ActionKind::Allow, AffectedData::None, 1, Duration::ZERO);
        assert!(r.is_success());
        assert!(r.error().is_none());
        assert_eq!(r.attempts(), 1);
    }

    #[test]
    fn test_failure_carries_category() {
        let err = DlpError::executor_retryable(RetryKind::Timeout, "deadline exceeded");
        let r = ExecutionResult::failure(ActionKind::Block, &err, 3, Duration::from_secs(7));
        assert!(!r.is_success());
        let msg = r.error().unwrap();
        assert!(msg.starts_with("executor_retryable:"));
        assert_eq!(r.attempts(), 3);
    }

    #[test]
    fn test_affected_data_tagging() {
        let affected = AffectedData::FirewallRule(FirewallRule {
            rule_id: "fw-1".to_string(),
            source: "10.0.0.1:1000".parse().unwrap(),
            destination: "8.8.8.8:443".parse().unwrap(),
            ttl_seconds: Some(300),
        });
        let json = serde_json::to_value(&affected).unwrap();
        assert_eq!(json["kind"], "firewall_rule");
    }
}
