// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Audit Sink Port
//!
//! Append-only persistence for audit records. `append` must be durable
//! before it returns - the Audit executor's success is the durability
//! receipt. Queries filter by time range, user, device, event type, action,
//! and minimum risk score.

use crate::entities::audit_record::AuditRecord;
use crate::error::DlpError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Filter for audit queries. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub device_id: Option<String>,
    pub event_type: Option<String>,
    pub action: Option<String>,
    pub min_risk_score: Option<f64>,
}

impl AuditQuery {
    /// Whether `record` satisfies every set filter.
    pub fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(from) = self.from {
            if record.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if record.timestamp > to {
                return false;
            }
        }
        if let Some(ref user) = self.user_id {
            if &record.user_id != user {
                return false;
            }
        }
        if let Some(ref device) = self.device_id {
            if &record.device_id != device {
                return false;
            }
        }
        if let Some(ref event_type) = self.event_type {
            if &record.event_type != event_type {
                return false;
            }
        }
        if let Some(ref action) = self.action {
            if &record.action != action {
                return false;
            }
        }
        if let Some(min) = self.min_risk_score {
            if record.risk_score < min {
                return false;
            }
        }
        true
    }
}

/// Append-only audit persistence.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends one record durably. Returns only after the bytes are synced.
    async fn append(&self, record: &AuditRecord) -> Result<(), DlpError>;

    /// Returns the records matching `query`, oldest first.
    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, DlpError>;
}
