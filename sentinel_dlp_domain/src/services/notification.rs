// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Notification Port
//!
//! Structured notifications emitted by the execution manager on
//! Block/Alert/Quarantine/Encrypt actions and on execution failure.
//! Delivery is asynchronous and best-effort: a full notification queue drops
//! the notification and logs, never blocking the action path.
//!
//! Recipients are required configuration - there is no default address.

use crate::error::DlpError;
use crate::value_objects::risk::RiskLevel;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Notification severity, aligned with risk levels.
pub type NotificationSeverity = RiskLevel;

/// One structured notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub severity: NotificationSeverity,
    pub created_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        severity: NotificationSeverity,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            message: message.into(),
            severity,
            created_at: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A delivery channel (email, sms, webhook, slack, teams).
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Channel name as it appears in configuration.
    fn name(&self) -> &'static str;

    /// Delivers one notification.
    async fn send(&self, notification: &Notification) -> Result<(), DlpError>;
}
