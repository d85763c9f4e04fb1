// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Audit Sink
//!
//! Append-only JSON-lines persistence for audit records. Every `append` is
//! written and fsynced before it returns - the Audit executor's success is
//! the durability receipt. Inability to open the sink at Start is fatal for
//! the agent.
//!
//! Queries scan the log and apply the [`AuditQuery`] filter; the audit file
//! is the system of record, and scan cost is acceptable at host-agent
//! volume.

pub mod redaction;

use async_trait::async_trait;
use sentinel_dlp_domain::entities::audit_record::AuditRecord;
use sentinel_dlp_domain::error::DlpError;
use sentinel_dlp_domain::services::audit_sink::{AuditQuery, AuditSink};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// JSON-lines audit sink.
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl JsonlAuditSink {
    /// Opens (or creates) the audit log for appending.
    pub async fn open(path: &Path) -> Result<Self, DlpError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    DlpError::audit_error(format!("create audit dir {}: {}", parent.display(), e))
                })?;
            }
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| {
                DlpError::audit_error(format!("open audit log {}: {}", path.display(), e))
            })?;
        info!(path = %path.display(), "audit sink opened");
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<(), DlpError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| DlpError::audit_error(format!("append audit record: {}", e)))?;
        // Durable before success: the record must survive a crash.
        file.sync_all()
            .await
            .map_err(|e| DlpError::audit_error(format!("sync audit log: {}", e)))?;
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, DlpError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(DlpError::audit_error(format!(
                    "read audit log {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let mut records = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditRecord>(line) {
                Ok(record) => {
                    if query.matches(&record) {
                        records.push(record);
                    }
                }
                Err(e) => {
                    // A torn line from a crash is skipped, not fatal.
                    warn!(line = index + 1, error = %e, "skipping malformed audit line");
                }
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_dlp_domain::entities::audit_record::AuditProcessInfo;
    use std::collections::BTreeMap;

    fn record(action: &str, risk: f64, user: &str) -> AuditRecord {
        AuditRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            event_type: "network_egress".to_string(),
            action: action.to_string(),
            user_id: user.to_string(),
            device_id: "host-1".to_string(),
            source_ip: "192.168.1.100".to_string(),
            dest_ip: "8.8.8.8".to_string(),
            source_port: 54321,
            dest_port: 443,
            dest_domain: "example.com".to_string(),
            request_url: "https://example.com/x".to_string(),
            request_data: String::new(),
            protocol: "https".to_string(),
            risk_level: "low".to_string(),
            risk_score: risk,
            result: "success".to_string(),
            reason: "test".to_string(),
            process_info: AuditProcessInfo {
                pid: 1,
                name: "curl".to_string(),
                path: "/usr/bin/curl".to_string(),
                command_line: "curl".to_string(),
                parent_pid: 0,
                user_name: user.to_string(),
            },
            details: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_append_and_query_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlAuditSink::open(&dir.path().join("audit.jsonl")).await.unwrap();

        sink.append(&record("audit", 0.1, "alice")).await.unwrap();
        sink.append(&record("block", 0.9, "bob")).await.unwrap();

        let all = sink.query(&AuditQuery::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let blocks = sink
            .query(&AuditQuery {
                action: Some("block".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].user_id, "bob");

        let risky = sink
            .query(&AuditQuery {
                min_risk_score: Some(0.5),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(risky.len(), 1);
    }

    #[tokio::test]
    async fn test_torn_line_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = JsonlAuditSink::open(&path).await.unwrap();
        sink.append(&record("audit", 0.1, "alice")).await.unwrap();

        // Simulate a crash mid-write.
        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new().append(true).open(&path).await.unwrap();
        file.write_all(b"{\"id\": \"torn").await.unwrap();
        file.sync_all().await.unwrap();

        let all = sink.query(&AuditQuery::default()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_query_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = JsonlAuditSink::open(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();
        assert!(sink.query(&AuditQuery::default()).await.unwrap().is_empty());
    }
}
