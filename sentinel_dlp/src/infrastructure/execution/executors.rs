// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Action Executors
//!
//! One executor per action kind. Executors own only the side effect; the
//! execution manager owns retry, timeout, metrics, and notification.
//!
//! - **Allow** - no side effect; exists so Allow still lands in metrics.
//! - **Alert** - no direct side effect; the manager's notification path is
//!   the alert delivery.
//! - **Audit** - durable write through the audit sink, request data
//!   redacted first.
//! - **Block** - installs a drop rule in the firewall table, optional TTL.
//! - **Redirect** - installs an original → safe destination mapping.
//! - **Encrypt** - encrypts the captured payload (AES-256-GCM or
//!   ChaCha20-Poly1305) and persists key metadata out-of-band.
//! - **Quarantine** - moves the referenced file into the quarantine
//!   directory with an integrity hash and restore metadata.

use super::firewall::FirewallHandle;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use base64::Engine as _;
use chacha20poly1305::ChaCha20Poly1305;
use chrono::Utc;
use rand::RngCore;
use sentinel_dlp_domain::entities::decision::{DecisionContext, PolicyDecision};
use sentinel_dlp_domain::entities::execution_result::{
    AffectedData, EncryptedPayload, FirewallRule, QuarantinedFile, RedirectRule,
};
use sentinel_dlp_domain::entities::policy_rule::ActionKind;
use sentinel_dlp_domain::entities::AuditRecord;
use sentinel_dlp_domain::error::{DlpError, RetryKind};
use sentinel_dlp_domain::services::action_executor::ActionExecutor;
use sentinel_dlp_domain::services::audit_sink::AuditSink;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroize;

/// Best-effort destination domain: TLS SNI first, then the HTTP Host.
pub fn best_effort_domain(context: &DecisionContext) -> String {
    let metadata = context.message().metadata();
    metadata
        .get("server_name")
        .or_else(|| metadata.get("host"))
        .cloned()
        .unwrap_or_default()
}

/// No-op executor for Allow.
pub struct AllowExecutor;

#[async_trait]
impl ActionExecutor for AllowExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::Allow
    }

    async fn execute(
        &self,
        _decision: &PolicyDecision,
        _context: &DecisionContext,
    ) -> Result<AffectedData, DlpError> {
        Ok(AffectedData::None)
    }
}

/// Alert executor: the side effect is the manager's notification.
pub struct AlertExecutor;

#[async_trait]
impl ActionExecutor for AlertExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::Alert
    }

    async fn execute(
        &self,
        decision: &PolicyDecision,
        _context: &DecisionContext,
    ) -> Result<AffectedData, DlpError> {
        debug!(decision = %decision.decision_id(), "alert raised");
        Ok(AffectedData::None)
    }
}

/// Audit executor: durable write-through.
pub struct AuditExecutor {
    sink: Arc<dyn AuditSink>,
}

impl AuditExecutor {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Builds the redacted audit record for a decision.
    pub fn build_record(
        decision: &PolicyDecision,
        context: &DecisionContext,
        result_success: bool,
    ) -> AuditRecord {
        let request_data =
            crate::infrastructure::audit::redaction::redact(&context.message().body_text());
        AuditRecord::from_pipeline(
            context.packet(),
            context.message(),
            decision,
            best_effort_domain(context),
            request_data,
            result_success,
        )
    }
}

#[async_trait]
impl ActionExecutor for AuditExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::Audit
    }

    async fn execute(
        &self,
        decision: &PolicyDecision,
        context: &DecisionContext,
    ) -> Result<AffectedData, DlpError> {
        let record = Self::build_record(decision, context, true);
        self.sink.append(&record).await?;
        Ok(AffectedData::None)
    }
}

/// Block executor: drop rule keyed by source/destination.
pub struct BlockExecutor {
    firewall: FirewallHandle,
}

impl BlockExecutor {
    pub fn new(firewall: FirewallHandle) -> Self {
        Self { firewall }
    }
}

#[async_trait]
impl ActionExecutor for BlockExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::Block
    }

    async fn execute(
        &self,
        decision: &PolicyDecision,
        context: &DecisionContext,
    ) -> Result<AffectedData, DlpError> {
        let ttl_seconds = decision
            .action()
            .params()
            .get("ttl_seconds")
            .and_then(|v| v.as_u64());
        let rule = FirewallRule {
            rule_id: format!("fw-{}", decision.decision_id()),
            source: context.packet().source(),
            destination: context.packet().destination(),
            ttl_seconds,
        };
        self.firewall.install_drop(rule.clone()).await?;
        info!(rule = %rule.rule_id, destination = %rule.destination, "drop rule installed");
        Ok(AffectedData::FirewallRule(rule))
    }
}

/// Redirect executor: original destination → safe destination.
pub struct RedirectExecutor {
    firewall: FirewallHandle,
}

impl RedirectExecutor {
    pub fn new(firewall: FirewallHandle) -> Self {
        Self { firewall }
    }
}

#[async_trait]
impl ActionExecutor for RedirectExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::Redirect
    }

    async fn execute(
        &self,
        decision: &PolicyDecision,
        context: &DecisionContext,
    ) -> Result<AffectedData, DlpError> {
        let safe = decision
            .action()
            .param_str("safe_destination")
            .ok_or_else(|| {
                DlpError::executor_terminal("redirect action requires a safe_destination parameter")
            })?;
        let safe_destination = safe.parse().map_err(|e| {
            DlpError::executor_terminal(format!("bad safe_destination {:?}: {}", safe, e))
        })?;

        let rule = RedirectRule {
            rule_id: format!("rd-{}", decision.decision_id()),
            original_destination: context.packet().destination(),
            safe_destination,
            protocol: context.message().protocol().to_string(),
        };
        self.firewall.install_redirect(rule.clone()).await?;
        info!(rule = %rule.rule_id, to = %rule.safe_destination, "redirect rule installed");
        Ok(AffectedData::RedirectRule(rule))
    }
}

/// Supported payload encryption algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncryptionAlgorithm {
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl EncryptionAlgorithm {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "aes256gcm" => Some(Self::Aes256Gcm),
            "chacha20poly1305" => Some(Self::ChaCha20Poly1305),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "aes256gcm",
            Self::ChaCha20Poly1305 => "chacha20poly1305",
        }
    }
}

/// Encrypt executor: captured payload encryption with out-of-band key
/// metadata.
pub struct EncryptExecutor {
    key_store_dir: PathBuf,
}

impl EncryptExecutor {
    pub fn new(key_store_dir: PathBuf) -> Self {
        Self { key_store_dir }
    }

    fn encrypt_payload(
        algorithm: EncryptionAlgorithm,
        key: &[u8; 32],
        nonce: &[u8; 12],
        payload: &[u8],
    ) -> Result<Vec<u8>, DlpError> {
        match algorithm {
            EncryptionAlgorithm::Aes256Gcm => {
                let cipher = Aes256Gcm::new(key.into());
                cipher
                    .encrypt(Nonce::from_slice(nonce), payload)
                    .map_err(|e| DlpError::executor_terminal(format!("aes-gcm encrypt: {}", e)))
            }
            EncryptionAlgorithm::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new(key.into());
                cipher
                    .encrypt(chacha20poly1305::Nonce::from_slice(nonce), payload)
                    .map_err(|e| DlpError::executor_terminal(format!("chacha20 encrypt: {}", e)))
            }
        }
    }
}

#[async_trait]
impl ActionExecutor for EncryptExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::Encrypt
    }

    async fn execute(
        &self,
        decision: &PolicyDecision,
        context: &DecisionContext,
    ) -> Result<AffectedData, DlpError> {
        let algorithm = match decision.action().param_str("algorithm") {
            Some(name) => EncryptionAlgorithm::parse(name).ok_or_else(|| {
                DlpError::executor_terminal(format!("unknown encryption algorithm '{}'", name))
            })?,
            None => EncryptionAlgorithm::Aes256Gcm,
        };

        let payload: &[u8] = if context.message().body().is_empty() {
            context.packet().payload()
        } else {
            context.message().body()
        };

        let mut key = [0u8; 32];
        let mut nonce = [0u8; 12];
        rand::rng().fill_bytes(&mut key);
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = Self::encrypt_payload(algorithm, &key, &nonce, payload)?;

        let key_id = format!("enc-{}", decision.decision_id());
        tokio::fs::create_dir_all(&self.key_store_dir)
            .await
            .map_err(|e| {
                DlpError::executor_retryable(
                    RetryKind::TemporaryFailure,
                    format!("create key store dir: {}", e),
                )
            })?;

        let ciphertext_path = self.key_store_dir.join(format!("{}.bin", key_id));
        tokio::fs::write(&ciphertext_path, &ciphertext)
            .await
            .map_err(|e| {
                DlpError::executor_retryable(
                    RetryKind::TemporaryFailure,
                    format!("write ciphertext: {}", e),
                )
            })?;

        // Key metadata lives out-of-band from the audit stream.
        let b64 = base64::engine::general_purpose::STANDARD;
        let metadata = serde_json::json!({
            "key_id": key_id,
            "algorithm": algorithm.as_str(),
            "key": b64.encode(key),
            "nonce": b64.encode(nonce),
            "ciphertext_path": ciphertext_path,
            "created_at": Utc::now(),
        });
        let metadata_path = self.key_store_dir.join(format!("{}.key.json", key_id));
        let write_result = tokio::fs::write(
            &metadata_path,
            serde_json::to_vec_pretty(&metadata).unwrap_or_default(),
        )
        .await;
        key.zeroize();

        if let Err(e) = write_result {
            // Roll back the ciphertext so no partial artifact remains.
            let _ = tokio::fs::remove_file(&ciphertext_path).await;
            return Err(DlpError::executor_retryable(
                RetryKind::TemporaryFailure,
                format!("write key metadata: {}", e),
            ));
        }

        info!(key_id = %key_id, algorithm = algorithm.as_str(), bytes = ciphertext.len(),
              "payload encrypted");
        Ok(AffectedData::EncryptedPayload(EncryptedPayload {
            key_id,
            algorithm: algorithm.as_str().to_string(),
            ciphertext_len: ciphertext.len(),
        }))
    }
}

/// Quarantine executor: supervised file relocation with restore metadata.
pub struct QuarantineExecutor {
    quarantine_dir: PathBuf,
}

/// Sidecar metadata layout: `{quarantine_dir}/{id}` + `{id}.meta.json`.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct QuarantineMetadata {
    pub original_path: PathBuf,
    pub reason: String,
    pub hash: String,
    pub size: u64,
    pub timestamp: chrono::DateTime<Utc>,
}

impl QuarantineExecutor {
    pub fn new(quarantine_dir: PathBuf) -> Self {
        Self { quarantine_dir }
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.quarantine_dir.join(format!("{}.meta.json", id))
    }

    fn file_path(&self, id: &str) -> PathBuf {
        self.quarantine_dir.join(id)
    }

    /// Restores a quarantined file to its original location, verifying the
    /// integrity hash. The quarantine copy is removed on success.
    pub async fn restore(&self, id: &str) -> Result<PathBuf, DlpError> {
        let metadata_text = tokio::fs::read_to_string(self.meta_path(id))
            .await
            .map_err(|e| DlpError::executor_terminal(format!("read quarantine metadata: {}", e)))?;
        let metadata: QuarantineMetadata = serde_json::from_str(&metadata_text)?;

        let bytes = tokio::fs::read(self.file_path(id))
            .await
            .map_err(|e| DlpError::executor_terminal(format!("read quarantined file: {}", e)))?;

        let hash = hex::encode(Sha256::digest(&bytes));
        if hash != metadata.hash {
            return Err(DlpError::executor_terminal(format!(
                "quarantine integrity mismatch for '{}': expected {}, got {}",
                id, metadata.hash, hash
            )));
        }

        tokio::fs::write(&metadata.original_path, &bytes)
            .await
            .map_err(|e| DlpError::executor_terminal(format!("restore write: {}", e)))?;
        let _ = tokio::fs::remove_file(self.file_path(id)).await;
        let _ = tokio::fs::remove_file(self.meta_path(id)).await;
        info!(id, path = %metadata.original_path.display(), "file restored from quarantine");
        Ok(metadata.original_path)
    }

    /// The file a decision refers to: the action parameter first, then the
    /// parsed transfer path.
    fn target_path(decision: &PolicyDecision, context: &DecisionContext) -> Option<PathBuf> {
        decision
            .action()
            .param_str("path")
            .map(PathBuf::from)
            .or_else(|| context.message().metadata().get("path").map(PathBuf::from))
    }
}

#[async_trait]
impl ActionExecutor for QuarantineExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::Quarantine
    }

    async fn execute(
        &self,
        decision: &PolicyDecision,
        context: &DecisionContext,
    ) -> Result<AffectedData, DlpError> {
        let Some(original_path) = Self::target_path(decision, context) else {
            return Err(DlpError::executor_terminal(
                "quarantine action has no file path (param 'path' or parsed transfer path)",
            ));
        };

        let bytes = tokio::fs::read(&original_path).await.map_err(|e| {
            DlpError::executor_terminal(format!(
                "read quarantine target {}: {}",
                original_path.display(),
                e
            ))
        })?;
        let hash = hex::encode(Sha256::digest(&bytes));
        let size = bytes.len() as u64;
        let id = format!("q-{}", decision.decision_id());

        tokio::fs::create_dir_all(&self.quarantine_dir)
            .await
            .map_err(|e| {
                DlpError::executor_retryable(
                    RetryKind::TemporaryFailure,
                    format!("create quarantine dir: {}", e),
                )
            })?;

        let quarantine_path = self.file_path(&id);
        tokio::fs::write(&quarantine_path, &bytes)
            .await
            .map_err(|e| {
                DlpError::executor_retryable(
                    RetryKind::TemporaryFailure,
                    format!("write quarantine copy: {}", e),
                )
            })?;

        let metadata = QuarantineMetadata {
            original_path: original_path.clone(),
            reason: decision.reason().to_string(),
            hash: hash.clone(),
            size,
            timestamp: Utc::now(),
        };
        if let Err(e) = tokio::fs::write(
            self.meta_path(&id),
            serde_json::to_vec_pretty(&metadata).unwrap_or_default(),
        )
        .await
        {
            // No sidecar means no restore path: undo the copy.
            let _ = tokio::fs::remove_file(&quarantine_path).await;
            return Err(DlpError::executor_retryable(
                RetryKind::TemporaryFailure,
                format!("write quarantine metadata: {}", e),
            ));
        }

        // The original disappears only after the copy and sidecar are safe.
        tokio::fs::remove_file(&original_path).await.map_err(|e| {
            DlpError::executor_terminal(format!("remove quarantined original: {}", e))
        })?;

        info!(id = %id, from = %original_path.display(), "file quarantined");
        Ok(AffectedData::QuarantinedFile(QuarantinedFile {
            quarantine_id: id,
            original_path,
            quarantine_path,
            hash,
            size,
        }))
    }
}
