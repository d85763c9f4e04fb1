// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Agent Configuration
//!
//! The typed configuration schema, parsed once at Start. No component reads
//! raw key/value maps at runtime - the untyped world ends here.
//!
//! ## Sources
//!
//! Configuration is layered through the `config` crate:
//!
//! 1. Built-in defaults (every field has one; an empty file is valid)
//! 2. A TOML or YAML file passed via `--config`
//! 3. Environment overrides with the `SENTINEL_DLP_` prefix
//!
//! ## Normalization
//!
//! YAML loaders commonly produce maps whose keys are not strings (numeric
//! port lists, quoted booleans). [`normalize_keys`] converts such values
//! into string-keyed maps before deserialization so the typed schema can
//! accept them.
//!
//! ## Idempotence
//!
//! `AgentConfig::default()` equals deserializing an empty document, and
//! applying defaults twice is equivalent to applying them once - the
//! round-trip tests pin this.

use sentinel_dlp_domain::entities::PolicyRule;
use sentinel_dlp_domain::error::DlpError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub monitor_network: MonitorNetwork,
    pub monitor_files: MonitorFiles,
    pub monitor_clipboard: MonitorClipboard,
    pub monitored_directories: Vec<String>,
    pub monitored_file_types: Vec<String>,
    pub network_protocols: NetworkProtocols,
    pub max_concurrency: MaxConcurrency,
    pub buffer_size: BufferSize,
    pub capture: CaptureConfig,
    pub attribution: AttributionConfig,
    pub reassembly: ReassemblyConfig,
    pub parser: ParserConfig,
    pub analysis: AnalysisConfig,
    pub ocr: OcrConfig,
    pub ml: MlConfig,
    pub rules: Vec<PolicyRule>,
    pub alerts: AlertsConfig,
    pub audit: AuditConfig,
    pub engine: EngineConfig,
    pub executor: ExecutorConfig,
    pub quarantine: QuarantineConfig,
    pub encryption: EncryptionConfig,
}

// Newtype wrappers give scalar fields their documented defaults while
// keeping `#[serde(default)]` on the root struct.

macro_rules! default_scalar {
    ($name:ident, $ty:ty, $default:expr) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $ty);

        impl Default for $name {
            fn default() -> Self {
                $name($default)
            }
        }

        impl std::ops::Deref for $name {
            type Target = $ty;
            fn deref(&self) -> &$ty {
                &self.0
            }
        }
    };
}

default_scalar!(MonitorNetwork, bool, true);
default_scalar!(MonitorFiles, bool, true);
default_scalar!(MonitorClipboard, bool, true);
default_scalar!(MaxConcurrency, usize, 4);
default_scalar!(BufferSize, usize, 500);

/// Monitored application protocols.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkProtocols(pub Vec<String>);

impl Default for NetworkProtocols {
    fn default() -> Self {
        NetworkProtocols(
            ["http", "https", "ftp", "smtp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }
}

/// Capture stage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
    /// Destination ports the kernel filter matches.
    pub monitored_ports: Vec<u16>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            monitored_ports: vec![80, 443, 21, 25, 3306],
        }
    }
}

/// Process attribution configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttributionConfig {
    /// Connection-table refresh interval in seconds.
    pub refresh_interval_secs: u64,
    /// PID → identity cache TTL in seconds.
    pub process_ttl_secs: u64,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 1,
            process_ttl_secs: 60,
        }
    }
}

impl AttributionConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn process_ttl(&self) -> Duration {
        Duration::from_secs(self.process_ttl_secs)
    }
}

/// Flow reassembly configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReassemblyConfig {
    /// Per-flow buffer cap in bytes.
    pub per_flow_cap_bytes: usize,
    /// Aggregate cap across all flows in bytes.
    pub aggregate_cap_bytes: usize,
    /// Flow TTL in seconds; expired flows close and release their buffers.
    pub flow_ttl_secs: u64,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            per_flow_cap_bytes: 64 * 1024,
            aggregate_cap_bytes: 10 * 1024 * 1024,
            flow_ttl_secs: 300,
        }
    }
}

impl ReassemblyConfig {
    pub fn flow_ttl(&self) -> Duration {
        Duration::from_secs(self.flow_ttl_secs)
    }
}

/// Protocol parser configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParserConfig {
    /// Body size cap in bytes (HTTP and generic bodies).
    pub max_body_bytes: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Content analysis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Hits below this confidence are discarded.
    pub min_confidence: f64,
    /// Per-pattern match cap bounding worst-case regex work.
    pub max_matches_per_pattern: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            max_matches_per_pattern: 100,
        }
    }
}

/// OCR enrichment configuration (interface-only in the core).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct OcrConfig {
    pub enabled: bool,
    pub tesseract: TesseractConfig,
}

/// Tesseract helper configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TesseractConfig {
    pub languages: Vec<String>,
    pub timeout_seconds: u64,
    pub max_image_size: usize,
    pub enable_preprocessing: bool,
    pub tesseract_path: Option<PathBuf>,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            languages: vec!["eng".to_string()],
            timeout_seconds: 10,
            max_image_size: 8 * 1024 * 1024,
            enable_preprocessing: true,
            tesseract_path: None,
        }
    }
}

/// ML enrichment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct MlConfig {
    pub enabled: bool,
    pub simple_model: SimpleModelConfig,
}

/// Keyword-frequency model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimpleModelConfig {
    pub sensitive_keywords: Vec<String>,
    pub confidence_threshold: f64,
    pub risk_threshold: f64,
}

impl Default for SimpleModelConfig {
    fn default() -> Self {
        Self {
            sensitive_keywords: ["confidential", "secret", "internal only", "password"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            confidence_threshold: 0.5,
            risk_threshold: 0.6,
        }
    }
}

/// One configured alert delivery channel.
///
/// Recipients are required when the channel is enabled - there is no
/// default address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct AlertChannelConfig {
    pub enabled: bool,
    /// Channel recipients (addresses, numbers, or webhook URLs).
    pub recipients: Vec<String>,
    /// Channel-specific settings (SMTP host, webhook secret, ...).
    pub settings: BTreeMap<String, String>,
}

/// Alert fan-out configuration, keyed by channel name
/// (email, sms, webhook, slack, teams).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertsConfig {
    pub channels: BTreeMap<String, AlertChannelConfig>,
    /// Bounded notification queue capacity; overflow drops and logs.
    pub queue_capacity: usize,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            channels: BTreeMap::new(),
            queue_capacity: 256,
        }
    }
}

/// Audit sink configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Append-only JSON-lines log path.
    pub log_path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("sentinel_audit.jsonl"),
        }
    }
}

/// Policy engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum rule count the store accepts.
    pub max_rules: usize,
    /// Per-evaluation deadline in milliseconds.
    pub timeout_ms: u64,
    /// Action taken when no rule matches: "allow", "block", "alert",
    /// "audit", "encrypt", "quarantine", or "redirect".
    pub default_action: String,
    pub enable_ml_engine: bool,
    pub ml_model_path: Option<PathBuf>,
    /// Orchestrator ingress queue capacity.
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_rules: 10_000,
            timeout_ms: 1_000,
            default_action: "audit".to_string(),
            enable_ml_engine: false,
            ml_model_path: None,
            queue_capacity: 200,
        }
    }
}

impl EngineConfig {
    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Execution manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Per-attempt timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum attempts (first try included).
    pub max_retries: u32,
    /// Initial backoff in seconds; doubles per attempt, capped at 30s.
    pub retry_interval_secs: u64,
    pub max_concurrency: usize,
    /// Error kinds eligible for retry.
    pub retryable_kinds: Vec<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 3,
            retry_interval_secs: 1,
            max_concurrency: 4,
            retryable_kinds: ["timeout", "connection_error", "temporary_failure"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Quarantine executor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuarantineConfig {
    /// Quarantine directory; files land at `{dir}/{id}` with a sidecar
    /// metadata record.
    pub directory: PathBuf,
}

impl Default for QuarantineConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("quarantine"),
        }
    }
}

/// Encrypt executor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncryptionConfig {
    /// Directory for out-of-band key metadata and ciphertext artifacts.
    pub key_store_dir: PathBuf,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            key_store_dir: PathBuf::from("keys"),
        }
    }
}

impl AgentConfig {
    /// Loads configuration from defaults, an optional file, and environment
    /// overrides, then validates it.
    pub fn load(path: Option<&Path>) -> Result<Self, DlpError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("SENTINEL_DLP")
                .separator("__")
                .try_parsing(true),
        );

        let raw: serde_json::Value = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| DlpError::invalid_config(format!("cannot load configuration: {}", e)))?;

        Self::from_value(raw)
    }

    /// Builds a config from a loosely-typed JSON value.
    pub fn from_value(raw: serde_json::Value) -> Result<Self, DlpError> {
        let config: AgentConfig = serde_json::from_value(raw)
            .map_err(|e| DlpError::invalid_config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a YAML document, normalizing untyped keys first.
    pub fn from_yaml_str(text: &str) -> Result<Self, DlpError> {
        let raw: serde_yaml::Value = serde_yaml::from_str(text)
            .map_err(|e| DlpError::invalid_config(format!("invalid YAML: {}", e)))?;
        Self::from_value(normalize_yaml(raw))
    }

    /// Validates cross-field constraints.
    pub fn validate(&self) -> Result<(), DlpError> {
        if *self.max_concurrency == 0 {
            return Err(DlpError::invalid_config("max_concurrency must be at least 1"));
        }
        if *self.buffer_size == 0 {
            return Err(DlpError::invalid_config("buffer_size must be at least 1"));
        }
        if self.capture.monitored_ports.is_empty() {
            return Err(DlpError::invalid_config("capture.monitored_ports must not be empty"));
        }
        if self.reassembly.per_flow_cap_bytes == 0
            || self.reassembly.per_flow_cap_bytes > self.reassembly.aggregate_cap_bytes
        {
            return Err(DlpError::invalid_config(
                "reassembly caps must satisfy 0 < per_flow <= aggregate",
            ));
        }
        if !(0.0..=1.0).contains(&self.analysis.min_confidence) {
            return Err(DlpError::invalid_config("analysis.min_confidence must be in [0,1]"));
        }
        if sentinel_dlp_domain::entities::policy_rule::ActionKind::parse_str(
            &self.engine.default_action,
        )
        .is_none()
        {
            return Err(DlpError::invalid_config(format!(
                "engine.default_action '{}' is not a known action",
                self.engine.default_action
            )));
        }
        if self.rules.len() > self.engine.max_rules {
            return Err(DlpError::invalid_config(format!(
                "{} rules configured, engine.max_rules is {}",
                self.rules.len(),
                self.engine.max_rules
            )));
        }
        for rule in &self.rules {
            rule.validate().map_err(DlpError::invalid_config)?;
        }
        for kind in &self.executor.retryable_kinds {
            if sentinel_dlp_domain::error::RetryKind::parse(kind).is_none() {
                return Err(DlpError::invalid_config(format!(
                    "executor.retryable_kinds contains unknown kind '{}'",
                    kind
                )));
            }
        }
        for (name, channel) in &self.alerts.channels {
            if channel.enabled && channel.recipients.is_empty() {
                return Err(DlpError::invalid_config(format!(
                    "alerts.channels.{} is enabled but has no recipients",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Recursively converts a YAML value into a JSON value, stringifying
/// non-string mapping keys along the way.
///
/// YAML loaders hand numeric and boolean mapping keys through as typed
/// scalars; the typed schema only accepts string keys. Sequences and
/// scalars pass through untouched.
pub fn normalize_yaml(value: serde_yaml::Value) -> serde_json::Value {
    use serde_json::Value as Json;
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::Null => Json::Null,
        Yaml::Bool(b) => Json::Bool(b),
        Yaml::Number(n) => serde_json::to_value(n).unwrap_or(Json::Null),
        Yaml::String(s) => Json::String(s),
        Yaml::Sequence(items) => Json::Array(items.into_iter().map(normalize_yaml).collect()),
        Yaml::Mapping(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                let key = match k {
                    Yaml::String(s) => s,
                    Yaml::Bool(b) => b.to_string(),
                    Yaml::Number(n) => n.to_string(),
                    other => serde_yaml::to_string(&other)
                        .unwrap_or_default()
                        .trim()
                        .to_string(),
                };
                out.insert(key, normalize_yaml(v));
            }
            Json::Object(out)
        }
        Yaml::Tagged(tagged) => normalize_yaml(tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_match_documented_values() {
        let c = AgentConfig::default();
        assert!(*c.monitor_network);
        assert!(*c.monitor_files);
        assert!(*c.monitor_clipboard);
        assert_eq!(c.network_protocols.0, ["http", "https", "ftp", "smtp"]);
        assert_eq!(*c.max_concurrency, 4);
        assert_eq!(*c.buffer_size, 500);
        assert_eq!(c.capture.monitored_ports, [80, 443, 21, 25, 3306]);
        assert_eq!(c.attribution.refresh_interval_secs, 1);
        assert_eq!(c.attribution.process_ttl_secs, 60);
        assert_eq!(c.reassembly.per_flow_cap_bytes, 64 * 1024);
        assert_eq!(c.reassembly.aggregate_cap_bytes, 10 * 1024 * 1024);
        assert_eq!(c.reassembly.flow_ttl_secs, 300);
        assert_eq!(c.engine.max_rules, 10_000);
        assert_eq!(c.engine.default_action, "audit");
        assert_eq!(c.engine.queue_capacity, 200);
        assert_eq!(c.executor.max_retries, 3);
        assert_eq!(c.executor.retry_interval_secs, 1);
        assert_eq!(
            c.executor.retryable_kinds,
            ["timeout", "connection_error", "temporary_failure"]
        );
    }

    #[test]
    fn test_empty_document_is_valid() {
        let c = AgentConfig::from_value(json!({})).unwrap();
        assert_eq!(c, AgentConfig::default());
    }

    #[test]
    fn test_applying_defaults_twice_is_idempotent() {
        let once = AgentConfig::from_value(json!({})).unwrap();
        let twice =
            AgentConfig::from_value(serde_json::to_value(once.clone()).unwrap()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_validation_rejects_unknown_default_action() {
        let result = AgentConfig::from_value(json!({
            "engine": { "default_action": "vaporize" }
        }));
        assert!(matches!(result, Err(DlpError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_validation_rejects_enabled_channel_without_recipients() {
        let result = AgentConfig::from_value(json!({
            "alerts": { "channels": { "email": { "enabled": true } } }
        }));
        assert!(matches!(result, Err(DlpError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_validation_rejects_unknown_retry_kind() {
        let result = AgentConfig::from_value(json!({
            "executor": { "retryable_kinds": ["timeout", "cosmic_rays"] }
        }));
        assert!(matches!(result, Err(DlpError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_yaml_numeric_keys_normalize() {
        // A YAML mapping with numeric keys lands as string-keyed JSON.
        let yaml = "
max_concurrency: 2
alerts:
  channels:
    email:
      enabled: false
";
        let c = AgentConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(*c.max_concurrency, 2);

        let odd = normalize_yaml(serde_yaml::from_str("{80: a, true: b}").unwrap());
        assert_eq!(odd["80"], "a");
        assert_eq!(odd["true"], "b");
    }

    #[test]
    fn test_partial_override_keeps_other_defaults() {
        let c = AgentConfig::from_value(json!({
            "max_concurrency": 8,
            "capture": { "monitored_ports": [443] }
        }))
        .unwrap();
        assert_eq!(*c.max_concurrency, 8);
        assert_eq!(c.capture.monitored_ports, [443]);
        assert_eq!(*c.buffer_size, 500);
    }
}
