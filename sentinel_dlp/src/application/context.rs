// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Agent Context
//!
//! The composition root. Built once at Start from the validated
//! configuration; owns every process-wide singleton and hands them to the
//! orchestrator. Nothing here is global - a second context is a second,
//! fully independent agent (which is what the tests do).

use crate::infrastructure::analysis::ml::SimpleModel;
use crate::infrastructure::analysis::text_analyzer::TextAnalyzer;
use crate::infrastructure::analysis::AnalyzerRegistry;
use crate::infrastructure::attribution::{AttributionService, AttributionSettings};
use crate::infrastructure::audit::JsonlAuditSink;
use crate::infrastructure::capture::{
    create_backend, CaptureBackend, CaptureSettings, TrafficInterceptor,
};
use crate::infrastructure::config::AgentConfig;
use crate::infrastructure::execution::executors::{
    AllowExecutor, AlertExecutor, AuditExecutor, BlockExecutor, EncryptExecutor,
    QuarantineExecutor, RedirectExecutor,
};
use crate::infrastructure::execution::firewall::{
    spawn_firewall_worker, FirewallHandle, InProcessApplier,
};
use crate::infrastructure::execution::notification::{LogChannel, NotificationService};
use crate::infrastructure::execution::ExecutionManager;
use crate::infrastructure::metrics::MetricsService;
use crate::infrastructure::parsers::ParserRegistry;
use crate::infrastructure::policy::PolicyEngine;
use crate::infrastructure::reassembly::SessionReassembler;
use sentinel_dlp_bootstrap::shutdown::CancellationToken;
use sentinel_dlp_domain::error::DlpError;
use sentinel_dlp_domain::services::notification::NotificationChannel;
use std::sync::Arc;
use tracing::info;

/// Everything the pipeline needs, wired once.
pub struct AgentContext {
    pub config: AgentConfig,
    pub metrics: MetricsService,
    pub interceptor: Arc<TrafficInterceptor>,
    pub attribution: Arc<AttributionService>,
    pub reassembler: Arc<SessionReassembler>,
    pub parsers: Arc<ParserRegistry>,
    pub analyzers: Arc<AnalyzerRegistry>,
    pub policy: Arc<PolicyEngine>,
    pub execution: Arc<ExecutionManager>,
    pub audit: Arc<JsonlAuditSink>,
    pub notifications: NotificationService,
    pub firewall: FirewallHandle,
}

impl AgentContext {
    /// Builds the context with the native capture backend.
    pub async fn build(config: AgentConfig, token: CancellationToken) -> Result<Self, DlpError> {
        Self::build_with_backend(config, create_backend(), token).await
    }

    /// Builds the context with an injected capture backend (tests use the
    /// replay backend here).
    pub async fn build_with_backend(
        config: AgentConfig,
        backend: Box<dyn CaptureBackend>,
        token: CancellationToken,
    ) -> Result<Self, DlpError> {
        config.validate()?;
        let metrics = MetricsService::new()?;

        // Inability to bind the audit sink is fatal by contract.
        let audit = Arc::new(JsonlAuditSink::open(&config.audit.log_path).await?);

        let interceptor = Arc::new(TrafficInterceptor::new(
            backend,
            CaptureSettings {
                monitored_ports: config.capture.monitored_ports.clone(),
                channel_capacity: *config.buffer_size,
            },
        ));

        let attribution = Arc::new(AttributionService::with_os_providers(AttributionSettings {
            refresh_interval: config.attribution.refresh_interval(),
            process_ttl: config.attribution.process_ttl(),
        }));

        let parsers = Arc::new(ParserRegistry::with_default_parsers(&config.parser));
        let reassembler = Arc::new(SessionReassembler::new(
            config.reassembly.clone(),
            Arc::clone(&parsers),
        ));

        let mut analyzers = AnalyzerRegistry::with_text_analyzer(TextAnalyzer::with_default_rules(
            config.analysis.clone(),
        ));
        if config.ml.enabled {
            analyzers.set_predictor(Arc::new(SimpleModel::new(&config.ml.simple_model)));
        }
        let analyzers = Arc::new(analyzers);

        let mut policy = PolicyEngine::new(config.engine.clone())?;
        if config.engine.enable_ml_engine && config.ml.enabled {
            policy.set_predictor(Arc::new(SimpleModel::new(&config.ml.simple_model)));
        }
        let policy = Arc::new(policy);

        // Notification channels: the log channel is always present; enabled
        // transport channels register through the same port.
        let channels: Vec<Arc<dyn NotificationChannel>> = vec![Arc::new(LogChannel)];
        let notifications = NotificationService::spawn(
            channels,
            config.alerts.queue_capacity,
            token.clone(),
        );

        let firewall = spawn_firewall_worker(Arc::new(InProcessApplier), token.clone());

        let mut execution = ExecutionManager::new(&config.executor, notifications.clone());
        execution.register(Arc::new(AllowExecutor));
        execution.register(Arc::new(AlertExecutor));
        execution.register(Arc::new(AuditExecutor::new(
            Arc::clone(&audit) as Arc<dyn sentinel_dlp_domain::services::audit_sink::AuditSink>
        )));
        execution.register(Arc::new(BlockExecutor::new(firewall.clone())));
        execution.register(Arc::new(RedirectExecutor::new(firewall.clone())));
        execution.register(Arc::new(EncryptExecutor::new(
            config.encryption.key_store_dir.clone(),
        )));
        execution.register(Arc::new(QuarantineExecutor::new(
            config.quarantine.directory.clone(),
        )));
        let execution = Arc::new(execution);

        info!(
            parsers = ?parsers.parser_names(),
            analyzers = ?analyzers.analyzer_names(),
            executors = ?execution.registered_kinds(),
            "agent context wired"
        );

        Ok(Self {
            config,
            metrics,
            interceptor,
            attribution,
            reassembler,
            parsers,
            analyzers,
            policy,
            execution,
            audit,
            notifications,
            firewall,
        })
    }
}
