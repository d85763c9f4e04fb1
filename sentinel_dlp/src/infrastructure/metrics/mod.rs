// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Service
//!
//! Prometheus registry and the pipeline's metric families. Stages own
//! cheap atomic counters; this service scrapes them into gauges on demand
//! and exposes the whole registry in text format.
//!
//! ## Metric families
//!
//! - `sentinel_dlp_packets_captured_total`, `..._emitted_total`
//! - `sentinel_dlp_packets_dropped_total{reason}`
//! - `sentinel_dlp_attribution_misses_total`
//! - `sentinel_dlp_flows_active`, `..._flows_truncated_total`,
//!   `..._flows_expired_total`
//! - `sentinel_dlp_messages_parsed_total{protocol}`
//! - `sentinel_dlp_analysis_hits_total{hit_type}`
//! - `sentinel_dlp_decisions_total{action}`
//! - `sentinel_dlp_executions_total{action,outcome}`,
//!   `..._execution_retries_total{action}`
//! - `sentinel_dlp_audit_records_total`
//! - `sentinel_dlp_queue_depth`
//! - `sentinel_dlp_record_processing_seconds` (histogram)

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use sentinel_dlp_domain::error::DlpError;
use std::sync::Arc;

const NAMESPACE: &str = "sentinel_dlp";

/// Prometheus metrics for the pipeline.
#[derive(Clone)]
pub struct MetricsService {
    registry: Arc<Registry>,

    pub packets_captured_total: IntCounter,
    pub packets_emitted_total: IntCounter,
    pub packets_dropped_total: IntCounterVec,
    pub attribution_misses_total: IntCounter,
    pub flows_active: IntGauge,
    pub flows_truncated_total: IntCounter,
    pub flows_expired_total: IntCounter,
    pub messages_parsed_total: IntCounterVec,
    pub analysis_hits_total: IntCounterVec,
    pub decisions_total: IntCounterVec,
    pub executions_total: IntCounterVec,
    pub execution_retries_total: IntCounterVec,
    pub audit_records_total: IntCounter,
    pub queue_depth: IntGauge,
    pub record_processing_seconds: Histogram,
}

macro_rules! register {
    ($registry:expr, $metric:expr, $name:expr) => {
        $registry
            .register(Box::new($metric.clone()))
            .map_err(|e| DlpError::metrics_error(format!("register {}: {}", $name, e)))?;
    };
}

impl MetricsService {
    pub fn new() -> Result<Self, DlpError> {
        let registry = Registry::new();

        let packets_captured_total = IntCounter::with_opts(
            Opts::new("packets_captured_total", "Frames read from the capture backend")
                .namespace(NAMESPACE),
        )
        .map_err(|e| DlpError::metrics_error(format!("create packets_captured_total: {}", e)))?;

        let packets_emitted_total = IntCounter::with_opts(
            Opts::new("packets_emitted_total", "Packets emitted into the pipeline")
                .namespace(NAMESPACE),
        )
        .map_err(|e| DlpError::metrics_error(format!("create packets_emitted_total: {}", e)))?;

        let packets_dropped_total = IntCounterVec::new(
            Opts::new("packets_dropped_total", "Packets dropped before the pipeline")
                .namespace(NAMESPACE),
            &["reason"],
        )
        .map_err(|e| DlpError::metrics_error(format!("create packets_dropped_total: {}", e)))?;

        let attribution_misses_total = IntCounter::with_opts(
            Opts::new("attribution_misses_total", "Packets with no resolved process")
                .namespace(NAMESPACE),
        )
        .map_err(|e| DlpError::metrics_error(format!("create attribution_misses_total: {}", e)))?;

        let flows_active = IntGauge::with_opts(
            Opts::new("flows_active", "Flows currently tracked by the reassembler")
                .namespace(NAMESPACE),
        )
        .map_err(|e| DlpError::metrics_error(format!("create flows_active: {}", e)))?;

        let flows_truncated_total = IntCounter::with_opts(
            Opts::new("flows_truncated_total", "Flows that hit their buffer cap")
                .namespace(NAMESPACE),
        )
        .map_err(|e| DlpError::metrics_error(format!("create flows_truncated_total: {}", e)))?;

        let flows_expired_total = IntCounter::with_opts(
            Opts::new("flows_expired_total", "Flows closed by TTL expiry").namespace(NAMESPACE),
        )
        .map_err(|e| DlpError::metrics_error(format!("create flows_expired_total: {}", e)))?;

        let messages_parsed_total = IntCounterVec::new(
            Opts::new("messages_parsed_total", "Parsed messages by protocol").namespace(NAMESPACE),
            &["protocol"],
        )
        .map_err(|e| DlpError::metrics_error(format!("create messages_parsed_total: {}", e)))?;

        let analysis_hits_total = IntCounterVec::new(
            Opts::new("analysis_hits_total", "Sensitive hits by type").namespace(NAMESPACE),
            &["hit_type"],
        )
        .map_err(|e| DlpError::metrics_error(format!("create analysis_hits_total: {}", e)))?;

        let decisions_total = IntCounterVec::new(
            Opts::new("decisions_total", "Policy decisions by action").namespace(NAMESPACE),
            &["action"],
        )
        .map_err(|e| DlpError::metrics_error(format!("create decisions_total: {}", e)))?;

        let executions_total = IntCounterVec::new(
            Opts::new("executions_total", "Action executions by outcome").namespace(NAMESPACE),
            &["action", "outcome"],
        )
        .map_err(|e| DlpError::metrics_error(format!("create executions_total: {}", e)))?;

        let execution_retries_total = IntCounterVec::new(
            Opts::new("execution_retries_total", "Executor retries by action").namespace(NAMESPACE),
            &["action"],
        )
        .map_err(|e| DlpError::metrics_error(format!("create execution_retries_total: {}", e)))?;

        let audit_records_total = IntCounter::with_opts(
            Opts::new("audit_records_total", "Audit records written").namespace(NAMESPACE),
        )
        .map_err(|e| DlpError::metrics_error(format!("create audit_records_total: {}", e)))?;

        let queue_depth = IntGauge::with_opts(
            Opts::new("queue_depth", "Records waiting in the orchestrator queue")
                .namespace(NAMESPACE),
        )
        .map_err(|e| DlpError::metrics_error(format!("create queue_depth: {}", e)))?;

        let record_processing_seconds = Histogram::with_opts(
            HistogramOpts::new("record_processing_seconds", "Per-record pipeline latency")
                .namespace(NAMESPACE)
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )
        .map_err(|e| DlpError::metrics_error(format!("create record_processing_seconds: {}", e)))?;

        register!(registry, packets_captured_total, "packets_captured_total");
        register!(registry, packets_emitted_total, "packets_emitted_total");
        register!(registry, packets_dropped_total, "packets_dropped_total");
        register!(registry, attribution_misses_total, "attribution_misses_total");
        register!(registry, flows_active, "flows_active");
        register!(registry, flows_truncated_total, "flows_truncated_total");
        register!(registry, flows_expired_total, "flows_expired_total");
        register!(registry, messages_parsed_total, "messages_parsed_total");
        register!(registry, analysis_hits_total, "analysis_hits_total");
        register!(registry, decisions_total, "decisions_total");
        register!(registry, executions_total, "executions_total");
        register!(registry, execution_retries_total, "execution_retries_total");
        register!(registry, audit_records_total, "audit_records_total");
        register!(registry, queue_depth, "queue_depth");
        register!(registry, record_processing_seconds, "record_processing_seconds");

        Ok(Self {
            registry: Arc::new(registry),
            packets_captured_total,
            packets_emitted_total,
            packets_dropped_total,
            attribution_misses_total,
            flows_active,
            flows_truncated_total,
            flows_expired_total,
            messages_parsed_total,
            analysis_hits_total,
            decisions_total,
            executions_total,
            execution_retries_total,
            audit_records_total,
            queue_depth,
            record_processing_seconds,
        })
    }

    /// Renders the registry in Prometheus text format.
    pub fn gather(&self) -> Result<String, DlpError> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buffer)
            .map_err(|e| DlpError::metrics_error(format!("encode metrics: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| DlpError::metrics_error(format!("metrics not utf-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_gathers_all_families() {
        let metrics = MetricsService::new().unwrap();
        metrics.packets_captured_total.inc();
        metrics
            .packets_dropped_total
            .with_label_values(&["private_range"])
            .inc();
        metrics.decisions_total.with_label_values(&["block"]).inc();
        metrics
            .executions_total
            .with_label_values(&["block", "success"])
            .inc();
        metrics.record_processing_seconds.observe(0.002);

        let text = metrics.gather().unwrap();
        assert!(text.contains("sentinel_dlp_packets_captured_total 1"));
        assert!(text.contains("reason=\"private_range\""));
        assert!(text.contains("sentinel_dlp_decisions_total{action=\"block\"} 1"));
        assert!(text.contains("sentinel_dlp_record_processing_seconds_bucket"));
    }

    #[test]
    fn test_independent_registries() {
        let a = MetricsService::new().unwrap();
        let b = MetricsService::new().unwrap();
        a.packets_captured_total.inc();
        assert!(b.gather().unwrap().contains("sentinel_dlp_packets_captured_total 0"));
    }
}
