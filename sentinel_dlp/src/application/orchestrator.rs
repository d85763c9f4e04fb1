// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Orchestrator
//!
//! Owns the bounded queue between the interceptor and the worker pool and
//! drives each record through reassembly → parsing → analysis → policy →
//! execution → audit. Stages never call each other; they only see the
//! record a worker hands them.
//!
//! ## Lifecycle
//!
//! `start` brings up the policy engine, attribution, the interceptor, the
//! ingest task, the worker pool, and the flow sweeper - in that order.
//! `stop` tears down in reverse: capture stops first, ingest closes the
//! queue, workers drain within the grace period (default 30s, warning when
//! exceeded), then tickers and the engine stop. In-flight records see
//! cancellation only after the grace period expires, so a drained record is
//! either executed fully or not at all.
//!
//! ## Fault isolation
//!
//! Each record runs inside a `catch_unwind` boundary: a poisoned record
//! logs, increments a counter, and never takes a worker down.

use crate::application::context::AgentContext;
use crate::infrastructure::execution::executors::AuditExecutor;
use futures::FutureExt;
use futures::StreamExt;
use sentinel_dlp_bootstrap::shutdown::CancellationToken;
use sentinel_dlp_domain::entities::decision::DecisionContext;
use sentinel_dlp_domain::entities::packet_record::PacketRecord;
use sentinel_dlp_domain::entities::policy_rule::ActionKind;
use sentinel_dlp_domain::error::DlpError;
use sentinel_dlp_domain::services::audit_sink::AuditSink;
use sentinel_dlp_domain::services::packet_source::{ComponentHealth, PacketSource};
use sentinel_dlp_domain::services::process_resolver::ProcessResolver;
use sentinel_dlp_domain::services::protocol_parser::ParseUnit;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Interval of the flow TTL sweeper.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Last-seen stage counters, so monotonic atomics can be mirrored into
/// Prometheus counters as deltas.
#[derive(Default)]
struct CounterScrape {
    captured: u64,
    emitted: u64,
    dropped: [(u64, &'static str); 5],
    truncated: u64,
}

impl CounterScrape {
    fn sync(&mut self, context: &Arc<AgentContext>) {
        use crate::infrastructure::capture::prefilter::DropReason;

        let counters = context.interceptor.counters();
        let metrics = &context.metrics;

        let captured = counters.captured.load(Ordering::Relaxed);
        metrics
            .packets_captured_total
            .inc_by(captured.saturating_sub(self.captured));
        self.captured = captured;

        let emitted = counters.emitted.load(Ordering::Relaxed);
        metrics
            .packets_emitted_total
            .inc_by(emitted.saturating_sub(self.emitted));
        self.emitted = emitted;

        let reasons = [
            DropReason::Loopback,
            DropReason::PrivateRange,
            DropReason::LinkLocal,
            DropReason::Multicast,
            DropReason::Broadcast,
        ];
        for (slot, reason) in self.dropped.iter_mut().zip(reasons) {
            let value = counters.prefilter_drops(reason);
            metrics
                .packets_dropped_total
                .with_label_values(&[reason.as_str()])
                .inc_by(value.saturating_sub(slot.0));
            *slot = (value, reason.as_str());
        }

        let truncated = context
            .reassembler
            .counters()
            .flows_truncated
            .load(Ordering::Relaxed);
        metrics
            .flows_truncated_total
            .inc_by(truncated.saturating_sub(self.truncated));
        self.truncated = truncated;
    }
}

/// The pipeline orchestrator singleton.
pub struct PipelineOrchestrator {
    context: Arc<AgentContext>,
    /// Stops ingest and tickers at the start of shutdown.
    ingest_token: CancellationToken,
    /// Cancels in-flight records only after the drain grace expires.
    record_token: CancellationToken,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    panics: Arc<AtomicU64>,
}

impl PipelineOrchestrator {
    pub fn new(context: Arc<AgentContext>) -> Self {
        Self {
            context,
            ingest_token: CancellationToken::new(),
            record_token: CancellationToken::new(),
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            panics: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records that hit the panic boundary.
    pub fn panic_count(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }

    /// Brings the pipeline up in dependency order.
    pub async fn start(&self) -> Result<(), DlpError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(DlpError::internal_error("orchestrator already started"));
        }
        let ctx = &self.context;

        ctx.policy.start(ctx.config.rules.clone())?;
        ctx.attribution.start(self.ingest_token.clone());
        ctx.interceptor.start().await?;

        let stream = ctx
            .interceptor
            .take_packet_stream()
            .ok_or_else(|| DlpError::internal_error("packet stream already taken"))?;

        let (queue_tx, queue_rx) =
            mpsc::channel::<PacketRecord>(ctx.config.engine.queue_capacity.max(1));
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let mut tasks = self.tasks.lock().await;

        // Ingest: capture stream → attribution → bounded queue.
        {
            let context = Arc::clone(&self.context);
            let token = self.ingest_token.clone();
            let mut stream = stream;
            tasks.push(tokio::spawn(async move {
                enum Step {
                    Got(PacketRecord),
                    Cancelled,
                    Ended,
                }
                loop {
                    let step = tokio::select! {
                        _ = token.cancelled() => Step::Cancelled,
                        record = stream.next() => match record {
                            Some(record) => Step::Got(record),
                            None => Step::Ended,
                        },
                    };
                    match step {
                        Step::Got(record) => {
                            if !Self::attribute_and_enqueue(&context, &queue_tx, record).await {
                                break;
                            }
                        }
                        Step::Cancelled => {
                            // Shutdown: packets already captured still flow
                            // to completion.
                            while let Some(Some(record)) = stream.next().now_or_never() {
                                if !Self::attribute_and_enqueue(&context, &queue_tx, record).await {
                                    break;
                                }
                            }
                            break;
                        }
                        Step::Ended => break,
                    }
                }
                debug!("ingest task stopped");
                // queue_tx drops here; workers drain and exit.
            }));
        }

        // Worker pool.
        for worker_id in 0..ctx.config.max_concurrency.max(1) {
            let context = Arc::clone(&self.context);
            let queue_rx = Arc::clone(&queue_rx);
            let token = self.record_token.clone();
            let panics = Arc::clone(&self.panics);
            tasks.push(tokio::spawn(async move {
                loop {
                    let record = { queue_rx.lock().await.recv().await };
                    let Some(record) = record else { break };
                    context.metrics.queue_depth.dec();

                    let work = Self::process_record(&context, &token, record);
                    if AssertUnwindSafe(work).catch_unwind().await.is_err() {
                        panics.fetch_add(1, Ordering::Relaxed);
                        error!(worker_id, "record processing panicked; worker continues");
                    }
                }
                debug!(worker_id, "worker stopped");
            }));
        }

        // Flow TTL sweeper + counter scrape.
        {
            let context = Arc::clone(&self.context);
            let token = self.ingest_token.clone();
            let record_token = self.record_token.clone();
            let panics = Arc::clone(&self.panics);
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                let mut scrape = CounterScrape::default();
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {
                            for (record, unit) in context.reassembler.sweep_expired() {
                                context.metrics.flows_expired_total.inc();
                                let work = Self::process_unit(&context, &record_token, &record, unit);
                                if AssertUnwindSafe(work).catch_unwind().await.is_err() {
                                    panics.fetch_add(1, Ordering::Relaxed);
                                    error!("expired-flow processing panicked");
                                }
                            }
                            scrape.sync(&context);
                        }
                    }
                }
                scrape.sync(&context);
                debug!("flow sweeper stopped");
            }));
        }

        info!(
            workers = ctx.config.max_concurrency.max(1),
            queue_capacity = ctx.config.engine.queue_capacity,
            "pipeline orchestrator started"
        );
        Ok(())
    }

    /// Tears the pipeline down in reverse order within `grace`.
    pub async fn stop(&self, grace: Duration) -> Result<(), DlpError> {
        if !self.started.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut errors = Vec::new();

        // Capture stops first so no new records arrive.
        if let Err(e) = self.context.interceptor.stop().await {
            errors.push(e);
        }
        // Ingest and tickers stop; the queue closes once ingest exits.
        self.ingest_token.cancel();

        // Drain within the grace period.
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        let drain = async {
            for task in tasks {
                let _ = task.await;
            }
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            warn!(
                grace_secs = grace.as_secs(),
                "pipeline did not drain within the shutdown grace period"
            );
            // Abandon in-flight work explicitly; executors roll back.
            self.record_token.cancel();
        }

        self.context.attribution.stop().await;
        self.context.policy.stop();
        self.started.store(false, Ordering::SeqCst);
        info!("pipeline orchestrator stopped");
        DlpError::aggregate(errors)
    }

    /// Per-component health snapshot.
    pub fn health(&self) -> Vec<(&'static str, ComponentHealth)> {
        let interceptor = self.context.interceptor.health_check();
        let orchestrator = if self.started.load(Ordering::SeqCst) {
            ComponentHealth::Healthy
        } else {
            ComponentHealth::Degraded("not started".to_string())
        };
        vec![("interceptor", interceptor), ("orchestrator", orchestrator)]
    }

    /// Attribution plus queue hand-off for one record. Returns `false` when
    /// the queue is gone.
    async fn attribute_and_enqueue(
        context: &Arc<AgentContext>,
        queue_tx: &mpsc::Sender<PacketRecord>,
        mut record: PacketRecord,
    ) -> bool {
        let identity = context.attribution.resolve(&record.flow_key()).await;
        if identity.is_none() {
            context.metrics.attribution_misses_total.inc();
        }
        record.set_process(identity);

        context.metrics.queue_depth.inc();
        queue_tx.send(record).await.is_ok()
    }

    /// One record through reassembly and, when a unit is ready, the rest of
    /// the pipeline.
    async fn process_record(
        context: &Arc<AgentContext>,
        token: &CancellationToken,
        record: PacketRecord,
    ) {
        let unit = context.reassembler.ingest(&record);
        context
            .metrics
            .flows_active
            .set(context.reassembler.active_flows() as i64);
        if let Some(unit) = unit {
            Self::process_unit(context, token, &record, unit).await;
        }
    }

    /// Parse → analyze → decide → execute → audit for one reassembled unit.
    async fn process_unit(
        context: &Arc<AgentContext>,
        token: &CancellationToken,
        record: &PacketRecord,
        unit: ParseUnit,
    ) {
        let started = Instant::now();

        let message = context.parsers.dispatch(&unit);
        context
            .metrics
            .messages_parsed_total
            .with_label_values(&[message.protocol()])
            .inc();

        let analysis = context.analyzers.analyze(&message).await;
        for hit in analysis.hits() {
            context
                .metrics
                .analysis_hits_total
                .with_label_values(&[hit.hit_type()])
                .inc();
        }

        let decision_context = DecisionContext::new(record.clone(), message, analysis);
        let decision = match context.policy.evaluate(&decision_context, token) {
            Ok(decision) => decision,
            Err(e) if e.is_cancelled() => {
                debug!(record = %record.record_id(), "evaluation cancelled, record abandoned");
                return;
            }
            Err(e) => {
                warn!(record = %record.record_id(), error = %e, "policy evaluation failed");
                return;
            }
        };
        context
            .metrics
            .decisions_total
            .with_label_values(&[decision.action().kind().as_str()])
            .inc();

        let result = context
            .execution
            .execute_decision(&decision, &decision_context, token)
            .await;
        context
            .metrics
            .executions_total
            .with_label_values(&[
                result.action().as_str(),
                if result.is_success() { "success" } else { "failure" },
            ])
            .inc();
        if result.attempts() > 1 {
            context
                .metrics
                .execution_retries_total
                .with_label_values(&[result.action().as_str()])
                .inc_by(u64::from(result.attempts() - 1));
        }

        // Audit once per record that matched any rule or whose action is not
        // Allow. The Audit executor already persisted its own record.
        let action = decision.action().kind();
        let needs_audit =
            action != ActionKind::Audit && (!decision.matched_rules().is_empty() || action != ActionKind::Allow);
        if needs_audit {
            let audit_record =
                AuditExecutor::build_record(&decision, &decision_context, result.is_success());
            match context.audit.append(&audit_record).await {
                Ok(()) => context.metrics.audit_records_total.inc(),
                Err(e) => error!(record = %record.record_id(), error = %e, "audit append failed"),
            }
        } else if action == ActionKind::Audit && result.is_success() {
            context.metrics.audit_records_total.inc();
        }

        context
            .metrics
            .record_processing_seconds
            .observe(started.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::capture::replay::ReplayBackend;
    use crate::infrastructure::config::AgentConfig;
    use etherparse::PacketBuilder;
    use sentinel_dlp_domain::services::audit_sink::AuditQuery;

    fn tls_client_hello_frame() -> Vec<u8> {
        // ClientHello for example.com, IP framing.
        let payload = crate::infrastructure::parsers::tls::tests_support::client_hello("example.com");
        let builder =
            PacketBuilder::ipv4([192, 168, 1, 100], [8, 8, 8, 8], 64).tcp(54321, 443, 1, 64240);
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, &payload).unwrap();
        frame
    }

    async fn run_pipeline(
        frames: Vec<Vec<u8>>,
    ) -> (tempfile::TempDir, Arc<AgentContext>, PipelineOrchestrator) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AgentConfig::default();
        config.audit.log_path = dir.path().join("audit.jsonl");
        config.quarantine.directory = dir.path().join("quarantine");
        config.encryption.key_store_dir = dir.path().join("keys");

        let context = Arc::new(
            AgentContext::build_with_backend(
                config,
                Box::new(ReplayBackend::new(frames)),
                CancellationToken::new(),
            )
            .await
            .unwrap(),
        );
        let orchestrator = PipelineOrchestrator::new(Arc::clone(&context));
        orchestrator.start().await.unwrap();
        (dir, context, orchestrator)
    }

    #[tokio::test]
    async fn test_tls_packet_flows_to_audit() {
        let (_dir, context, orchestrator) = run_pipeline(vec![tls_client_hello_frame()]).await;

        // Give the pipeline a moment to drain the replay.
        tokio::time::sleep(Duration::from_millis(300)).await;
        orchestrator.stop(Duration::from_secs(5)).await.unwrap();

        let records = context.audit.query(&AuditQuery::default()).await.unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.action, "audit");
        assert_eq!(record.dest_domain, "example.com");
        assert_eq!(record.dest_port, 443);
        assert_eq!(record.risk_level, "low");
        assert!((record.risk_score - 0.1).abs() < 1e-9);
        assert_eq!(record.process_info.name, "unknown");
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_clean() {
        let (_dir, _context, orchestrator) = run_pipeline(vec![]).await;
        orchestrator.stop(Duration::from_secs(5)).await.unwrap();
        orchestrator.stop(Duration::from_secs(5)).await.unwrap();
        assert_eq!(orchestrator.panic_count(), 0);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let (_dir, _context, orchestrator) = run_pipeline(vec![]).await;
        assert!(orchestrator.start().await.is_err());
        orchestrator.stop(Duration::from_secs(5)).await.unwrap();
    }
}
