// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Execution Manager
//!
//! Dispatches policy decisions to typed executors under the retry policy,
//! records per-action metrics, and fires notifications.
//!
//! ## Contract
//!
//! 1. A decision whose action has no registered executor is a fatal error
//!    for that record (terminal failure result, never a panic).
//! 2. Each attempt runs under the per-attempt timeout; timeouts surface as
//!    retryable executor errors of kind "timeout".
//! 3. Only error kinds in the configured retryable set retry (default 3
//!    attempts, exponential backoff 1s..30s).
//! 4. Block, Alert, Quarantine, and Encrypt actions - and every failed
//!    execution - fire a notification asynchronously; the notification
//!    queue never blocks the action path.
//! 5. Cancellation aborts between attempts and surfaces as a cancellation
//!    error; executors guarantee no partial side effects.

pub mod executors;
pub mod firewall;
pub mod notification;
pub mod retry;

use self::notification::NotificationService;
use self::retry::RetryPolicy;
use crate::infrastructure::config::ExecutorConfig;
use parking_lot::RwLock;
use sentinel_dlp_bootstrap::shutdown::CancellationToken;
use sentinel_dlp_domain::entities::decision::{DecisionContext, PolicyDecision};
use sentinel_dlp_domain::entities::execution_result::ExecutionResult;
use sentinel_dlp_domain::entities::policy_rule::ActionKind;
use sentinel_dlp_domain::error::{DlpError, RetryKind};
use sentinel_dlp_domain::services::action_executor::ActionExecutor;
use sentinel_dlp_domain::services::notification::Notification;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Per-action execution metrics.
#[derive(Debug, Clone, Default)]
pub struct ActionMetrics {
    pub count: u64,
    pub success: u64,
    pub failure: u64,
    pub retries: u64,
    pub total_duration: Duration,
    pub last_error: Option<String>,
}

impl ActionMetrics {
    pub fn avg_duration(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.count as u32
        }
    }
}

/// The execution manager singleton.
pub struct ExecutionManager {
    executors: HashMap<ActionKind, Arc<dyn ActionExecutor>>,
    retry: RetryPolicy,
    attempt_timeout: Duration,
    metrics: RwLock<HashMap<ActionKind, ActionMetrics>>,
    notifications: NotificationService,
}

impl ExecutionManager {
    pub fn new(config: &ExecutorConfig, notifications: NotificationService) -> Self {
        Self {
            executors: HashMap::new(),
            retry: RetryPolicy::from_config(config),
            attempt_timeout: Duration::from_secs(config.timeout_secs.max(1)),
            metrics: RwLock::new(HashMap::new()),
            notifications,
        }
    }

    /// Registers an executor for its action kind.
    pub fn register(&mut self, executor: Arc<dyn ActionExecutor>) {
        self.executors.insert(executor.kind(), executor);
    }

    pub fn registered_kinds(&self) -> Vec<ActionKind> {
        let mut kinds: Vec<ActionKind> = self.executors.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Metrics snapshot for one action.
    pub fn metrics_for(&self, kind: ActionKind) -> ActionMetrics {
        self.metrics.read().get(&kind).cloned().unwrap_or_default()
    }

    fn record_outcome(&self, kind: ActionKind, result: &ExecutionResult) {
        let mut metrics = self.metrics.write();
        let entry = metrics.entry(kind).or_default();
        entry.count += 1;
        entry.retries += u64::from(result.attempts().saturating_sub(1));
        entry.total_duration += result.elapsed();
        if result.is_success() {
            entry.success += 1;
        } else {
            entry.failure += 1;
            entry.last_error = result.error().map(str::to_string);
        }
    }

    fn should_notify(kind: ActionKind, success: bool) -> bool {
        !success
            || matches!(
                kind,
                ActionKind::Block | ActionKind::Alert | ActionKind::Quarantine | ActionKind::Encrypt
            )
    }

    fn fire_notification(
        &self,
        decision: &PolicyDecision,
        context: &DecisionContext,
        result: &ExecutionResult,
    ) {
        let domain = executors::best_effort_domain(context);
        let title = if result.is_success() {
            format!("DLP action {}", result.action())
        } else {
            format!("DLP action {} failed", result.action())
        };
        let body = format!(
            "{} -> {} ({}): {}",
            context.packet().source(),
            context.packet().destination(),
            if domain.is_empty() { "unresolved" } else { &domain },
            decision.reason()
        );
        let mut notification = Notification::new(title, body, decision.risk_level())
            .with_metadata("decision_id", decision.decision_id().to_string())
            .with_metadata("action", result.action().to_string())
            .with_metadata("result", if result.is_success() { "success" } else { "failure" });
        if let Some(error) = result.error() {
            notification = notification.with_metadata("error", error);
        }
        self.notifications.notify(notification);
    }

    /// Executes one decision to completion.
    pub async fn execute_decision(
        &self,
        decision: &PolicyDecision,
        context: &DecisionContext,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let kind = decision.action().kind();
        let started = Instant::now();

        let Some(executor) = self.executors.get(&kind) else {
            let error = DlpError::executor_terminal(format!("no executor registered for {}", kind));
            warn!(action = %kind, "decision cannot be executed");
            let result = ExecutionResult::failure(kind, &error, 0, started.elapsed());
            self.record_outcome(kind, &result);
            self.fire_notification(decision, context, &result);
            return result;
        };

        let mut attempt: u32 = 0;
        let result = loop {
            attempt += 1;

            if cancel.is_cancelled() {
                let error = DlpError::cancelled("execution cancelled before attempt");
                break ExecutionResult::failure(kind, &error, attempt - 1, started.elapsed());
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    Err(DlpError::cancelled("execution cancelled mid-attempt"))
                }
                attempt_result = tokio::time::timeout(
                    self.attempt_timeout,
                    executor.execute(decision, context),
                ) => match attempt_result {
                    Ok(result) => result,
                    Err(_) => Err(DlpError::executor_retryable(
                        RetryKind::Timeout,
                        format!("attempt exceeded {}s", self.attempt_timeout.as_secs()),
                    )),
                },
            };

            match outcome {
                Ok(affected) => {
                    break ExecutionResult::success(kind, affected, attempt, started.elapsed());
                }
                Err(error) => {
                    let retry_allowed = attempt < self.retry.max_attempts()
                        && self.retry.is_retryable(&error)
                        && !error.is_cancelled();
                    if !retry_allowed {
                        break ExecutionResult::failure(kind, &error, attempt, started.elapsed());
                    }
                    let backoff = self.retry.backoff_before(attempt + 1);
                    debug!(action = %kind, attempt, backoff_ms = backoff.as_millis() as u64,
                           error = %error, "retrying executor");
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            let error = DlpError::cancelled("execution cancelled during backoff");
                            break ExecutionResult::failure(kind, &error, attempt, started.elapsed());
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        };

        self.record_outcome(kind, &result);
        if Self::should_notify(kind, result.is_success()) {
            self.fire_notification(decision, context, &result);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sentinel_dlp_domain::entities::analysis_result::AnalysisResult;
    use sentinel_dlp_domain::entities::execution_result::AffectedData;
    use sentinel_dlp_domain::entities::packet_record::{Direction, PacketRecord, TransportProtocol};
    use sentinel_dlp_domain::entities::parsed_message::ParsedMessage;
    use sentinel_dlp_domain::entities::policy_rule::PolicyAction;
    use sentinel_dlp_domain::value_objects::risk::RiskScore;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn context() -> DecisionContext {
        let packet = PacketRecord::new(
            Direction::Outbound,
            TransportProtocol::Tcp,
            "192.168.1.100:50000".parse().unwrap(),
            "8.8.8.8:443".parse().unwrap(),
            vec![],
        );
        DecisionContext::new(packet, ParsedMessage::new("http"), AnalysisResult::empty())
    }

    fn decision(kind: ActionKind) -> PolicyDecision {
        PolicyDecision::new(
            PolicyAction::of_kind(kind),
            vec![],
            1.0,
            RiskScore::ZERO,
            "test",
            Duration::ZERO,
        )
    }

    fn manager() -> ExecutionManager {
        let notifications = NotificationService::spawn(
            vec![Arc::new(notification::LogChannel)],
            16,
            CancellationToken::new(),
        );
        let config = ExecutorConfig {
            retry_interval_secs: 1,
            ..ExecutorConfig::default()
        };
        ExecutionManager::new(&config, notifications)
    }

    struct FlakyExecutor {
        fail_times: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ActionExecutor for FlakyExecutor {
        fn kind(&self) -> ActionKind {
            ActionKind::Block
        }

        async fn execute(
            &self,
            _: &PolicyDecision,
            _: &DecisionContext,
        ) -> Result<AffectedData, DlpError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                Err(DlpError::executor_retryable(RetryKind::Timeout, "transient"))
            } else {
                Ok(AffectedData::None)
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_error_retries_then_succeeds() {
        let mut manager = manager();
        manager.register(Arc::new(FlakyExecutor {
            fail_times: 1,
            calls: AtomicU32::new(0),
        }));

        let result = manager
            .execute_decision(&decision(ActionKind::Block), &context(), &CancellationToken::new())
            .await;
        assert!(result.is_success());
        assert_eq!(result.attempts(), 2);
        let metrics = manager.metrics_for(ActionKind::Block);
        assert_eq!(metrics.retries, 1);
        assert_eq!(metrics.success, 1);
    }

    struct TerminalExecutor;

    #[async_trait]
    impl ActionExecutor for TerminalExecutor {
        fn kind(&self) -> ActionKind {
            ActionKind::Quarantine
        }
        async fn execute(
            &self,
            _: &PolicyDecision,
            _: &DecisionContext,
        ) -> Result<AffectedData, DlpError> {
            Err(DlpError::executor_terminal("no file"))
        }
    }

    #[tokio::test]
    async fn test_terminal_error_does_not_retry() {
        let mut manager = manager();
        manager.register(Arc::new(TerminalExecutor));

        let result = manager
            .execute_decision(
                &decision(ActionKind::Quarantine),
                &context(),
                &CancellationToken::new(),
            )
            .await;
        assert!(!result.is_success());
        assert_eq!(result.attempts(), 1);
        assert!(manager.metrics_for(ActionKind::Quarantine).last_error.is_some());
    }

    #[tokio::test]
    async fn test_missing_executor_is_terminal_for_record() {
        let manager = manager();
        let result = manager
            .execute_decision(&decision(ActionKind::Redirect), &context(), &CancellationToken::new())
            .await;
        assert!(!result.is_success());
        assert!(result.error().unwrap().contains("no executor"));
    }

    #[tokio::test]
    async fn test_cancelled_execution_surfaces_cancellation() {
        let mut manager = manager();
        manager.register(Arc::new(FlakyExecutor {
            fail_times: u32::MAX,
            calls: AtomicU32::new(0),
        }));
        let token = CancellationToken::new();
        token.cancel();
        let result = manager
            .execute_decision(&decision(ActionKind::Block), &context(), &token)
            .await;
        assert!(!result.is_success());
        assert!(result.error().unwrap().contains("cancel"));
    }

    #[tokio::test]
    async fn test_allow_records_metrics() {
        let mut manager = manager();
        manager.register(Arc::new(executors::AllowExecutor));
        let result = manager
            .execute_decision(&decision(ActionKind::Allow), &context(), &CancellationToken::new())
            .await;
        assert!(result.is_success());
        assert_eq!(manager.metrics_for(ActionKind::Allow).count, 1);
    }
}
