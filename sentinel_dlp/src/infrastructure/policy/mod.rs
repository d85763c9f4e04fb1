// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Policy Engine
//!
//! Deterministic rule evaluation over decision contexts.
//!
//! ## Evaluation contract
//!
//! 1. Enabled rules are visited in priority-descending order (lexical id
//!    tie-break).
//! 2. A rule matches only when all conditions match; condition errors are
//!    non-matches.
//! 3. The first match with priority ≥ 90 AND confidence ≥ 0.9
//!    short-circuits and decides the action. Otherwise the
//!    highest-priority match's first action decides; no match falls back
//!    to the configured default action (factory default Audit).
//! 4. The risk-override reducer runs last: Critical analysis risk forces
//!    Block, High forces at least Alert.
//! 5. An optional ML predictor may raise - never lower - the decision's
//!    risk score.
//!
//! Cancellation mid-evaluation returns an explicit `Cancelled` error;
//! partial decisions are never emitted.

pub mod evaluator;
pub mod rule_store;

use self::evaluator::RuleEvaluator;
use self::rule_store::RuleStore;
use crate::infrastructure::config::EngineConfig;
use sentinel_dlp_bootstrap::shutdown::CancellationToken;
use sentinel_dlp_domain::entities::decision::{DecisionContext, PolicyDecision};
use sentinel_dlp_domain::entities::policy_rule::{ActionKind, PolicyAction, PolicyRule};
use sentinel_dlp_domain::error::DlpError;
use sentinel_dlp_domain::services::content_analyzer::RiskPredictor;
use sentinel_dlp_domain::value_objects::risk::RiskLevel;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

const SHORT_CIRCUIT_PRIORITY: u8 = 90;
const SHORT_CIRCUIT_CONFIDENCE: f64 = 0.9;

/// The policy engine singleton.
pub struct PolicyEngine {
    store: RuleStore,
    evaluator: RuleEvaluator,
    config: EngineConfig,
    default_action: ActionKind,
    predictor: Option<Arc<dyn RiskPredictor>>,
    started: AtomicBool,
}

impl PolicyEngine {
    pub fn new(config: EngineConfig) -> Result<Self, DlpError> {
        let default_action = ActionKind::parse_str(&config.default_action).ok_or_else(|| {
            DlpError::invalid_config(format!(
                "unknown default action '{}'",
                config.default_action
            ))
        })?;
        Ok(Self {
            store: RuleStore::new(config.max_rules),
            evaluator: RuleEvaluator::new(),
            config,
            default_action,
            predictor: None,
            started: AtomicBool::new(false),
        })
    }

    /// Attaches the raise-only ML risk predictor.
    pub fn set_predictor(&mut self, predictor: Arc<dyn RiskPredictor>) {
        self.predictor = Some(predictor);
    }

    /// Rule CRUD surface.
    pub fn rules(&self) -> &RuleStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Starts the engine. May only be started once per lifecycle.
    pub fn start(&self, initial_rules: Vec<PolicyRule>) -> Result<(), DlpError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(DlpError::internal_error("policy engine already started"));
        }
        for rule in initial_rules {
            self.store.add(rule)?;
        }
        info!(rules = self.store.len(), default_action = %self.default_action,
              "policy engine started");
        Ok(())
    }

    pub fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
        info!("policy engine stopped");
    }

    fn ensure_started(&self) -> Result<(), DlpError> {
        if self.started.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DlpError::internal_error("policy engine not started"))
        }
    }

    /// Evaluates one context into a decision.
    pub fn evaluate(
        &self,
        context: &DecisionContext,
        cancel: &CancellationToken,
    ) -> Result<PolicyDecision, DlpError> {
        self.ensure_started()?;
        let started = Instant::now();
        let deadline = started + self.config.evaluation_timeout();

        let snapshot = context.to_snapshot();
        let rules = self.store.evaluation_ordered();

        let mut matched: Vec<&PolicyRule> = Vec::new();
        let mut short_circuit: Option<&PolicyRule> = None;

        for rule in rules.iter().filter(|r| r.enabled) {
            // Cancellation and deadline are honored between rules so a
            // partial decision can never escape.
            if cancel.is_cancelled() {
                return Err(DlpError::cancelled("policy evaluation cancelled"));
            }
            if Instant::now() >= deadline {
                return Err(DlpError::cancelled(format!(
                    "policy evaluation exceeded {}ms deadline",
                    self.config.timeout_ms
                )));
            }

            if !self.evaluator.matches_rule(&snapshot, rule) {
                continue;
            }
            debug!(rule = %rule.id, priority = rule.priority, "rule matched");
            matched.push(rule);

            if rule.priority >= SHORT_CIRCUIT_PRIORITY && rule.confidence >= SHORT_CIRCUIT_CONFIDENCE
            {
                short_circuit = Some(rule);
                break;
            }
        }

        let analysis_score = context.analysis().risk_score();
        let (action, reason, confidence) = if let Some(rule) = short_circuit {
            (
                rule.first_action()
                    .cloned()
                    .unwrap_or_else(|| PolicyAction::of_kind(ActionKind::Audit)),
                format!("rule '{}' short-circuited evaluation", rule.id),
                rule.confidence,
            )
        } else if let Some(winner) = matched.first() {
            let ids: Vec<&str> = matched.iter().map(|r| r.id.as_str()).collect();
            let avg =
                matched.iter().map(|r| r.confidence).sum::<f64>() / matched.len() as f64;
            (
                winner
                    .first_action()
                    .cloned()
                    .unwrap_or_else(|| PolicyAction::of_kind(ActionKind::Audit)),
                format!("matched rules: {}", ids.join(", ")),
                avg,
            )
        } else {
            (
                PolicyAction::of_kind(self.default_action),
                format!("no rule matched; default action {}", self.default_action),
                1.0,
            )
        };

        let mut decision = PolicyDecision::new(
            action,
            matched.iter().map(|r| r.id.clone()).collect(),
            confidence,
            analysis_score,
            reason,
            started.elapsed(),
        );

        // Raise-only ML adjustment.
        if let Some(predictor) = &self.predictor {
            if let Ok(ml_score) = predictor.predict(&snapshot.to_string()) {
                decision.raise_risk(ml_score);
            }
        }

        self.apply_risk_override(&mut decision, context.analysis().risk_level());
        Ok(decision)
    }

    /// The final reducer: Critical forces Block; High forces at least Alert.
    fn apply_risk_override(&self, decision: &mut PolicyDecision, analysis_level: RiskLevel) {
        let effective = decision.risk_level().max(analysis_level);
        match PolicyDecision::risk_floor_action(effective) {
            Some(ActionKind::Block) => {
                if decision.action().kind() != ActionKind::Block {
                    decision.override_action(
                        PolicyAction::of_kind(ActionKind::Block),
                        "critical risk forces block",
                    );
                }
            }
            Some(ActionKind::Alert) => {
                // "At least Alert": only the weaker dispositions escalate.
                if matches!(decision.action().kind(), ActionKind::Allow | ActionKind::Audit) {
                    decision.override_action(
                        PolicyAction::of_kind(ActionKind::Alert),
                        "high risk forces at least alert",
                    );
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_dlp_domain::entities::analysis_result::{AnalysisResult, SensitiveHit};
    use sentinel_dlp_domain::entities::packet_record::{Direction, PacketRecord, TransportProtocol};
    use sentinel_dlp_domain::entities::parsed_message::ParsedMessage;
    use sentinel_dlp_domain::entities::policy_rule::{ConditionOperator, RuleCondition};
    use sentinel_dlp_domain::value_objects::risk::RiskScore;
    use serde_json::json;
    use std::time::Duration;

    fn context(risk: f64) -> DecisionContext {
        let packet = PacketRecord::new(
            Direction::Outbound,
            TransportProtocol::Tcp,
            "192.168.1.100:54321".parse().unwrap(),
            "8.8.8.8:443".parse().unwrap(),
            vec![],
        );
        let message = ParsedMessage::new("http");
        let hits = if risk > 0.0 {
            vec![SensitiveHit::new("id_card", "personal_info", "11010519491231002X", 0.95, "", "builtin_id_card")]
        } else {
            vec![]
        };
        let analysis = AnalysisResult::new(hits, RiskScore::new(risk), Duration::ZERO);
        DecisionContext::new(packet, message, analysis)
    }

    fn engine(rules: Vec<PolicyRule>) -> PolicyEngine {
        let engine = PolicyEngine::new(EngineConfig::default()).unwrap();
        engine.start(rules).unwrap();
        engine
    }

    fn audit_all() -> PolicyRule {
        PolicyRule::new("audit_all", "Audit everything", 10)
            .with_action(PolicyAction::of_kind(ActionKind::Audit))
    }

    fn block_high_risk() -> PolicyRule {
        PolicyRule::new("block_high_risk", "Block high risk", 90)
            .with_confidence(0.95)
            .with_condition(RuleCondition::new(
                "analysis_result.risk_score",
                ConditionOperator::GreaterEqual,
                json!(0.8),
            ))
            .with_action(PolicyAction::of_kind(ActionKind::Block))
    }

    #[test]
    fn test_default_action_when_no_rules() {
        let engine = engine(vec![]);
        let decision = engine
            .evaluate(&context(0.0), &CancellationToken::new())
            .unwrap();
        assert_eq!(decision.action().kind(), ActionKind::Audit);
        assert!(decision.matched_rules().is_empty());
        assert!(!decision.reason().is_empty());
    }

    #[test]
    fn test_short_circuit_high_priority_high_confidence() {
        let engine = engine(vec![audit_all(), block_high_risk()]);
        let decision = engine
            .evaluate(&context(0.95), &CancellationToken::new())
            .unwrap();
        // block_high_risk (priority 90) is evaluated first and
        // short-circuits before audit_all is visited.
        assert_eq!(decision.action().kind(), ActionKind::Block);
        assert_eq!(decision.matched_rules(), ["block_high_risk"]);
        assert!(decision.reason().contains("short-circuited"));
    }

    #[test]
    fn test_priority_ordering_decides_action() {
        let alert = PolicyRule::new("alert_creds", "Alert credentials", 70)
            .with_confidence(0.7)
            .with_action(PolicyAction::of_kind(ActionKind::Alert));
        let engine = engine(vec![audit_all(), alert]);
        let decision = engine
            .evaluate(&context(0.0), &CancellationToken::new())
            .unwrap();
        // Both match (no conditions); the higher priority wins.
        assert_eq!(decision.action().kind(), ActionKind::Alert);
        assert_eq!(decision.matched_rules(), ["alert_creds", "audit_all"]);
    }

    #[test]
    fn test_critical_risk_forces_block() {
        let engine = engine(vec![audit_all()]);
        let decision = engine
            .evaluate(&context(0.85), &CancellationToken::new())
            .unwrap();
        assert_eq!(decision.action().kind(), ActionKind::Block);
        assert!(decision.reason().contains("critical risk"));
    }

    #[test]
    fn test_high_risk_forces_at_least_alert() {
        let engine = engine(vec![audit_all()]);
        let decision = engine
            .evaluate(&context(0.65), &CancellationToken::new())
            .unwrap();
        assert_eq!(decision.action().kind(), ActionKind::Alert);

        // An already-stronger action is not weakened.
        let quarantine = PolicyRule::new("q", "Quarantine", 80)
            .with_action(PolicyAction::of_kind(ActionKind::Quarantine));
        let engine = engine_with(vec![quarantine]);
        let decision = engine
            .evaluate(&context(0.65), &CancellationToken::new())
            .unwrap();
        assert_eq!(decision.action().kind(), ActionKind::Quarantine);
    }

    fn engine_with(rules: Vec<PolicyRule>) -> PolicyEngine {
        engine(rules)
    }

    #[test]
    fn test_cancellation_yields_no_partial_decision() {
        let engine = engine(vec![audit_all()]);
        let token = CancellationToken::new();
        token.cancel();
        let result = engine.evaluate(&context(0.0), &token);
        assert!(matches!(result, Err(DlpError::Cancelled(_))));
    }

    #[test]
    fn test_zero_deadline_is_cancellation() {
        let engine = PolicyEngine::new(EngineConfig {
            timeout_ms: 0,
            ..EngineConfig::default()
        })
        .unwrap();
        engine.start(vec![audit_all()]).unwrap();
        let result = engine.evaluate(&context(0.0), &CancellationToken::new());
        assert!(matches!(result, Err(DlpError::Cancelled(_))));
    }

    #[test]
    fn test_engine_starts_once() {
        let engine = engine(vec![]);
        assert!(engine.start(vec![]).is_err());
    }
}
