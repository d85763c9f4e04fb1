// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Quantified policy-engine properties: deterministic ordering, the risk
//! override, non-empty reasons, and rule persistence round-trips.

use proptest::prelude::*;
use sentinel_dlp::infrastructure::config::EngineConfig;
use sentinel_dlp::infrastructure::policy::rule_store::RuleStore;
use sentinel_dlp::infrastructure::policy::PolicyEngine;
use sentinel_dlp_bootstrap::shutdown::CancellationToken;
use sentinel_dlp_domain::entities::analysis_result::{AnalysisResult, SensitiveHit};
use sentinel_dlp_domain::entities::decision::DecisionContext;
use sentinel_dlp_domain::entities::packet_record::{Direction, PacketRecord, TransportProtocol};
use sentinel_dlp_domain::entities::parsed_message::ParsedMessage;
use sentinel_dlp_domain::entities::policy_rule::{ActionKind, PolicyAction, PolicyRule};
use sentinel_dlp_domain::value_objects::risk::{RiskLevel, RiskScore};
use std::time::Duration;

fn context(risk: f64) -> DecisionContext {
    let packet = PacketRecord::new(
        Direction::Outbound,
        TransportProtocol::Tcp,
        "192.168.1.100:54321".parse().unwrap(),
        "8.8.8.8:443".parse().unwrap(),
        vec![],
    );
    let hits = if risk > 0.0 {
        vec![SensitiveHit::new("email", "personal_info", "a@b.cd", risk, "", "r")]
    } else {
        Vec::new()
    };
    let analysis = AnalysisResult::new(hits, RiskScore::new(risk), Duration::ZERO);
    DecisionContext::new(packet, ParsedMessage::new("http"), analysis)
}

fn unconditional(id: &str, priority: u8, kind: ActionKind) -> PolicyRule {
    // Confidence below the short-circuit threshold keeps ordering visible.
    PolicyRule::new(id, id.to_string(), priority)
        .with_confidence(0.5)
        .with_action(PolicyAction::of_kind(kind))
}

#[test]
fn reason_is_non_empty_whenever_rules_match() {
    let engine = PolicyEngine::new(EngineConfig::default()).unwrap();
    engine
        .start(vec![unconditional("a", 40, ActionKind::Audit)])
        .unwrap();
    let decision = engine.evaluate(&context(0.0), &CancellationToken::new()).unwrap();
    assert!(!decision.matched_rules().is_empty());
    assert!(!decision.reason().is_empty());
}

#[test]
fn critical_analysis_risk_always_blocks() {
    for action in [ActionKind::Allow, ActionKind::Audit, ActionKind::Alert, ActionKind::Redirect] {
        let engine = PolicyEngine::new(EngineConfig::default()).unwrap();
        engine.start(vec![unconditional("r", 50, action)]).unwrap();
        let decision = engine.evaluate(&context(0.95), &CancellationToken::new()).unwrap();
        assert_eq!(
            decision.action().kind(),
            ActionKind::Block,
            "action {} must be overridden at critical risk",
            action
        );
        assert_eq!(decision.risk_level(), RiskLevel::Critical);
    }
}

#[test]
fn rule_set_round_trip_preserves_evaluation_behavior() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rules.json");

    let original = RuleStore::new(100);
    original.add(unconditional("w", 80, ActionKind::Alert)).unwrap();
    original.add(unconditional("a", 80, ActionKind::Block)).unwrap();
    original.add(unconditional("m", 20, ActionKind::Audit)).unwrap();
    original.save_to_file(&path).unwrap();

    let engine_a = PolicyEngine::new(EngineConfig::default()).unwrap();
    engine_a.start(original.evaluation_ordered()).unwrap();

    let restored = RuleStore::new(100);
    restored.load_from_file(&path).unwrap();
    let engine_b = PolicyEngine::new(EngineConfig::default()).unwrap();
    engine_b.start(restored.evaluation_ordered()).unwrap();

    let token = CancellationToken::new();
    let a = engine_a.evaluate(&context(0.0), &token).unwrap();
    let b = engine_b.evaluate(&context(0.0), &token).unwrap();
    assert_eq!(a.action().kind(), b.action().kind());
    assert_eq!(a.matched_rules(), b.matched_rules());
}

#[test]
fn zero_deadline_evaluation_has_no_side_effects() {
    let engine = PolicyEngine::new(EngineConfig {
        timeout_ms: 0,
        ..EngineConfig::default()
    })
    .unwrap();
    engine.start(vec![unconditional("r", 50, ActionKind::Block)]).unwrap();
    let result = engine.evaluate(&context(0.0), &CancellationToken::new());
    assert!(result.is_err());
}

proptest! {
    /// For any two matched rules, the winner is the higher priority, with
    /// lexical id as the tie-break.
    #[test]
    fn prop_higher_priority_rule_wins(p1 in 0u8..=89, p2 in 0u8..=89) {
        let engine = PolicyEngine::new(EngineConfig::default()).unwrap();
        engine.start(vec![
            unconditional("first", p1, ActionKind::Alert),
            unconditional("second", p2, ActionKind::Encrypt),
        ]).unwrap();

        let decision = engine.evaluate(&context(0.0), &CancellationToken::new()).unwrap();
        let expected = if p1 > p2 {
            ActionKind::Alert
        } else if p2 > p1 {
            ActionKind::Encrypt
        } else {
            // Equal priority: lexical id order, "first" < "second".
            ActionKind::Alert
        };
        prop_assert_eq!(decision.action().kind(), expected);
    }

    /// Emitted risk scores stay in [0, 1] whatever the analysis says.
    #[test]
    fn prop_decision_risk_in_range(risk in 0.0f64..=1.0) {
        let engine = PolicyEngine::new(EngineConfig::default()).unwrap();
        engine.start(vec![unconditional("r", 10, ActionKind::Audit)]).unwrap();
        let decision = engine.evaluate(&context(risk), &CancellationToken::new()).unwrap();
        prop_assert!((0.0..=1.0).contains(&decision.risk_score().value()));
    }
}
