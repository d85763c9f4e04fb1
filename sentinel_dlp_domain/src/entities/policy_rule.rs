// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Policy Rule Entity
//!
//! The typed rule schema: identity and versioning metadata, an ordered
//! condition list, and an ordered action list. Conditions reference fields of
//! the decision context by dotted path (e.g. `analysis_result.risk_level`);
//! actions are tagged variants so the execution manager can key its registry
//! by [`ActionKind`] without downcasting.
//!
//! ## Evaluation ordering
//!
//! Rules are evaluated in descending priority; equal priorities tie-break on
//! lexical rule id. [`PolicyRule::evaluation_order`] is the single comparator
//! both the engine and the tests use, so ordering can never drift between
//! them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Condition operators supported by the rule evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    Regex,
    NotRegex,
    Exists,
    NotExists,
}

/// One condition of a rule. All of a rule's conditions must match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    /// Dotted path into the decision context, e.g.
    /// `analysis_result.risk_level` or `parsed_message.url`.
    pub field: String,
    pub operator: ConditionOperator,
    /// Comparison operand. Ignored by `Exists` / `NotExists`.
    #[serde(default)]
    pub value: serde_json::Value,
}

impl RuleCondition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: serde_json::Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }
}

/// Discriminant of a policy action, used to key the executor registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Allow,
    Block,
    Alert,
    Audit,
    Encrypt,
    Quarantine,
    Redirect,
}

impl ActionKind {
    /// Parses the lowercase wire spelling. Unknown spellings yield `None`.
    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "allow" => Some(ActionKind::Allow),
            "block" => Some(ActionKind::Block),
            "alert" => Some(ActionKind::Alert),
            "audit" => Some(ActionKind::Audit),
            "encrypt" => Some(ActionKind::Encrypt),
            "quarantine" => Some(ActionKind::Quarantine),
            "redirect" => Some(ActionKind::Redirect),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Allow => "allow",
            ActionKind::Block => "block",
            ActionKind::Alert => "alert",
            ActionKind::Audit => "audit",
            ActionKind::Encrypt => "encrypt",
            ActionKind::Quarantine => "quarantine",
            ActionKind::Redirect => "redirect",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rule action: tagged kind plus a free-form parameter map.
///
/// Serializes as `{"type": "block", "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PolicyAction {
    Allow {
        #[serde(default)]
        params: BTreeMap<String, serde_json::Value>,
    },
    Block {
        #[serde(default)]
        params: BTreeMap<String, serde_json::Value>,
    },
    Alert {
        #[serde(default)]
        params: BTreeMap<String, serde_json::Value>,
    },
    Audit {
        #[serde(default)]
        params: BTreeMap<String, serde_json::Value>,
    },
    Encrypt {
        #[serde(default)]
        params: BTreeMap<String, serde_json::Value>,
    },
    Quarantine {
        #[serde(default)]
        params: BTreeMap<String, serde_json::Value>,
    },
    Redirect {
        #[serde(default)]
        params: BTreeMap<String, serde_json::Value>,
    },
}

impl PolicyAction {
    /// Builds an action of the given kind with empty parameters.
    pub fn of_kind(kind: ActionKind) -> Self {
        let params = BTreeMap::new();
        match kind {
            ActionKind::Allow => PolicyAction::Allow { params },
            ActionKind::Block => PolicyAction::Block { params },
            ActionKind::Alert => PolicyAction::Alert { params },
            ActionKind::Audit => PolicyAction::Audit { params },
            ActionKind::Encrypt => PolicyAction::Encrypt { params },
            ActionKind::Quarantine => PolicyAction::Quarantine { params },
            ActionKind::Redirect => PolicyAction::Redirect { params },
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            PolicyAction::Allow { .. } => ActionKind::Allow,
            PolicyAction::Block { .. } => ActionKind::Block,
            PolicyAction::Alert { .. } => ActionKind::Alert,
            PolicyAction::Audit { .. } => ActionKind::Audit,
            PolicyAction::Encrypt { .. } => ActionKind::Encrypt,
            PolicyAction::Quarantine { .. } => ActionKind::Quarantine,
            PolicyAction::Redirect { .. } => ActionKind::Redirect,
        }
    }

    pub fn params(&self) -> &BTreeMap<String, serde_json::Value> {
        match self {
            PolicyAction::Allow { params }
            | PolicyAction::Block { params }
            | PolicyAction::Alert { params }
            | PolicyAction::Audit { params }
            | PolicyAction::Encrypt { params }
            | PolicyAction::Quarantine { params }
            | PolicyAction::Redirect { params } => params,
        }
    }

    /// Convenience accessor for a string parameter.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params().get(key).and_then(|v| v.as_str())
    }
}

/// A complete policy rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub name: String,
    /// Priority in `[0, 100]`; higher evaluates first.
    pub priority: u8,
    pub enabled: bool,
    /// Confidence of the rule itself, in `[0, 1]`. Together with priority it
    /// gates the short-circuit path (priority ≥ 90 and confidence ≥ 0.9).
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<PolicyAction>,
    #[serde(default)]
    pub version: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_confidence() -> f64 {
    1.0
}

impl PolicyRule {
    pub fn new(id: impl Into<String>, name: impl Into<String>, priority: u8) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            priority: priority.min(100),
            enabled: true,
            confidence: 1.0,
            conditions: Vec::new(),
            actions: Vec::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_condition(mut self, condition: RuleCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_action(mut self, action: PolicyAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Validates structural invariants. Called on insert/update by the rule
    /// store.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("rule id must not be empty".to_string());
        }
        if self.priority > 100 {
            return Err(format!("rule '{}': priority {} exceeds 100", self.id, self.priority));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("rule '{}': confidence out of [0,1]", self.id));
        }
        if self.actions.is_empty() {
            return Err(format!("rule '{}': at least one action required", self.id));
        }
        Ok(())
    }

    /// The first action, which becomes the decision's action when this rule
    /// wins.
    pub fn first_action(&self) -> Option<&PolicyAction> {
        self.actions.first()
    }

    /// Deterministic evaluation comparator: priority descending, then id
    /// lexically ascending.
    pub fn evaluation_order(a: &PolicyRule, b: &PolicyRule) -> std::cmp::Ordering {
        b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_evaluation_order_priority_then_id() {
        let mut rules = vec![
            PolicyRule::new("b", "B", 50),
            PolicyRule::new("a", "A", 50),
            PolicyRule::new("c", "C", 90),
        ];
        rules.sort_by(PolicyRule::evaluation_order);
        let ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn test_action_tagged_serialization() {
        let action = PolicyAction::Block {
            params: [("ttl_seconds".to_string(), json!(300))].into_iter().collect(),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "block");
        assert_eq!(json["params"]["ttl_seconds"], 300);

        let back: PolicyAction = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), ActionKind::Block);
    }

    #[test]
    fn test_rule_round_trip_preserves_semantics() {
        let rule = PolicyRule::new("block_high_risk", "Block high risk", 90)
            .with_confidence(0.95)
            .with_condition(RuleCondition::new(
                "analysis_result.risk_level",
                ConditionOperator::Equals,
                json!("critical"),
            ))
            .with_action(PolicyAction::of_kind(ActionKind::Block));

        let text = serde_json::to_string(&rule).unwrap();
        let back: PolicyRule = serde_json::from_str(&text).unwrap();
        assert_eq!(rule, back);
    }

    #[test]
    fn test_validation() {
        let no_action = PolicyRule::new("r", "R", 10);
        assert!(no_action.validate().is_err());

        let ok = PolicyRule::new("r", "R", 10).with_action(PolicyAction::of_kind(ActionKind::Audit));
        assert!(ok.validate().is_ok());

        let empty_id = PolicyRule::new("", "R", 10).with_action(PolicyAction::of_kind(ActionKind::Audit));
        assert!(empty_id.validate().is_err());
    }

    #[test]
    fn test_priority_clamped_at_construction() {
        let r = PolicyRule::new("r", "R", 200);
        assert_eq!(r.priority, 100);
    }
}
