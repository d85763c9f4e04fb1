// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Rule Store
//!
//! CRUD over the policy rule set with a hard cap (default 10 000), plus
//! file-backed persistence. Loading then saving a rule set preserves all
//! semantics - ids, priorities, conditions, actions - which the round-trip
//! tests pin.

use parking_lot::RwLock;
use sentinel_dlp_domain::entities::policy_rule::PolicyRule;
use sentinel_dlp_domain::error::DlpError;
use std::collections::HashMap;
use std::path::Path;

/// In-memory rule store with bounded capacity.
pub struct RuleStore {
    rules: RwLock<HashMap<String, PolicyRule>>,
    max_rules: usize,
}

impl RuleStore {
    pub fn new(max_rules: usize) -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
            max_rules,
        }
    }

    /// Adds a rule. Fails on duplicate id, validation error, or cap.
    pub fn add(&self, rule: PolicyRule) -> Result<(), DlpError> {
        rule.validate().map_err(DlpError::invalid_config)?;
        let mut rules = self.rules.write();
        if rules.len() >= self.max_rules {
            return Err(DlpError::resource_exhausted(format!(
                "rule store is at its cap of {}",
                self.max_rules
            )));
        }
        if rules.contains_key(&rule.id) {
            return Err(DlpError::invalid_config(format!(
                "rule '{}' already exists",
                rule.id
            )));
        }
        rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    /// Replaces an existing rule, bumping its version.
    pub fn update(&self, mut rule: PolicyRule) -> Result<(), DlpError> {
        rule.validate().map_err(DlpError::invalid_config)?;
        let mut rules = self.rules.write();
        let Some(existing) = rules.get(&rule.id) else {
            return Err(DlpError::invalid_config(format!("rule '{}' not found", rule.id)));
        };
        rule.version = existing.version + 1;
        rule.updated_at = chrono::Utc::now();
        rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<PolicyRule, DlpError> {
        self.rules
            .write()
            .remove(id)
            .ok_or_else(|| DlpError::invalid_config(format!("rule '{}' not found", id)))
    }

    pub fn get(&self, id: &str) -> Option<PolicyRule> {
        self.rules.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    /// All rules in evaluation order (priority desc, id lexical).
    pub fn evaluation_ordered(&self) -> Vec<PolicyRule> {
        let mut rules: Vec<PolicyRule> = self.rules.read().values().cloned().collect();
        rules.sort_by(PolicyRule::evaluation_order);
        rules
    }

    /// Loads rules from a JSON file, replacing the current set.
    pub fn load_from_file(&self, path: &Path) -> Result<usize, DlpError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DlpError::io_error(format!("read rules {}: {}", path.display(), e)))?;
        let loaded: Vec<PolicyRule> = serde_json::from_str(&text)?;
        for rule in &loaded {
            rule.validate().map_err(DlpError::invalid_config)?;
        }
        if loaded.len() > self.max_rules {
            return Err(DlpError::resource_exhausted(format!(
                "{} rules exceed cap {}",
                loaded.len(),
                self.max_rules
            )));
        }
        let mut rules = self.rules.write();
        rules.clear();
        for rule in loaded {
            rules.insert(rule.id.clone(), rule);
        }
        Ok(rules.len())
    }

    /// Saves the rule set to a JSON file, evaluation-ordered for stable
    /// diffs.
    pub fn save_to_file(&self, path: &Path) -> Result<(), DlpError> {
        let rules = self.evaluation_ordered();
        let text = serde_json::to_string_pretty(&rules)?;
        std::fs::write(path, text)
            .map_err(|e| DlpError::io_error(format!("write rules {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_dlp_domain::entities::policy_rule::{ActionKind, ConditionOperator, PolicyAction, RuleCondition};
    use serde_json::json;

    fn rule(id: &str, priority: u8) -> PolicyRule {
        PolicyRule::new(id, format!("Rule {}", id), priority)
            .with_condition(RuleCondition::new(
                "analysis_result.risk_level",
                ConditionOperator::Equals,
                json!("high"),
            ))
            .with_action(PolicyAction::of_kind(ActionKind::Alert))
    }

    #[test]
    fn test_crud() {
        let store = RuleStore::new(10);
        store.add(rule("a", 50)).unwrap();
        assert!(store.add(rule("a", 50)).is_err()); // duplicate
        assert_eq!(store.len(), 1);

        let mut updated = rule("a", 70);
        updated.name = "renamed".to_string();
        store.update(updated).unwrap();
        let got = store.get("a").unwrap();
        assert_eq!(got.priority, 70);
        assert_eq!(got.version, 2);

        store.remove("a").unwrap();
        assert!(store.is_empty());
        assert!(store.remove("a").is_err());
    }

    #[test]
    fn test_cap_enforced() {
        let store = RuleStore::new(2);
        store.add(rule("a", 1)).unwrap();
        store.add(rule("b", 2)).unwrap();
        assert!(matches!(
            store.add(rule("c", 3)),
            Err(DlpError::ResourceExhausted(_))
        ));
    }

    #[test]
    fn test_save_load_round_trip_preserves_semantics() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");

        let store = RuleStore::new(100);
        store.add(rule("block_high_risk", 90).with_confidence(0.95)).unwrap();
        store.add(rule("audit_all", 10)).unwrap();
        store.save_to_file(&path).unwrap();

        let restored = RuleStore::new(100);
        assert_eq!(restored.load_from_file(&path).unwrap(), 2);

        for id in ["block_high_risk", "audit_all"] {
            let original = store.get(id).unwrap();
            let loaded = restored.get(id).unwrap();
            assert_eq!(original, loaded);
        }
    }

    #[test]
    fn test_evaluation_order() {
        let store = RuleStore::new(10);
        store.add(rule("b", 50)).unwrap();
        store.add(rule("a", 50)).unwrap();
        store.add(rule("z", 90)).unwrap();
        let ids: Vec<String> = store
            .evaluation_ordered()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, ["z", "a", "b"]);
    }
}
