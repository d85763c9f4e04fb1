// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Rule Evaluator
//!
//! Evaluates rule conditions against the JSON snapshot of a decision
//! context. A rule matches only when ALL of its conditions match;
//! per-condition errors (bad path, bad regex, type mismatch) are logged and
//! treated as non-match - they never abort the evaluation.
//!
//! ## Operators
//!
//! `equals`, `not_equals`, `contains`, `not_contains`, `starts_with`,
//! `ends_with`, `greater_than`, `less_than`, `greater_equal`, `less_equal`,
//! `regex`, `not_regex`, `exists`, `not_exists`. Numeric comparisons use
//! permissive string→float coercion: `"0.7"` compares equal to `0.7`.

use parking_lot::RwLock;
use regex::Regex;
use sentinel_dlp_domain::entities::policy_rule::{ConditionOperator, PolicyRule, RuleCondition};
use sentinel_dlp_domain::error::DlpError;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Condition evaluator with a compiled-regex cache.
pub struct RuleEvaluator {
    regex_cache: RwLock<HashMap<String, Regex>>,
}

impl RuleEvaluator {
    pub fn new() -> Self {
        Self {
            regex_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolves a dotted path (`analysis_result.risk_level`) into the
    /// snapshot. Array elements are addressable by index segment.
    pub fn resolve_path<'a>(snapshot: &'a Value, path: &str) -> Option<&'a Value> {
        let mut current = snapshot;
        for segment in path.split('.') {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Permissive numeric coercion: numbers, numeric strings, and bools.
    fn as_number(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// String rendering used by the textual operators.
    fn as_text(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn cached_regex(&self, pattern: &str) -> Result<Regex, DlpError> {
        if let Some(regex) = self.regex_cache.read().get(pattern) {
            return Ok(regex.clone());
        }
        let regex = Regex::new(pattern)
            .map_err(|e| DlpError::policy_evaluation(format!("bad condition regex {:?}: {}", pattern, e)))?;
        self.regex_cache
            .write()
            .insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }

    /// Evaluates one condition. `Err` is reserved for condition faults the
    /// caller logs and treats as non-match.
    pub fn evaluate_condition(
        &self,
        snapshot: &Value,
        condition: &RuleCondition,
    ) -> Result<bool, DlpError> {
        use ConditionOperator::*;

        let resolved = Self::resolve_path(snapshot, &condition.field);

        // Existence operators work on resolution alone.
        match condition.operator {
            Exists => return Ok(resolved.is_some_and(|v| !v.is_null())),
            NotExists => return Ok(resolved.is_none_or(|v| v.is_null())),
            _ => {}
        }

        let Some(actual) = resolved else {
            return Ok(false);
        };

        match condition.operator {
            Equals | NotEquals => {
                // Numeric coercion first so "0.7" == 0.7; fall back to text.
                let equal = match (Self::as_number(actual), Self::as_number(&condition.value)) {
                    (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
                    _ => Self::as_text(actual) == Self::as_text(&condition.value),
                };
                Ok(if condition.operator == Equals { equal } else { !equal })
            }
            Contains | NotContains => {
                let found = match actual {
                    Value::Array(items) => {
                        let needle = Self::as_text(&condition.value);
                        items.iter().any(|item| Self::as_text(item) == needle)
                    }
                    other => Self::as_text(other).contains(&Self::as_text(&condition.value)),
                };
                Ok(if condition.operator == Contains { found } else { !found })
            }
            StartsWith => Ok(Self::as_text(actual).starts_with(&Self::as_text(&condition.value))),
            EndsWith => Ok(Self::as_text(actual).ends_with(&Self::as_text(&condition.value))),
            GreaterThan | LessThan | GreaterEqual | LessEqual => {
                let a = Self::as_number(actual).ok_or_else(|| {
                    DlpError::policy_evaluation(format!(
                        "field {:?} is not numeric for {:?}",
                        condition.field, condition.operator
                    ))
                })?;
                let b = Self::as_number(&condition.value).ok_or_else(|| {
                    DlpError::policy_evaluation(format!(
                        "condition value {:?} is not numeric",
                        condition.value
                    ))
                })?;
                Ok(match condition.operator {
                    GreaterThan => a > b,
                    LessThan => a < b,
                    GreaterEqual => a >= b,
                    LessEqual => a <= b,
                    _ => false,
                })
            }
            Regex | NotRegex => {
                let pattern = condition.value.as_str().ok_or_else(|| {
                    DlpError::policy_evaluation("regex condition value must be a string")
                })?;
                let regex = self.cached_regex(pattern)?;
                let matched = regex.is_match(&Self::as_text(actual));
                Ok(if condition.operator == Regex { matched } else { !matched })
            }
            Exists | NotExists => Ok(false), // handled above
        }
    }

    /// Whether every condition of `rule` matches. Per-condition errors are
    /// logged and count as non-match.
    pub fn matches_rule(&self, snapshot: &Value, rule: &PolicyRule) -> bool {
        for condition in &rule.conditions {
            match self.evaluate_condition(snapshot, condition) {
                Ok(true) => {}
                Ok(false) => return false,
                Err(e) => {
                    debug!(rule = %rule.id, field = %condition.field, error = %e,
                           "condition error treated as non-match");
                    return false;
                }
            }
        }
        true
    }
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self::new()
    }
}
