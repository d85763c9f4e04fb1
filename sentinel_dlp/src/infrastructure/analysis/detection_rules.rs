// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Detection Rules
//!
//! The rule types the text analyzer executes, and the default set the core
//! ships: phone, national id, email, and credit card regex rules plus the
//! password/secret/confidential keyword groups.
//!
//! Regex patterns are compiled once at analyzer construction. A pattern
//! that fails to compile disables its rule with a logged warning rather
//! than failing Start - a curated-but-wrong custom rule must not take the
//! agent down.

use regex::{Regex, RegexBuilder};
use sentinel_dlp_domain::value_objects::risk::RiskLevel;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A regex detection rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexRule {
    pub id: String,
    pub name: String,
    pub pattern: String,
    /// Hit type, e.g. `"id_card"`.
    pub hit_type: String,
    pub category: String,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub enabled: bool,
}

/// A keyword detection rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub id: String,
    pub name: String,
    pub keywords: Vec<String>,
    pub hit_type: String,
    pub category: String,
    pub confidence: f64,
    pub case_sensitive: bool,
    /// Whole-word matching via regex boundary expansion.
    pub whole_word: bool,
    pub enabled: bool,
}

/// A regex rule with its compiled pattern.
pub struct CompiledRegexRule {
    pub rule: RegexRule,
    pub regex: Regex,
}

/// A keyword rule expanded into one compiled pattern per keyword.
pub struct CompiledKeywordRule {
    pub rule: KeywordRule,
    pub patterns: Vec<Regex>,
}

/// Compiles regex rules, dropping (and logging) any that fail.
pub fn compile_regex_rules(rules: &[RegexRule]) -> Vec<CompiledRegexRule> {
    rules
        .iter()
        .filter(|rule| rule.enabled)
        .filter_map(|rule| match Regex::new(&rule.pattern) {
            Ok(regex) => Some(CompiledRegexRule {
                rule: rule.clone(),
                regex,
            }),
            Err(e) => {
                warn!(rule = %rule.id, error = %e, "regex rule failed to compile, disabled");
                None
            }
        })
        .collect()
}

/// Compiles keyword rules with case and whole-word options.
pub fn compile_keyword_rules(rules: &[KeywordRule]) -> Vec<CompiledKeywordRule> {
    rules
        .iter()
        .filter(|rule| rule.enabled)
        .map(|rule| {
            let patterns = rule
                .keywords
                .iter()
                .filter_map(|keyword| {
                    let escaped = regex::escape(keyword);
                    let pattern = if rule.whole_word {
                        format!(r"\b{}\b", escaped)
                    } else {
                        escaped
                    };
                    match RegexBuilder::new(&pattern)
                        .case_insensitive(!rule.case_sensitive)
                        .build()
                    {
                        Ok(regex) => Some(regex),
                        Err(e) => {
                            warn!(rule = %rule.id, keyword = %keyword, error = %e,
                                  "keyword pattern failed to compile, skipped");
                            None
                        }
                    }
                })
                .collect();
            CompiledKeywordRule {
                rule: rule.clone(),
                patterns,
            }
        })
        .collect()
}

/// The regex rules shipped by the core.
pub fn default_regex_rules() -> Vec<RegexRule> {
    vec![
        RegexRule {
            id: "builtin_phone".to_string(),
            name: "Mobile phone number".to_string(),
            pattern: r"\b1[3-9]\d{9}\b".to_string(),
            hit_type: "phone".to_string(),
            category: "personal_info".to_string(),
            risk_level: RiskLevel::Medium,
            confidence: 0.8,
            enabled: true,
        },
        RegexRule {
            id: "builtin_id_card".to_string(),
            name: "National id number".to_string(),
            pattern: r"\b\d{17}[\dXx]\b".to_string(),
            hit_type: "id_card".to_string(),
            category: "personal_info".to_string(),
            risk_level: RiskLevel::High,
            confidence: 0.9,
            enabled: true,
        },
        RegexRule {
            id: "builtin_email".to_string(),
            name: "Email address".to_string(),
            pattern: r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b".to_string(),
            hit_type: "email".to_string(),
            category: "personal_info".to_string(),
            risk_level: RiskLevel::Medium,
            confidence: 0.85,
            enabled: true,
        },
        RegexRule {
            id: "builtin_credit_card".to_string(),
            name: "Credit card number".to_string(),
            pattern: r"\b\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}\b".to_string(),
            hit_type: "credit_card".to_string(),
            category: "financial".to_string(),
            risk_level: RiskLevel::High,
            confidence: 0.85,
            enabled: true,
        },
    ]
}

/// The keyword groups shipped by the core.
pub fn default_keyword_rules() -> Vec<KeywordRule> {
    vec![
        KeywordRule {
            id: "builtin_credentials".to_string(),
            name: "Credential keywords".to_string(),
            keywords: ["password", "passwd", "secret", "api_key", "token"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            hit_type: "keyword".to_string(),
            category: "credentials".to_string(),
            confidence: 0.7,
            case_sensitive: false,
            whole_word: true,
            enabled: true,
        },
        KeywordRule {
            id: "builtin_confidential".to_string(),
            name: "Confidential markings".to_string(),
            keywords: ["confidential", "internal only", "classified"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            hit_type: "keyword".to_string(),
            category: "confidential".to_string(),
            confidence: 0.6,
            case_sensitive: false,
            whole_word: false,
            enabled: true,
        },
    ]
}
