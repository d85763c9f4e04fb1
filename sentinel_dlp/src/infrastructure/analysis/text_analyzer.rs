// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Text Analyzer
//!
//! The default content analyzer: regex and keyword detection over the
//! analyzable text of a parsed message, with bounded worst-case work and the
//! fixed aggregation formula.
//!
//! ## Algorithm
//!
//! 1. Collect analyzable text: the body when non-empty, otherwise the
//!    concatenated URL, header values, and metadata string values.
//!    Encrypted flows with no analyzable body short-circuit to a low-risk
//!    result tagged `encrypted_content` (0.1 for TLS/HTTPS, 0.3 for other
//!    encrypted protocols).
//! 2. Run every enabled regex rule with a per-pattern match cap (default
//!    100); hits under the minimum-confidence floor are discarded.
//! 3. Run every enabled keyword rule honoring case-sensitivity and
//!    whole-word options.
//! 4. Aggregate: `clamp(avg_confidence × max_confidence +
//!    min(hit_count × 0.1, 1.0), 0, 1)`; the ML contribution (×0.3) is
//!    folded in by the registry before clamping is final.
//!
//! The multi-rule scan fans out over rayon - rule count × text size is the
//! hot product in this pipeline.

use super::detection_rules::{
    compile_keyword_rules, compile_regex_rules, CompiledKeywordRule, CompiledRegexRule,
    KeywordRule, RegexRule,
};
use crate::infrastructure::config::AnalysisConfig;
use rayon::prelude::*;
use sentinel_dlp_domain::entities::analysis_result::{AnalysisResult, SensitiveHit};
use sentinel_dlp_domain::entities::parsed_message::ParsedMessage;
use sentinel_dlp_domain::error::DlpError;
use sentinel_dlp_domain::services::content_analyzer::ContentAnalyzer;
use sentinel_dlp_domain::value_objects::risk::RiskScore;
use std::time::Instant;

const CONTEXT_RADIUS: usize = 50;

/// Regex + keyword text analyzer.
pub struct TextAnalyzer {
    regex_rules: Vec<CompiledRegexRule>,
    keyword_rules: Vec<CompiledKeywordRule>,
    config: AnalysisConfig,
}

impl TextAnalyzer {
    pub fn new(
        regex_rules: &[RegexRule],
        keyword_rules: &[KeywordRule],
        config: AnalysisConfig,
    ) -> Self {
        Self {
            regex_rules: compile_regex_rules(regex_rules),
            keyword_rules: compile_keyword_rules(keyword_rules),
            config,
        }
    }

    /// Analyzer with the built-in default rule set.
    pub fn with_default_rules(config: AnalysisConfig) -> Self {
        Self::new(
            &super::detection_rules::default_regex_rules(),
            &super::detection_rules::default_keyword_rules(),
            config,
        )
    }

    /// The text a message exposes to detection, if any.
    pub fn analyzable_text(message: &ParsedMessage) -> Option<String> {
        if !message.body().is_empty() {
            return Some(message.body_text());
        }
        let mut parts: Vec<&str> = Vec::new();
        if let Some(url) = message.url() {
            parts.push(url);
        }
        parts.extend(message.headers().values().map(String::as_str));
        parts.extend(message.metadata().values().map(String::as_str));
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    /// ±50 characters of context around a match, with the matched value
    /// masked in place.
    fn context_around(text: &str, start: usize, end: usize) -> String {
        let from = text[..start]
            .char_indices()
            .rev()
            .take(CONTEXT_RADIUS)
            .last()
            .map(|(i, _)| i)
            .unwrap_or(start);
        let to = text[end..]
            .char_indices()
            .take(CONTEXT_RADIUS)
            .last()
            .map(|(i, c)| end + i + c.len_utf8())
            .unwrap_or(end);
        let masked =
            sentinel_dlp_domain::value_objects::masked_value::MaskedValue::mask(&text[start..end]);
        format!("{}{}{}", &text[from..start], masked, &text[end..to])
    }

    fn scan_regex(&self, text: &str) -> Vec<SensitiveHit> {
        let cap = self.config.max_matches_per_pattern;
        let floor = self.config.min_confidence;
        self.regex_rules
            .par_iter()
            .flat_map_iter(|compiled| {
                let rule = &compiled.rule;
                compiled
                    .regex
                    .find_iter(text)
                    .take(cap)
                    .filter(move |_| rule.confidence >= floor)
                    .map(move |m| {
                        SensitiveHit::new(
                            rule.hit_type.clone(),
                            rule.category.clone(),
                            m.as_str(),
                            rule.confidence,
                            Self::context_around(text, m.start(), m.end()),
                            rule.id.clone(),
                        )
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn scan_keywords(&self, text: &str) -> Vec<SensitiveHit> {
        let cap = self.config.max_matches_per_pattern;
        let floor = self.config.min_confidence;
        self.keyword_rules
            .par_iter()
            .flat_map_iter(|compiled| {
                let rule = &compiled.rule;
                let mut hits = Vec::new();
                if rule.confidence < floor {
                    return hits;
                }
                for pattern in &compiled.patterns {
                    for m in pattern.find_iter(text).take(cap) {
                        hits.push(SensitiveHit::new(
                            rule.hit_type.clone(),
                            rule.category.clone(),
                            m.as_str(),
                            rule.confidence,
                            Self::context_around(text, m.start(), m.end()),
                            rule.id.clone(),
                        ));
                    }
                }
                hits
            })
            .collect()
    }

    /// The fixed aggregation formula over hit confidences.
    pub fn aggregate_score(hits: &[SensitiveHit]) -> RiskScore {
        if hits.is_empty() {
            return RiskScore::ZERO;
        }
        let count = hits.len() as f64;
        let sum: f64 = hits.iter().map(|h| h.confidence()).sum();
        let avg = sum / count;
        let max = hits
            .iter()
            .map(|h| h.confidence())
            .fold(0.0f64, f64::max);
        RiskScore::new(avg * max + (count * 0.1).min(1.0))
    }

    fn encrypted_short_circuit(message: &ParsedMessage, started: Instant) -> AnalysisResult {
        let score = if message.protocol() == "tls" || message.url().map_or(false, |u| u.starts_with("https"))
        {
            RiskScore::new(0.1)
        } else {
            RiskScore::new(0.3)
        };
        let mut result = AnalysisResult::new(Vec::new(), score, started.elapsed());
        result.insert_sub_result(
            "text",
            serde_json::json!({ "tag": "encrypted_content", "analyzed": false }),
        );
        result
    }
}

impl ContentAnalyzer for TextAnalyzer {
    fn name(&self) -> &'static str {
        "text"
    }

    fn content_type_prefixes(&self) -> &[&'static str] {
        // The empty prefix makes this the default member of the registry.
        &["text/", "application/json", "application/xml", "application/x-www-form-urlencoded", "message/", ""]
    }

    fn analyze(&self, message: &ParsedMessage) -> Result<AnalysisResult, DlpError> {
        let started = Instant::now();

        if message.is_encrypted() && message.body().is_empty() {
            return Ok(Self::encrypted_short_circuit(message, started));
        }

        let Some(text) = Self::analyzable_text(message) else {
            return Ok(AnalysisResult::new(Vec::new(), RiskScore::ZERO, started.elapsed()));
        };

        let mut hits = self.scan_regex(&text);
        hits.extend(self.scan_keywords(&text));

        let score = Self::aggregate_score(&hits);
        let mut result = AnalysisResult::new(hits, score, started.elapsed());
        result.insert_sub_result(
            "text",
            serde_json::json!({
                "analyzed_chars": text.chars().count(),
                "regex_rules": self.regex_rules.len(),
                "keyword_rules": self.keyword_rules.len(),
            }),
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_dlp_domain::value_objects::risk::RiskLevel;

    fn analyzer() -> TextAnalyzer {
        TextAnalyzer::with_default_rules(AnalysisConfig::default())
    }

    fn message_with_body(body: &str) -> ParsedMessage {
        let mut m = ParsedMessage::new("http");
        m.set_content_type("text/plain");
        m.set_body(body.as_bytes().to_vec());
        m
    }

    #[test]
    fn test_password_keyword_hits() {
        let result = analyzer()
            .analyze(&message_with_body("{\"password\":\"s3cr3t\",\"user\":\"alice\"}"))
            .unwrap();
        assert!(result.has_hits());
        let hit = result
            .hits()
            .iter()
            .find(|h| h.rule_id() == "builtin_credentials")
            .expect("credential hit");
        assert_eq!(hit.confidence(), 0.7);
        assert_eq!(hit.category(), "credentials");
    }

    #[test]
    fn test_id_card_is_high_confidence() {
        let result = analyzer()
            .analyze(&message_with_body("id: 11010519491231002X sent"))
            .unwrap();
        let hit = result
            .hits()
            .iter()
            .find(|h| h.hit_type() == "id_card")
            .expect("id hit");
        assert_eq!(hit.confidence(), 0.9);
        // Masked: first two + stars + last two, never the raw value.
        assert!(hit.masked().as_str().starts_with("11"));
        assert!(hit.masked().as_str().ends_with("2X"));
        assert!(hit.context().contains('*'));
        assert!(!hit.context().contains("11010519491231002X"));
    }

    #[test]
    fn test_aggregate_formula() {
        // One hit at 0.7: 0.7*0.7 + 0.1 = 0.59.
        let hits = vec![SensitiveHit::new("keyword", "credentials", "password", 0.7, "", "r")];
        assert!((TextAnalyzer::aggregate_score(&hits).value() - 0.59).abs() < 1e-9);

        // Count term saturates at 1.0.
        let many: Vec<SensitiveHit> = (0..20)
            .map(|i| SensitiveHit::new("email", "personal_info", &format!("a{}@b.cd", i), 0.85, "", "r"))
            .collect();
        let score = TextAnalyzer::aggregate_score(&many);
        assert!((score.value() - 1.0).abs() < 1e-9); // 0.85*0.85 + 1.0 clamped
    }

    #[test]
    fn test_encrypted_short_circuit() {
        let mut m = ParsedMessage::new("tls");
        m.insert_metadata("encrypted", "true");
        m.insert_metadata("server_name", "example.com");
        let result = analyzer().analyze(&m).unwrap();
        assert!((result.risk_score().value() - 0.1).abs() < 1e-9);
        assert_eq!(result.risk_level(), RiskLevel::Low);
        assert!(!result.has_hits());

        let mut other = ParsedMessage::new("generic");
        other.insert_metadata("encrypted", "true");
        let result = analyzer().analyze(&other).unwrap();
        assert!((result.risk_score().value() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_headers_scanned_when_body_empty() {
        let mut m = ParsedMessage::new("http");
        m.set_url("http://example.com/submit?email=alice@example.com");
        let result = analyzer().analyze(&m).unwrap();
        assert!(result.hits().iter().any(|h| h.hit_type() == "email"));
    }

    #[test]
    fn test_match_cap_bounds_work() {
        let analyzer = TextAnalyzer::with_default_rules(AnalysisConfig {
            min_confidence: 0.3,
            max_matches_per_pattern: 5,
        });
        let body: String = (0..50).map(|i| format!("x{}@y.com ", i)).collect();
        let result = analyzer.analyze(&message_with_body(&body)).unwrap();
        let emails = result.hits().iter().filter(|h| h.hit_type() == "email").count();
        assert_eq!(emails, 5);
    }

    #[test]
    fn test_confidence_floor_discards() {
        let analyzer = TextAnalyzer::with_default_rules(AnalysisConfig {
            min_confidence: 0.75,
            max_matches_per_pattern: 100,
        });
        // Keyword rules (0.6, 0.7) fall under the floor; id_card (0.9) stays.
        let result = analyzer
            .analyze(&message_with_body("password 11010519491231002X"))
            .unwrap();
        assert!(result.hits().iter().all(|h| h.confidence() >= 0.75));
    }
}
