// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Analysis Result Entity
//!
//! Output of the content analyzer set: the ordered list of sensitive hits,
//! the aggregate risk quantities, per-analyzer sub-results, and timings.
//!
//! ## Sensitive value hygiene
//!
//! A [`SensitiveHit`] carries the matched value twice:
//!
//! - `masked` - the audit-safe rendering; this is the ONLY form that
//!   serializes.
//! - `raw` - the original match, held in memory solely so the policy engine
//!   can evaluate conditions against it. It is wrapped in
//!   [`zeroize::Zeroizing`] so the buffer is wiped when the hit drops, and
//!   it is `#[serde(skip)]` so no serializer can ever leak it.

use crate::value_objects::masked_value::MaskedValue;
use crate::value_objects::risk::{RiskLevel, RiskScore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use zeroize::Zeroizing;

/// One detector match against analyzable text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitiveHit {
    /// Detector type, e.g. `"id_card"`, `"email"`, `"keyword"`.
    hit_type: String,
    /// Rule category, e.g. `"personal_info"`, `"credentials"`.
    category: String,
    /// Audit-safe masked value.
    masked: MaskedValue,
    /// Raw matched value. Never serialized; wiped on drop.
    #[serde(skip, default = "empty_raw")]
    raw: Zeroizing<String>,
    confidence: f64,
    /// Up to ±50 characters of surrounding text, already masked in place.
    context: String,
    /// Id of the detection rule that produced this hit.
    rule_id: String,
}

fn empty_raw() -> Zeroizing<String> {
    Zeroizing::new(String::new())
}

impl SensitiveHit {
    pub fn new(
        hit_type: impl Into<String>,
        category: impl Into<String>,
        raw_value: &str,
        confidence: f64,
        context: impl Into<String>,
        rule_id: impl Into<String>,
    ) -> Self {
        Self {
            hit_type: hit_type.into(),
            category: category.into(),
            masked: MaskedValue::mask(raw_value),
            raw: Zeroizing::new(raw_value.to_string()),
            confidence: confidence.clamp(0.0, 1.0),
            context: context.into(),
            rule_id: rule_id.into(),
        }
    }

    pub fn hit_type(&self) -> &str {
        &self.hit_type
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn masked(&self) -> &MaskedValue {
        &self.masked
    }

    /// The raw matched value. In-memory use only.
    pub fn raw_value(&self) -> &str {
        &self.raw
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }
}

/// Aggregate result of content analysis for one message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    hits: Vec<SensitiveHit>,
    risk_score: RiskScore,
    risk_level: RiskLevel,
    /// Union of matched rules' categories, deduplicated, insertion-ordered.
    categories: Vec<String>,
    /// Analyzer-specific sub-results keyed by analyzer name.
    sub_results: BTreeMap<String, serde_json::Value>,
    /// Wall-clock analysis time.
    #[serde(with = "duration_millis")]
    elapsed: Duration,
}

impl AnalysisResult {
    /// An empty, zero-risk result.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a result from hits and a pre-aggregated score.
    pub fn new(hits: Vec<SensitiveHit>, risk_score: RiskScore, elapsed: Duration) -> Self {
        let mut categories: Vec<String> = Vec::new();
        for hit in &hits {
            if !categories.iter().any(|c| c == hit.category()) {
                categories.push(hit.category().to_string());
            }
        }
        Self {
            hits,
            risk_score,
            risk_level: risk_score.level(),
            categories,
            sub_results: BTreeMap::new(),
            elapsed,
        }
    }

    pub fn hits(&self) -> &[SensitiveHit] {
        &self.hits
    }

    pub fn risk_score(&self) -> RiskScore {
        self.risk_score
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn sub_results(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.sub_results
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Attaches an analyzer-specific sub-result.
    pub fn insert_sub_result(&mut self, analyzer: impl Into<String>, value: serde_json::Value) {
        self.sub_results.insert(analyzer.into(), value);
    }

    /// Re-scores the result (used when the ML contribution is folded in).
    pub fn rescore(&mut self, score: RiskScore) {
        self.risk_score = score;
        self.risk_level = score.level();
    }

    pub fn has_hits(&self) -> bool {
        !self.hits.is_empty()
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(de)?))
    }
}
