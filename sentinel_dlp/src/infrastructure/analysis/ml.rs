// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Simple Model Predictor
//!
//! The built-in [`RiskPredictor`]: a keyword-frequency model over the
//! configured sensitive vocabulary. Inference only - the port exists so a
//! real model can plug in; this implementation keeps the contract honest
//! and the 30% weighting path exercised.

use crate::infrastructure::config::SimpleModelConfig;
use sentinel_dlp_domain::error::DlpError;
use sentinel_dlp_domain::services::content_analyzer::RiskPredictor;
use sentinel_dlp_domain::value_objects::risk::RiskScore;

/// Keyword-frequency risk model.
pub struct SimpleModel {
    keywords: Vec<String>,
    confidence_threshold: f64,
    per_hit_weight: f64,
}

impl SimpleModel {
    pub fn new(config: &SimpleModelConfig) -> Self {
        Self {
            keywords: config
                .sensitive_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
            confidence_threshold: config.confidence_threshold,
            per_hit_weight: 0.2,
        }
    }
}

impl RiskPredictor for SimpleModel {
    fn name(&self) -> &'static str {
        "simple_model"
    }

    fn predict(&self, text: &str) -> Result<RiskScore, DlpError> {
        if self.keywords.is_empty() {
            return Ok(RiskScore::ZERO);
        }
        let lower = text.to_lowercase();
        let occurrences: usize = self
            .keywords
            .iter()
            .map(|keyword| lower.matches(keyword.as_str()).count())
            .sum();

        let raw = (occurrences as f64 * self.per_hit_weight).min(1.0);
        // Below the confidence threshold the model abstains.
        if raw < self.confidence_threshold {
            Ok(RiskScore::ZERO)
        } else {
            Ok(RiskScore::new(raw))
        }
    }
}
