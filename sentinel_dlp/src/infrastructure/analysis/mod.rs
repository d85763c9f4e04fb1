// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Content Analyzer Registry
//!
//! Dispatches parsed messages to analyzers by content-type prefix. The
//! text analyzer is the default member (empty-prefix match); image content
//! routes through the optional OCR engine whose extracted text flows back
//! into the text analyzer; the optional ML predictor contributes an
//! additional risk signal weighted at 30%, folded in before the final
//! clamp.
//!
//! Analyzer faults degrade to an empty result with the error attached -
//! analysis never stops the pipeline.

pub mod detection_rules;
pub mod ml;
pub mod text_analyzer;

use self::text_analyzer::TextAnalyzer;
use sentinel_dlp_domain::entities::analysis_result::AnalysisResult;
use sentinel_dlp_domain::entities::parsed_message::ParsedMessage;
use sentinel_dlp_domain::services::content_analyzer::{ContentAnalyzer, OcrEngine, RiskPredictor};
use std::sync::Arc;
use tracing::{debug, warn};

/// ML contribution weight per the analyzer-set contract.
const ML_WEIGHT: f64 = 0.3;

/// Content analyzer set with optional OCR and ML enrichment.
pub struct AnalyzerRegistry {
    analyzers: Vec<Arc<dyn ContentAnalyzer>>,
    ocr: Option<Arc<dyn OcrEngine>>,
    predictor: Option<Arc<dyn RiskPredictor>>,
}

impl AnalyzerRegistry {
    pub fn new(analyzers: Vec<Arc<dyn ContentAnalyzer>>) -> Self {
        Self {
            analyzers,
            ocr: None,
            predictor: None,
        }
    }

    /// Registry with only the default text analyzer.
    pub fn with_text_analyzer(text: TextAnalyzer) -> Self {
        Self::new(vec![Arc::new(text)])
    }

    pub fn set_ocr(&mut self, ocr: Arc<dyn OcrEngine>) {
        self.ocr = Some(ocr);
    }

    pub fn set_predictor(&mut self, predictor: Arc<dyn RiskPredictor>) {
        self.predictor = Some(predictor);
    }

    /// Registered analyzer names (for `plugin list`).
    pub fn analyzer_names(&self) -> Vec<&'static str> {
        self.analyzers.iter().map(|a| a.name()).collect()
    }

    /// Picks the analyzer with the longest matching content-type prefix.
    fn select(&self, content_type: &str) -> Option<&Arc<dyn ContentAnalyzer>> {
        let mut best: Option<(&Arc<dyn ContentAnalyzer>, usize)> = None;
        for analyzer in &self.analyzers {
            for prefix in analyzer.content_type_prefixes() {
                if content_type.starts_with(prefix) {
                    let len = prefix.len();
                    if best.map_or(true, |(_, best_len)| len > best_len) {
                        best = Some((analyzer, len));
                    }
                }
            }
        }
        best.map(|(analyzer, _)| analyzer)
    }

    /// Analyzes one message through the full enrichment path.
    pub async fn analyze(&self, message: &ParsedMessage) -> AnalysisResult {
        let content_type = message.content_type().unwrap_or("");

        // Image content: OCR first, when configured; extracted text re-enters
        // the text path as a synthetic message.
        let effective: ParsedMessage = if content_type.starts_with("image/") {
            match &self.ocr {
                Some(ocr) => match ocr.extract_text(message.body()).await {
                    Ok(text) => {
                        debug!(chars = text.len(), "ocr extracted text from image");
                        let mut synthetic = message.clone();
                        synthetic.set_content_type("text/plain");
                        synthetic.set_body(text.into_bytes());
                        synthetic
                    }
                    Err(e) => {
                        warn!(error = %e, "ocr extraction failed, image skipped");
                        return AnalysisResult::empty();
                    }
                },
                None => {
                    debug!("image content with no ocr engine, metadata-only analysis");
                    let mut stripped = message.clone();
                    stripped.set_body(Vec::new());
                    stripped
                }
            }
        } else {
            message.clone()
        };

        let analyzer = match self.select(effective.content_type().unwrap_or("")) {
            Some(analyzer) => analyzer,
            None => {
                debug!(content_type, "no analyzer for content type");
                return AnalysisResult::empty();
            }
        };

        let mut result = match analyzer.analyze(&effective) {
            Ok(result) => result,
            Err(e) => {
                warn!(analyzer = analyzer.name(), error = %e, "analyzer failed");
                let mut empty = AnalysisResult::empty();
                empty.insert_sub_result(
                    analyzer.name(),
                    serde_json::json!({ "error": e.to_string() }),
                );
                return empty;
            }
        };

        // ML raises the aggregate by its weighted score before the clamp.
        if let Some(predictor) = &self.predictor {
            if let Some(text) = TextAnalyzer::analyzable_text(&effective) {
                match predictor.predict(&text) {
                    Ok(ml_score) => {
                        let combined = result
                            .risk_score()
                            .saturating_add(ml_score.value() * ML_WEIGHT);
                        result.insert_sub_result(
                            predictor.name(),
                            serde_json::json!({ "risk_score": ml_score.value(), "weight": ML_WEIGHT }),
                        );
                        result.rescore(combined);
                    }
                    Err(e) => {
                        warn!(predictor = predictor.name(), error = %e, "ml prediction failed");
                    }
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::{AnalysisConfig, SimpleModelConfig};
    use async_trait::async_trait;
    use sentinel_dlp_domain::error::DlpError;
    use sentinel_dlp_domain::value_objects::risk::RiskScore;

    fn registry() -> AnalyzerRegistry {
        AnalyzerRegistry::with_text_analyzer(TextAnalyzer::with_default_rules(
            AnalysisConfig::default(),
        ))
    }

    fn text_message(body: &str) -> ParsedMessage {
        let mut m = ParsedMessage::new("http");
        m.set_content_type("text/plain");
        m.set_body(body.as_bytes().to_vec());
        m
    }

    #[tokio::test]
    async fn test_text_routes_to_text_analyzer() {
        let result = registry().analyze(&text_message("password=x")).await;
        assert!(result.has_hits());
    }

    #[tokio::test]
    async fn test_ml_raises_score() {
        let mut registry = registry();
        registry.set_predictor(Arc::new(ml::SimpleModel::new(&SimpleModelConfig::default())));

        let body = "confidential secret password internal only";
        let without_ml = AnalyzerRegistry::with_text_analyzer(TextAnalyzer::with_default_rules(
            AnalysisConfig::default(),
        ))
        .analyze(&text_message(body))
        .await;
        let with_ml = registry.analyze(&text_message(body)).await;
        assert!(with_ml.risk_score().value() > without_ml.risk_score().value());
        assert!(with_ml.risk_score().value() <= 1.0);
    }

    struct FixedOcr(&'static str);

    #[async_trait]
    impl OcrEngine for FixedOcr {
        async fn extract_text(&self, _image: &[u8]) -> Result<String, DlpError> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_image_routes_through_ocr_back_to_text() {
        let mut registry = registry();
        registry.set_ocr(Arc::new(FixedOcr("scanned id 11010519491231002X")));

        let mut image = ParsedMessage::new("http");
        image.set_content_type("image/png");
        image.set_body(vec![0x89, b'P', b'N', b'G']);

        let result = registry.analyze(&image).await;
        assert!(result.hits().iter().any(|h| h.hit_type() == "id_card"));
    }

    #[tokio::test]
    async fn test_image_without_ocr_is_metadata_only() {
        let mut image = ParsedMessage::new("http");
        image.set_content_type("image/png");
        image.set_body(vec![1, 2, 3]);
        let result = registry().analyze(&image).await;
        assert!(!result.has_hits());
    }

    struct FailingPredictor;

    impl RiskPredictor for FailingPredictor {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn predict(&self, _text: &str) -> Result<RiskScore, DlpError> {
            Err(DlpError::analyzer_error("model file missing"))
        }
    }

    #[tokio::test]
    async fn test_ml_failure_keeps_base_result() {
        let mut registry = registry();
        registry.set_predictor(Arc::new(FailingPredictor));
        let result = registry.analyze(&text_message("password=x")).await;
        assert!(result.has_hits());
    }
}
