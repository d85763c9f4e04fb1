// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Content Analyzer Ports
//!
//! The analyzer registry dispatches a parsed message to analyzers by
//! content-type prefix. The default member is the text analyzer; image
//! content may route through an [`OcrEngine`] that yields text which flows
//! back into the text analyzer; an optional [`RiskPredictor`] contributes an
//! additional ML risk signal weighted at 30%.
//!
//! OCR, ML inference, and stream decryption are peripheral enrichment paths:
//! only their interfaces are contracted here.

use crate::entities::analysis_result::AnalysisResult;
use crate::entities::parsed_message::ParsedMessage;
use crate::error::DlpError;
use crate::value_objects::flow_key::FlowKey;
use crate::value_objects::risk::RiskScore;
use async_trait::async_trait;

/// A content analyzer plugin.
pub trait ContentAnalyzer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Content-type prefixes this analyzer accepts (e.g. `"text/"`,
    /// `"application/json"`). The registry picks the analyzer with the
    /// longest matching prefix.
    fn content_type_prefixes(&self) -> &[&'static str];

    /// Analyzes the message. Analyzer faults produce `Err`; an error result
    /// is logged, attached to the record, and the pipeline continues with an
    /// empty analysis.
    fn analyze(&self, message: &ParsedMessage) -> Result<AnalysisResult, DlpError>;
}

/// Optional ML risk signal. Inference only; training is out of scope.
pub trait RiskPredictor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Predicts a risk score for the given text.
    fn predict(&self, text: &str) -> Result<RiskScore, DlpError>;
}

/// Optional OCR helper for image content.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Extracts text from an encoded image.
    async fn extract_text(&self, image: &[u8]) -> Result<String, DlpError>;
}

/// Optional decryption helper for encrypted streams.
///
/// When absent (the default), encrypted flows are metadata-only.
pub trait DecryptionHelper: Send + Sync {
    /// Attempts to decrypt a flow's payload. `Ok(None)` means the helper has
    /// no key material for this flow.
    fn decrypt(&self, key: &FlowKey, payload: &[u8]) -> Result<Option<Vec<u8>>, DlpError>;
}
