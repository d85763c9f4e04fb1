// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Risk Value Objects
//!
//! This module provides the risk quantities shared by the analyzer, the
//! policy engine, and the audit log:
//!
//! - [`RiskScore`] - a score clamped to `[0.0, 1.0]`. Construction cannot
//!   produce an out-of-range value; arithmetic helpers re-clamp.
//! - [`RiskLevel`] - the four-step severity ladder with the fixed thresholds
//!   the policy engine's override reducer keys on (≥0.8 Critical, ≥0.6 High,
//!   ≥0.4 Medium, else Low).
//!
//! ## Invariants
//!
//! - `RiskScore::value()` is always within `[0, 1]`, including through
//!   `saturating_add` and `raise_to`.
//! - `RiskLevel::from_score` is monotone: a higher score never maps to a
//!   lower level.
//! - Levels are totally ordered (`Low < Medium < High < Critical`) so the
//!   policy override reducer can compare them directly.

use serde::{Deserialize, Serialize};

/// A risk score clamped to `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskScore(f64);

impl RiskScore {
    pub const ZERO: RiskScore = RiskScore(0.0);
    pub const MAX: RiskScore = RiskScore(1.0);

    /// Creates a score, clamping the input into `[0, 1]`.
    ///
    /// NaN is treated as zero so that a misbehaving predictor can never
    /// poison downstream comparisons.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            RiskScore(0.0)
        } else {
            RiskScore(value.clamp(0.0, 1.0))
        }
    }

    /// The clamped numeric value.
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Adds `delta` and re-clamps. Used for the weighted ML contribution.
    pub fn saturating_add(&self, delta: f64) -> Self {
        RiskScore::new(self.0 + delta)
    }

    /// Returns the larger of the two scores. ML adjustment may raise, never
    /// lower, so the policy engine combines with `raise_to`.
    pub fn raise_to(&self, other: RiskScore) -> Self {
        if other.0 > self.0 {
            other
        } else {
            *self
        }
    }

    /// The level this score maps to.
    pub fn level(&self) -> RiskLevel {
        RiskLevel::from_score(*self)
    }
}

impl Default for RiskScore {
    fn default() -> Self {
        RiskScore::ZERO
    }
}

impl std::fmt::Display for RiskScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// Severity ladder derived from a [`RiskScore`].
///
/// Serializes to the lowercase wire spelling used in audit records and rule
/// condition values ("low", "medium", "high", "critical").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Threshold mapping: ≥0.8 Critical, ≥0.6 High, ≥0.4 Medium, else Low.
    pub fn from_score(score: RiskScore) -> Self {
        let v = score.value();
        if v >= 0.8 {
            RiskLevel::Critical
        } else if v >= 0.6 {
            RiskLevel::High
        } else if v >= 0.4 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Stable wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    /// Parses the wire spelling, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_score_clamping() {
        assert_eq!(RiskScore::new(-0.5).value(), 0.0);
        assert_eq!(RiskScore::new(1.7).value(), 1.0);
        assert_eq!(RiskScore::new(0.42).value(), 0.42);
        assert_eq!(RiskScore::new(f64::NAN).value(), 0.0);
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(RiskScore::new(0.85).level(), RiskLevel::Critical);
        assert_eq!(RiskScore::new(0.8).level(), RiskLevel::Critical);
        assert_eq!(RiskScore::new(0.79).level(), RiskLevel::High);
        assert_eq!(RiskScore::new(0.6).level(), RiskLevel::High);
        assert_eq!(RiskScore::new(0.5).level(), RiskLevel::Medium);
        assert_eq!(RiskScore::new(0.4).level(), RiskLevel::Medium);
        assert_eq!(RiskScore::new(0.1).level(), RiskLevel::Low);
    }

    #[test]
    fn test_level_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn test_raise_to_never_lowers() {
        let base = RiskScore::new(0.7);
        assert_eq!(base.raise_to(RiskScore::new(0.3)).value(), 0.7);
        assert_eq!(base.raise_to(RiskScore::new(0.9)).value(), 0.9);
    }

    #[test]
    fn test_level_wire_spelling() {
        assert_eq!(RiskLevel::Critical.as_str(), "critical");
        assert_eq!(RiskLevel::parse("HIGH"), Some(RiskLevel::High));
        assert_eq!(RiskLevel::parse("severe"), None);
    }

    proptest! {
        #[test]
        fn prop_score_always_in_range(v in proptest::num::f64::ANY) {
            let s = RiskScore::new(v);
            prop_assert!((0.0..=1.0).contains(&s.value()));
        }

        #[test]
        fn prop_saturating_add_in_range(a in 0.0f64..=1.0, d in -2.0f64..=2.0) {
            let s = RiskScore::new(a).saturating_add(d);
            prop_assert!((0.0..=1.0).contains(&s.value()));
        }

        #[test]
        fn prop_level_monotone(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(RiskScore::new(lo).level() <= RiskScore::new(hi).level());
        }
    }
}
