// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Decision Identifier
//!
//! Type-safe identity for a [`crate::entities::decision::PolicyDecision`].
//! Every decision emitted by the policy engine carries exactly one id; the
//! audit record for the same packet reuses it, which is what makes the
//! "decisions are emitted at most once" property checkable after the fact.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// UUID-backed decision identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionId(Uuid);

impl DecisionId {
    /// Generates a fresh id.
    pub fn new() -> Self {
        DecisionId(Uuid::new_v4())
    }

    /// Wraps an existing UUID (used when rehydrating persisted records).
    pub fn from_uuid(id: Uuid) -> Self {
        DecisionId(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DecisionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DecisionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(DecisionId::new(), DecisionId::new());
    }

    #[test]
    fn test_serde_transparent() {
        let id = DecisionId::new();
        let json = serde_json::to_string(&id).unwrap();
        // Serializes as a bare string, not an object
        assert!(json.starts_with('"'));
        let back: DecisionId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
