// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Masked Value
//!
//! The audit-safe rendering of a matched sensitive value. Audit records and
//! serialized analysis output only ever carry the masked form; the raw match
//! stays in memory for policy evaluation and is wiped on drop (see
//! `SensitiveHit`).
//!
//! ## Mask Rule
//!
//! - values of 4 characters or fewer are fully masked (`"1234"` → `"****"`)
//! - longer values keep the first two and last two characters, the middle is
//!   replaced by `'*'` (`"13812345678"` → `"13*******78"`)
//!
//! The rule operates on characters, not bytes, so multi-byte text masks
//! without splitting code points.

use serde::{Deserialize, Serialize};

/// An irreversibly masked copy of a sensitive value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaskedValue(String);

impl MaskedValue {
    /// Applies the mask rule to `raw`.
    pub fn mask(raw: &str) -> Self {
        let chars: Vec<char> = raw.chars().collect();
        let n = chars.len();
        if n <= 4 {
            return MaskedValue("*".repeat(n));
        }
        let mut out = String::with_capacity(n);
        out.push(chars[0]);
        out.push(chars[1]);
        out.extend(std::iter::repeat('*').take(n - 4));
        out.push(chars[n - 2]);
        out.push(chars[n - 1]);
        MaskedValue(out)
    }

    /// The masked string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MaskedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_short_values_fully_masked() {
        assert_eq!(MaskedValue::mask("").as_str(), "");
        assert_eq!(MaskedValue::mask("a").as_str(), "*");
        assert_eq!(MaskedValue::mask("abcd").as_str(), "****");
    }

    #[test]
    fn test_long_values_keep_edges() {
        assert_eq!(MaskedValue::mask("s3cr3t").as_str(), "s3**3t");
        assert_eq!(MaskedValue::mask("13812345678").as_str(), "13*******78");
        assert_eq!(MaskedValue::mask("alice@example.com").as_str(), "al*************om");
    }

    #[test]
    fn test_multibyte_safe() {
        // 5 chars, keeps first two and last two code points
        assert_eq!(MaskedValue::mask("日本語です").as_str(), "日本*です");
    }

    proptest! {
        #[test]
        fn prop_mask_preserves_char_length(s in ".{0,64}") {
            let masked = MaskedValue::mask(&s);
            prop_assert_eq!(masked.as_str().chars().count(), s.chars().count());
        }

        #[test]
        fn prop_mask_hides_middle(s in "[a-z0-9]{5,64}") {
            let masked = MaskedValue::mask(&s);
            let chars: Vec<char> = masked.as_str().chars().collect();
            for c in &chars[2..chars.len() - 2] {
                prop_assert_eq!(*c, '*');
            }
        }
    }
}
