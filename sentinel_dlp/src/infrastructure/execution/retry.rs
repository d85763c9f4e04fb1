// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Execution Retry Policy
//!
//! Bounded retry with exponential backoff for action executors. Only errors
//! whose [`RetryKind`] is in the configured retryable set go through the
//! policy; everything else is terminal on first failure.
//!
//! Defaults: 3 attempts, backoff starting at 1s and doubling, capped at 30s.

use crate::infrastructure::config::ExecutorConfig;
use sentinel_dlp_domain::error::{DlpError, RetryKind};
use std::collections::HashSet;
use std::time::Duration;

const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Retry policy derived from the executor configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    retryable: HashSet<RetryKind>,
}

impl RetryPolicy {
    pub fn from_config(config: &ExecutorConfig) -> Self {
        let retryable = config
            .retryable_kinds
            .iter()
            .filter_map(|kind| RetryKind::parse(kind))
            .collect();
        Self {
            max_attempts: config.max_retries.max(1),
            initial_backoff: Duration::from_secs(config.retry_interval_secs.max(1)),
            retryable,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether `error` qualifies for another attempt.
    pub fn is_retryable(&self, error: &DlpError) -> bool {
        error
            .retry_kind()
            .is_some_and(|kind| self.retryable.contains(&kind))
    }

    /// Backoff before the given attempt (attempt 2 waits the initial
    /// backoff, attempt 3 twice that, capped at 30s).
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(2).min(16);
        let backoff = self.initial_backoff.saturating_mul(1u32 << exponent);
        backoff.min(BACKOFF_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::from_config(&ExecutorConfig::default())
    }

    #[test]
    fn test_retryable_kinds_from_config() {
        let p = policy();
        assert!(p.is_retryable(&DlpError::executor_retryable(RetryKind::Timeout, "t")));
        assert!(p.is_retryable(&DlpError::executor_retryable(RetryKind::ConnectionError, "c")));
        assert!(!p.is_retryable(&DlpError::executor_terminal("fatal")));
        assert!(!p.is_retryable(&DlpError::io_error("disk")));
    }

    #[test]
    fn test_configured_subset() {
        let p = RetryPolicy::from_config(&ExecutorConfig {
            retryable_kinds: vec!["timeout".to_string()],
            ..ExecutorConfig::default()
        });
        assert!(p.is_retryable(&DlpError::executor_retryable(RetryKind::Timeout, "t")));
        assert!(!p.is_retryable(&DlpError::executor_retryable(RetryKind::ConnectionError, "c")));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.backoff_before(2), Duration::from_secs(1));
        assert_eq!(p.backoff_before(3), Duration::from_secs(2));
        assert_eq!(p.backoff_before(4), Duration::from_secs(4));
        assert_eq!(p.backoff_before(10), Duration::from_secs(30));
        assert_eq!(p.backoff_before(40), Duration::from_secs(30));
    }

    #[test]
    fn test_at_least_one_attempt() {
        let p = RetryPolicy::from_config(&ExecutorConfig {
            max_retries: 0,
            ..ExecutorConfig::default()
        });
        assert_eq!(p.max_attempts(), 1);
    }
}
