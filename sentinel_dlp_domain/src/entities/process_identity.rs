// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Process Identity Entity
//!
//! Identity of the OS process that produced a captured packet. Created
//! lazily by the attribution stage on first sighting of a 5-tuple and cached
//! until the socket closes or the cache TTL expires.
//!
//! When attribution fails entirely, downstream stages use
//! [`ProcessIdentity::unknown`] so the audit record still carries process
//! fields (all set to "unknown" / zero) rather than omitting them.

use serde::{Deserialize, Serialize};

/// Identity of a packet-producing process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessIdentity {
    pid: u32,
    /// Executable basename, e.g. `chrome`.
    name: String,
    /// Full executable path when resolvable.
    path: String,
    command_line: String,
    parent_pid: u32,
    user_name: String,
}

impl ProcessIdentity {
    pub fn new(
        pid: u32,
        name: impl Into<String>,
        path: impl Into<String>,
        command_line: impl Into<String>,
        parent_pid: u32,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            pid,
            name: name.into(),
            path: path.into(),
            command_line: command_line.into(),
            parent_pid,
            user_name: user_name.into(),
        }
    }

    /// Placeholder identity used when attribution failed.
    pub fn unknown() -> Self {
        Self {
            pid: 0,
            name: "unknown".to_string(),
            path: "unknown".to_string(),
            command_line: "unknown".to_string(),
            parent_pid: 0,
            user_name: "unknown".to_string(),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn parent_pid(&self) -> u32 {
        self.parent_pid
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn is_unknown(&self) -> bool {
        self.pid == 0 && self.name == "unknown"
    }
}

impl std::fmt::Display for ProcessIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (pid {})", self.name, self.pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_placeholder() {
        let p = ProcessIdentity::unknown();
        assert!(p.is_unknown());
        assert_eq!(p.name(), "unknown");
        assert_eq!(p.pid(), 0);
    }

    #[test]
    fn test_real_identity_is_not_unknown() {
        let p = ProcessIdentity::new(
            4242,
            "curl",
            "/usr/bin/curl",
            "curl https://example.com",
            1,
            "alice",
        );
        assert!(!p.is_unknown());
        assert_eq!(p.parent_pid(), 1);
        assert_eq!(p.to_string(), "curl (pid 4242)");
    }
}
