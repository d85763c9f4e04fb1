// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Process Identity Cache
//!
//! PID → [`ProcessIdentity`] resolution with a TTL cache (default 60s).
//! Identities are created lazily on first sighting and refreshed when the
//! entry expires; a PID that has exited resolves to `None` and the stale
//! entry is evicted.
//!
//! The live provider wraps `sysinfo`; tests substitute a canned provider.

use parking_lot::{Mutex, RwLock};
use sentinel_dlp_domain::entities::process_identity::ProcessIdentity;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Source of process details by PID.
pub trait ProcessInfoProvider: Send + Sync {
    fn lookup(&self, pid: u32) -> Option<ProcessIdentity>;
}

/// `sysinfo`-backed provider reading the live process table.
pub struct SysinfoProvider {
    system: Mutex<sysinfo::System>,
    users: sysinfo::Users,
}

impl SysinfoProvider {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(sysinfo::System::new()),
            users: sysinfo::Users::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessInfoProvider for SysinfoProvider {
    fn lookup(&self, pid: u32) -> Option<ProcessIdentity> {
        let mut system = self.system.lock();
        let sys_pid = sysinfo::Pid::from_u32(pid);
        system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[sys_pid]), true);
        let process = system.process(sys_pid)?;

        let name = process.name().to_string_lossy().into_owned();
        let path = process
            .exe()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let command_line = process
            .cmd()
            .iter()
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        let parent_pid = process.parent().map(|p| p.as_u32()).unwrap_or(0);
        let user_name = process
            .user_id()
            .and_then(|uid| self.users.get_user_by_id(uid))
            .map(|user| user.name().to_string())
            .unwrap_or_default();

        Some(ProcessIdentity::new(
            pid,
            name,
            path,
            command_line,
            parent_pid,
            user_name,
        ))
    }
}

struct CacheEntry {
    identity: ProcessIdentity,
    inserted_at: Instant,
}

/// TTL cache in front of a [`ProcessInfoProvider`].
pub struct ProcessCache {
    provider: Box<dyn ProcessInfoProvider>,
    entries: RwLock<HashMap<u32, CacheEntry>>,
    ttl: Duration,
}

impl ProcessCache {
    pub fn new(provider: Box<dyn ProcessInfoProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Resolves a PID, consulting the cache first.
    pub fn resolve(&self, pid: u32) -> Option<ProcessIdentity> {
        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(&pid) {
                if entry.inserted_at.elapsed() < self.ttl {
                    return Some(entry.identity.clone());
                }
            }
        }

        match self.provider.lookup(pid) {
            Some(identity) => {
                self.entries.write().insert(
                    pid,
                    CacheEntry {
                        identity: identity.clone(),
                        inserted_at: Instant::now(),
                    },
                );
                Some(identity)
            }
            None => {
                // The process exited: drop whatever we had.
                self.entries.write().remove(&pid);
                None
            }
        }
    }

    /// Evicts entries older than the TTL. Called from the refresh ticker.
    pub fn evict_expired(&self) {
        let ttl = self.ttl;
        self.entries
            .write()
            .retain(|_, entry| entry.inserted_at.elapsed() < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
