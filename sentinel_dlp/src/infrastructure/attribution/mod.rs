// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Process Attribution
//!
//! Maintains the live socket → PID maps from the OS connection tables and
//! resolves PIDs to [`ProcessIdentity`] through a TTL cache.
//!
//! ## Refresh discipline
//!
//! A ticker task re-snapshots the connection tables at the configured
//! interval (default 1s). A resolution miss triggers one on-demand refresh
//! before giving up - short-lived sockets often appear in the table a beat
//! after their first packet.
//!
//! ## Failure semantics
//!
//! Attribution failure never drops a packet: `resolve` returns `None`, the
//! miss counter increments, and the record proceeds with a null identity.

pub mod process_cache;
pub mod socket_table;

use self::process_cache::{ProcessCache, ProcessInfoProvider, SysinfoProvider};
use self::socket_table::{NetstatProvider, SocketTableProvider, SocketTableSnapshot};
use async_trait::async_trait;
use parking_lot::RwLock;
use sentinel_dlp_bootstrap::shutdown::CancellationToken;
use sentinel_dlp_domain::entities::packet_record::TransportProtocol;
use sentinel_dlp_domain::entities::process_identity::ProcessIdentity;
use sentinel_dlp_domain::error::DlpError;
use sentinel_dlp_domain::services::process_resolver::ProcessResolver;
use sentinel_dlp_domain::value_objects::flow_key::FlowKey;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Attribution stage settings.
#[derive(Debug, Clone)]
pub struct AttributionSettings {
    pub refresh_interval: Duration,
    pub process_ttl: Duration,
}

/// Flow → process attribution service.
pub struct AttributionService {
    table_provider: Arc<dyn SocketTableProvider>,
    table: Arc<RwLock<SocketTableSnapshot>>,
    cache: Arc<ProcessCache>,
    settings: AttributionSettings,
    misses: AtomicU64,
    ticker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl AttributionService {
    pub fn new(
        table_provider: Arc<dyn SocketTableProvider>,
        process_provider: Box<dyn ProcessInfoProvider>,
        settings: AttributionSettings,
    ) -> Self {
        let cache = Arc::new(ProcessCache::new(process_provider, settings.process_ttl));
        Self {
            table_provider,
            table: Arc::new(RwLock::new(SocketTableSnapshot::default())),
            cache,
            settings,
            misses: AtomicU64::new(0),
            ticker: parking_lot::Mutex::new(None),
        }
    }

    /// Builds the service against the live OS providers.
    pub fn with_os_providers(settings: AttributionSettings) -> Self {
        Self::new(
            Arc::new(NetstatProvider::new()),
            Box::new(SysinfoProvider::new()),
            settings,
        )
    }

    /// Starts the periodic refresh ticker. Runs until the token cancels.
    pub fn start(&self, token: CancellationToken) {
        let provider = Arc::clone(&self.table_provider);
        let table = Arc::clone(&self.table);
        let cache = Arc::clone(&self.cache);
        let interval = self.settings.refresh_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("attribution ticker stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        match Self::snapshot_blocking(Arc::clone(&provider)).await {
                            Ok(snapshot) => {
                                *table.write() = snapshot;
                            }
                            Err(e) => {
                                warn!(error = %e, "socket table refresh failed");
                            }
                        }
                        cache.evict_expired();
                    }
                }
            }
        });
        *self.ticker.lock() = Some(handle);
    }

    /// Stops the refresh ticker.
    pub async fn stop(&self) {
        let handle = self.ticker.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }

    async fn snapshot_blocking(
        provider: Arc<dyn SocketTableProvider>,
    ) -> Result<SocketTableSnapshot, DlpError> {
        // Connection-table reads are syscall-heavy; keep them off the
        // async workers.
        tokio::task::spawn_blocking(move || provider.snapshot())
            .await
            .map_err(|e| DlpError::internal_error(format!("snapshot task: {}", e)))?
    }

    fn lookup_pid(&self, key: &FlowKey) -> Option<u32> {
        let table = self.table.read();
        match key.protocol {
            TransportProtocol::Tcp => table.lookup_tcp(
                (key.source.ip(), key.source.port()),
                (key.destination.ip(), key.destination.port()),
            ),
            TransportProtocol::Udp => table.lookup_udp((key.source.ip(), key.source.port())),
            TransportProtocol::Icmp => None,
        }
    }
}

#[async_trait]
impl ProcessResolver for AttributionService {
    async fn resolve(&self, key: &FlowKey) -> Option<ProcessIdentity> {
        let pid = match self.lookup_pid(key) {
            Some(pid) => Some(pid),
            None => {
                // On-demand refresh covers sockets younger than the ticker.
                if self.refresh().await.is_ok() {
                    self.lookup_pid(key)
                } else {
                    None
                }
            }
        };

        let identity = match pid {
            Some(pid) => {
                let cache = Arc::clone(&self.cache);
                tokio::task::spawn_blocking(move || cache.resolve(pid))
                    .await
                    .ok()
                    .flatten()
            }
            None => None,
        };

        if identity.is_none() {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        identity
    }

    async fn refresh(&self) -> Result<(), DlpError> {
        let snapshot = Self::snapshot_blocking(Arc::clone(&self.table_provider)).await?;
        *self.table.write() = snapshot;
        Ok(())
    }

    fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::IpAddr;

    struct CannedTables {
        snapshot: SocketTableSnapshot,
    }

    impl SocketTableProvider for CannedTables {
        fn snapshot(&self) -> Result<SocketTableSnapshot, DlpError> {
            Ok(self.snapshot.clone())
        }
    }

    struct CannedProcesses {
        processes: HashMap<u32, ProcessIdentity>,
    }

    impl ProcessInfoProvider for CannedProcesses {
        fn lookup(&self, pid: u32) -> Option<ProcessIdentity> {
            self.processes.get(&pid).cloned()
        }
    }

    fn service() -> AttributionService {
        let mut snapshot = SocketTableSnapshot::default();
        let local: IpAddr = "192.168.1.100".parse().unwrap();
        let remote: IpAddr = "8.8.8.8".parse().unwrap();
        snapshot.tcp.insert((local, 54321, remote, 443), 4242);

        let mut processes = HashMap::new();
        processes.insert(
            4242,
            ProcessIdentity::new(4242, "curl", "/usr/bin/curl", "curl https://x", 1, "alice"),
        );

        AttributionService::new(
            Arc::new(CannedTables { snapshot }),
            Box::new(CannedProcesses { processes }),
            AttributionSettings {
                refresh_interval: Duration::from_secs(1),
                process_ttl: Duration::from_secs(60),
            },
        )
    }

    fn key(sport: u16) -> FlowKey {
        FlowKey::new(
            TransportProtocol::Tcp,
            format!("192.168.1.100:{}", sport).parse().unwrap(),
            "8.8.8.8:443".parse().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_known_flow_resolves() {
        let svc = service();
        svc.refresh().await.unwrap();
        let identity = svc.resolve(&key(54321)).await.unwrap();
        assert_eq!(identity.pid(), 4242);
        assert_eq!(identity.name(), "curl");
        assert_eq!(svc.miss_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_flow_counts_miss_and_returns_none() {
        let svc = service();
        svc.refresh().await.unwrap();
        assert!(svc.resolve(&key(60000)).await.is_none());
        assert_eq!(svc.miss_count(), 1);
    }

    #[tokio::test]
    async fn test_miss_triggers_on_demand_refresh() {
        // Table starts empty; resolve must hit the provider and find the
        // connection on its on-demand refresh.
        let svc = service();
        let identity = svc.resolve(&key(54321)).await;
        assert!(identity.is_some());
    }
}
