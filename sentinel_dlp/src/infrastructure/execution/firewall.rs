// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Firewall Rule Table
//!
//! Single-owner worker holding the installed drop and redirect rules. All
//! mutations go through an mpsc command channel with oneshot replies, so
//! the table has exactly one writing owner and callers never contend on a
//! lock while a platform call is in flight.
//!
//! The platform application of a rule (netfilter verdict, WinDivert drop)
//! is behind [`RuleApplier`]; the default in-process applier keeps the
//! table authoritative without touching the host firewall, which is the
//! safe default for a monitor-mode agent. TTL'd rules expire on a sweep
//! tick.

use parking_lot::RwLock;
use sentinel_dlp_bootstrap::shutdown::CancellationToken;
use sentinel_dlp_domain::entities::execution_result::{FirewallRule, RedirectRule};
use sentinel_dlp_domain::error::DlpError;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Applies rules to the platform packet path.
pub trait RuleApplier: Send + Sync {
    fn apply_drop(&self, rule: &FirewallRule) -> Result<(), DlpError>;
    fn remove_drop(&self, rule_id: &str) -> Result<(), DlpError>;
    fn apply_redirect(&self, rule: &RedirectRule) -> Result<(), DlpError>;
    fn remove_redirect(&self, rule_id: &str) -> Result<(), DlpError>;
}

/// In-process applier: the table itself is the enforcement point (the
/// capture path consults it); no host firewall mutation.
pub struct InProcessApplier;

impl RuleApplier for InProcessApplier {
    fn apply_drop(&self, rule: &FirewallRule) -> Result<(), DlpError> {
        debug!(rule = %rule.rule_id, dest = %rule.destination, "drop rule active");
        Ok(())
    }

    fn remove_drop(&self, rule_id: &str) -> Result<(), DlpError> {
        debug!(rule = %rule_id, "drop rule removed");
        Ok(())
    }

    fn apply_redirect(&self, rule: &RedirectRule) -> Result<(), DlpError> {
        debug!(rule = %rule.rule_id, to = %rule.safe_destination, "redirect rule active");
        Ok(())
    }

    fn remove_redirect(&self, rule_id: &str) -> Result<(), DlpError> {
        debug!(rule = %rule_id, "redirect rule removed");
        Ok(())
    }
}

enum Command {
    InstallDrop(FirewallRule, oneshot::Sender<Result<(), DlpError>>),
    RemoveDrop(String, oneshot::Sender<Result<(), DlpError>>),
    InstallRedirect(RedirectRule, oneshot::Sender<Result<(), DlpError>>),
}

struct TimedRule<T> {
    rule: T,
    expires_at: Option<Instant>,
}

/// Shared read view of the installed rules (consulted by the capture path
/// and the tests).
#[derive(Default)]
pub struct RuleView {
    drops: RwLock<HashMap<String, FirewallRule>>,
    redirects: RwLock<HashMap<String, RedirectRule>>,
}

impl RuleView {
    /// Whether a destination currently has a drop rule installed.
    pub fn is_dropped(&self, destination: &SocketAddr) -> bool {
        self.drops
            .read()
            .values()
            .any(|rule| rule.destination == *destination)
    }

    pub fn drop_rule(&self, rule_id: &str) -> Option<FirewallRule> {
        self.drops.read().get(rule_id).cloned()
    }

    pub fn redirect_for(&self, destination: &SocketAddr) -> Option<RedirectRule> {
        self.redirects
            .read()
            .values()
            .find(|rule| rule.original_destination == *destination)
            .cloned()
    }

    pub fn counts(&self) -> (usize, usize) {
        (self.drops.read().len(), self.redirects.read().len())
    }
}

/// Handle to the firewall worker.
#[derive(Clone)]
pub struct FirewallHandle {
    commands: mpsc::Sender<Command>,
    view: Arc<RuleView>,
}

impl FirewallHandle {
    pub fn view(&self) -> Arc<RuleView> {
        Arc::clone(&self.view)
    }

    pub async fn install_drop(&self, rule: FirewallRule) -> Result<(), DlpError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::InstallDrop(rule, tx))
            .await
            .map_err(|_| DlpError::internal_error("firewall worker stopped"))?;
        rx.await
            .map_err(|_| DlpError::internal_error("firewall worker dropped reply"))?
    }

    pub async fn remove_drop(&self, rule_id: &str) -> Result<(), DlpError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::RemoveDrop(rule_id.to_string(), tx))
            .await
            .map_err(|_| DlpError::internal_error("firewall worker stopped"))?;
        rx.await
            .map_err(|_| DlpError::internal_error("firewall worker dropped reply"))?
    }

    pub async fn install_redirect(&self, rule: RedirectRule) -> Result<(), DlpError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::InstallRedirect(rule, tx))
            .await
            .map_err(|_| DlpError::internal_error("firewall worker stopped"))?;
        rx.await
            .map_err(|_| DlpError::internal_error("firewall worker dropped reply"))?
    }
}

/// Spawns the single-owner firewall worker; returns its handle.
pub fn spawn_firewall_worker(
    applier: Arc<dyn RuleApplier>,
    token: CancellationToken,
) -> FirewallHandle {
    let (tx, mut rx) = mpsc::channel::<Command>(64);
    let view = Arc::new(RuleView::default());
    let worker_view = Arc::clone(&view);

    tokio::spawn(async move {
        let mut drops: HashMap<String, TimedRule<FirewallRule>> = HashMap::new();
        let mut sweep = tokio::time::interval(Duration::from_secs(5));
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!(drops = drops.len(), "firewall worker stopping");
                    break;
                }
                _ = sweep.tick() => {
                    let now = Instant::now();
                    let expired: Vec<String> = drops
                        .iter()
                        .filter(|(_, timed)| timed.expires_at.is_some_and(|at| at <= now))
                        .map(|(id, _)| id.clone())
                        .collect();
                    for id in expired {
                        if let Err(e) = applier.remove_drop(&id) {
                            warn!(rule = %id, error = %e, "expired drop removal failed");
                        }
                        drops.remove(&id);
                        worker_view.drops.write().remove(&id);
                        debug!(rule = %id, "drop rule expired");
                    }
                }
                command = rx.recv() => {
                    let Some(command) = command else { break };
                    match command {
                        Command::InstallDrop(rule, reply) => {
                            let result = applier.apply_drop(&rule);
                            if result.is_ok() {
                                let expires_at = rule
                                    .ttl_seconds
                                    .map(|secs| Instant::now() + Duration::from_secs(secs));
                                worker_view.drops.write().insert(rule.rule_id.clone(), rule.clone());
                                drops.insert(rule.rule_id.clone(), TimedRule { rule, expires_at });
                            }
                            let _ = reply.send(result);
                        }
                        Command::RemoveDrop(rule_id, reply) => {
                            let result = applier.remove_drop(&rule_id);
                            if result.is_ok() {
                                drops.remove(&rule_id);
                                worker_view.drops.write().remove(&rule_id);
                            }
                            let _ = reply.send(result);
                        }
                        Command::InstallRedirect(rule, reply) => {
                            let result = applier.apply_redirect(&rule);
                            if result.is_ok() {
                                worker_view.redirects.write().insert(rule.rule_id.clone(), rule);
                            }
                            let _ = reply.send(result);
                        }
                    }
                }
            }
        }
    });

    FirewallHandle { commands: tx, view }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drop_rule(id: &str, ttl: Option<u64>) -> FirewallRule {
        FirewallRule {
            rule_id: id.to_string(),
            source: "192.168.1.100:54321".parse().unwrap(),
            destination: "8.8.8.8:443".parse().unwrap(),
            ttl_seconds: ttl,
        }
    }

    #[tokio::test]
    async fn test_install_and_remove_drop() {
        let handle = spawn_firewall_worker(Arc::new(InProcessApplier), CancellationToken::new());
        handle.install_drop(drop_rule("fw-1", None)).await.unwrap();

        let view = handle.view();
        assert!(view.is_dropped(&"8.8.8.8:443".parse().unwrap()));
        assert!(!view.is_dropped(&"1.1.1.1:443".parse().unwrap()));

        handle.remove_drop("fw-1").await.unwrap();
        assert!(!view.is_dropped(&"8.8.8.8:443".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_redirect_lookup() {
        let handle = spawn_firewall_worker(Arc::new(InProcessApplier), CancellationToken::new());
        handle
            .install_redirect(RedirectRule {
                rule_id: "rd-1".to_string(),
                original_destination: "8.8.8.8:80".parse().unwrap(),
                safe_destination: "10.10.10.10:8080".parse().unwrap(),
                protocol: "http".to_string(),
            })
            .await
            .unwrap();

        let view = handle.view();
        let redirect = view.redirect_for(&"8.8.8.8:80".parse().unwrap()).unwrap();
        assert_eq!(redirect.safe_destination, "10.10.10.10:8080".parse().unwrap());
    }

    struct FailingApplier;

    impl RuleApplier for FailingApplier {
        fn apply_drop(&self, _: &FirewallRule) -> Result<(), DlpError> {
            Err(DlpError::executor_retryable(
                sentinel_dlp_domain::error::RetryKind::TemporaryFailure,
                "table busy",
            ))
        }
        fn remove_drop(&self, _: &str) -> Result<(), DlpError> {
            Ok(())
        }
        fn apply_redirect(&self, _: &RedirectRule) -> Result<(), DlpError> {
            Ok(())
        }
        fn remove_redirect(&self, _: &str) -> Result<(), DlpError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_apply_leaves_no_rule() {
        let handle = spawn_firewall_worker(Arc::new(FailingApplier), CancellationToken::new());
        let result = handle.install_drop(drop_rule("fw-err", None)).await;
        assert!(result.is_err());
        assert_eq!(handle.view().counts(), (0, 0));
    }
}
