// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Notification Service
//!
//! Bounded asynchronous fan-out of notifications to configured channels
//! (email, sms, webhook, slack, teams - each behind the
//! [`NotificationChannel`] port). The action path only ever enqueues: a
//! full queue drops the notification and logs, never blocking execution.
//!
//! The core ships the [`LogChannel`] (structured tracing emission, picked
//! up by log shipping); transport-specific channels register through the
//! same port. Recipients are required configuration - a channel enabled
//! without recipients fails Start during config validation.

use sentinel_dlp_bootstrap::shutdown::CancellationToken;
use sentinel_dlp_domain::error::DlpError;
use sentinel_dlp_domain::services::notification::{Notification, NotificationChannel};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Channel that emits notifications as structured log events.
pub struct LogChannel;

#[async_trait::async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> Result<(), DlpError> {
        info!(
            target: "sentinel_dlp::notifications",
            id = %notification.id,
            severity = %notification.severity,
            title = %notification.title,
            message = %notification.message,
            "notification"
        );
        Ok(())
    }
}

/// Delivery counters for the metrics service.
#[derive(Debug, Default)]
pub struct NotificationCounters {
    pub enqueued: AtomicU64,
    pub delivered: AtomicU64,
    pub dropped_queue_full: AtomicU64,
    pub delivery_failures: AtomicU64,
}

/// Bounded async notification fan-out.
#[derive(Clone)]
pub struct NotificationService {
    queue: mpsc::Sender<Notification>,
    counters: Arc<NotificationCounters>,
}

impl NotificationService {
    /// Spawns the dispatcher over the given channels.
    pub fn spawn(
        channels: Vec<Arc<dyn NotificationChannel>>,
        queue_capacity: usize,
        token: CancellationToken,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<Notification>(queue_capacity.max(1));
        let counters = Arc::new(NotificationCounters::default());
        let worker_counters = Arc::clone(&counters);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        // Drain what is already queued, then exit.
                        while let Ok(notification) = rx.try_recv() {
                            Self::deliver(&channels, &worker_counters, notification).await;
                        }
                        info!("notification dispatcher stopping");
                        break;
                    }
                    notification = rx.recv() => {
                        let Some(notification) = notification else { break };
                        Self::deliver(&channels, &worker_counters, notification).await;
                    }
                }
            }
        });

        Self {
            queue: tx,
            counters,
        }
    }

    async fn deliver(
        channels: &[Arc<dyn NotificationChannel>],
        counters: &NotificationCounters,
        notification: Notification,
    ) {
        for channel in channels {
            match channel.send(&notification).await {
                Ok(()) => {
                    counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    counters.delivery_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(channel = channel.name(), error = %e, "notification delivery failed");
                }
            }
        }
    }

    /// Enqueues without blocking; a full queue drops and logs.
    pub fn notify(&self, notification: Notification) {
        match self.queue.try_send(notification) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(n)) => {
                self.counters.dropped_queue_full.fetch_add(1, Ordering::Relaxed);
                warn!(title = %n.title, "notification queue full, dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("notification dispatcher gone, notification dropped");
            }
        }
    }

    pub fn counters(&self) -> Arc<NotificationCounters> {
        Arc::clone(&self.counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use sentinel_dlp_domain::value_objects::risk::RiskLevel;

    struct RecordingChannel {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl NotificationChannel for RecordingChannel {
        fn name(&self) -> &'static str {
            "recording"
        }
        async fn send(&self, notification: &Notification) -> Result<(), DlpError> {
            self.seen.lock().push(notification.title.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fan_out_delivers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let service = NotificationService::spawn(
            vec![Arc::new(RecordingChannel { seen: Arc::clone(&seen) })],
            16,
            CancellationToken::new(),
        );

        service.notify(Notification::new("Blocked", "x", RiskLevel::Critical));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(seen.lock().as_slice(), ["Blocked".to_string()]);
        assert_eq!(service.counters().delivered.load(Ordering::Relaxed), 1);
    }

    struct StallingChannel;

    #[async_trait::async_trait]
    impl NotificationChannel for StallingChannel {
        fn name(&self) -> &'static str {
            "stalling"
        }
        async fn send(&self, _: &Notification) -> Result<(), DlpError> {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let service =
            NotificationService::spawn(vec![Arc::new(StallingChannel)], 1, CancellationToken::new());

        // First lands in the dispatcher, second fills the queue, third drops.
        for i in 0..3 {
            service.notify(Notification::new(format!("n{}", i), "x", RiskLevel::Low));
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(service.counters().dropped_queue_full.load(Ordering::Relaxed) >= 1);
    }
}
