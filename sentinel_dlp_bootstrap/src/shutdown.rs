// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Shutdown Coordination
//!
//! Manages graceful shutdown across agent components.
//!
//! ## Design Pattern
//!
//! The shutdown coordinator provides:
//! - **Cancellation tokens** for propagating shutdown signals
//! - **Grace period** with timeout enforcement (the pipeline drain deadline)
//! - **Atomic state** for shutdown tracking
//! - **Async-aware** shutdown orchestration
//!
//! Every long operation in the agent accepts a [`CancellationToken`];
//! cancellation propagates from Stop to the interceptor (close kernel
//! handle), the attribution tickers, the orchestrator queue, and in-flight
//! executor attempts.
//!
//! ## Usage
//!
//! ```rust
//! use sentinel_dlp_bootstrap::shutdown::ShutdownCoordinator;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let coordinator = ShutdownCoordinator::new(Duration::from_secs(30));
//!     let token = coordinator.token();
//!
//!     tokio::spawn(async move {
//!         tokio::select! {
//!             _ = token.cancelled() => { /* drain and exit */ }
//!             _ = tokio::time::sleep(Duration::from_secs(1)) => { /* work */ }
//!         }
//!     });
//!
//!     coordinator.initiate_shutdown();
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Default grace period for graceful shutdown (the pipeline drain deadline).
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 30;

/// Cancellation token for signaling shutdown.
///
/// Lightweight clone-able token that can be passed to async tasks. Cloned
/// tokens share state: cancelling any clone cancels them all.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    /// Creates a fresh, uncancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Cancels this token and wakes all waiters.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Checks cancellation without blocking.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Waits until the token is cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
            if self.is_cancelled() {
                return;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Coordinates shutdown across components with a bounded grace period.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    grace_period: Duration,
    initiated: AtomicBool,
}

impl ShutdownCoordinator {
    /// Creates a coordinator with the given grace period.
    pub fn new(grace_period: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            grace_period,
            initiated: AtomicBool::new(false),
        }
    }

    /// The shared cancellation token for worker tasks.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// The configured grace period.
    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Initiates shutdown. Idempotent; returns whether this call was the
    /// first initiator.
    pub fn initiate_shutdown(&self) -> bool {
        let first = !self.initiated.swap(true, Ordering::SeqCst);
        if first {
            tracing::info!(grace_period_secs = self.grace_period.as_secs(), "shutdown initiated");
            self.token.cancel();
        }
        first
    }

    pub fn is_shutting_down(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }

    /// Runs `drain` under the grace period. Returns `false` (and logs a
    /// warning) when the deadline expires before the drain completes.
    pub async fn drain_within_grace<F>(&self, drain: F) -> bool
    where
        F: std::future::Future<Output = ()>,
    {
        match tokio::time::timeout(self.grace_period, drain).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    grace_period_secs = self.grace_period.as_secs(),
                    "shutdown grace period expired before all stages drained"
                );
                false
            }
        }
    }
}
