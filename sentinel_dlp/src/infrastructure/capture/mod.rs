// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Traffic Interceptor
//!
//! The capture stage: a platform backend delivers raw frames on a dedicated
//! thread; this module decodes them, applies the address prefilter and the
//! monitored-port test, and emits [`PacketRecord`]s into a bounded channel.
//!
//! ## Backend contract
//!
//! A [`CaptureBackend`] opens a [`CaptureHandle`] against a
//! [`FilterExpression`]. The handle's `next_frame` blocks with a short
//! timeout so the capture thread can observe shutdown; it never blocks the
//! kernel side.
//!
//! ## Failure semantics
//!
//! - Backend open failure is retried once; a second failure transitions the
//!   interceptor to a degraded state in which the stream emits nothing and
//!   `health_check` reports unhealthy. Start still succeeds - a capture-less
//!   agent can serve its other monitors.
//! - A full channel drops the newest packet and increments
//!   `dropped_queue_full`; the kernel handle is never back-pressured.
//!
//! ## Drop accounting
//!
//! Every discarded frame lands in exactly one counter: decode failures,
//! non-monitored ports, per-reason prefilter drops, or queue-full drops.

pub mod decoder;
pub mod filter;
pub mod prefilter;
pub mod replay;

#[cfg(all(unix, not(target_os = "macos")))]
pub mod linux;

#[cfg(windows)]
pub mod windows;

use self::decoder::LinkLayer;
use self::filter::FilterExpression;
use self::prefilter::DropReason;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use sentinel_dlp_domain::entities::packet_record::{Direction, PacketRecord};
use sentinel_dlp_domain::error::DlpError;
use sentinel_dlp_domain::services::packet_source::{ComponentHealth, PacketSource};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// A platform capture backend.
pub trait CaptureBackend: Send + Sync {
    /// Backend name for logs and health output.
    fn name(&self) -> &'static str;

    /// Link-layer framing this backend delivers.
    fn link_layer(&self) -> LinkLayer;

    /// Opens a capture handle under the given filter.
    fn open(&self, filter: &FilterExpression) -> Result<Box<dyn CaptureHandle>, DlpError>;
}

/// An open capture handle owned by the capture thread.
pub trait CaptureHandle: Send {
    /// Reads the next frame into `buf`.
    ///
    /// Returns `Ok(Some(len))` on a frame, `Ok(None)` on read timeout (the
    /// shutdown poll point), `Err` on a driver fault.
    fn next_frame(&mut self, buf: &mut [u8]) -> Result<Option<usize>, DlpError>;

    /// Releases the kernel handle.
    fn close(&mut self);
}

/// Monotonic capture counters, shared with the metrics service.
#[derive(Debug, Default)]
pub struct CaptureCounters {
    pub captured: AtomicU64,
    pub emitted: AtomicU64,
    pub dropped_decode: AtomicU64,
    pub dropped_not_monitored: AtomicU64,
    pub dropped_loopback: AtomicU64,
    pub dropped_private_range: AtomicU64,
    pub dropped_link_local: AtomicU64,
    pub dropped_multicast: AtomicU64,
    pub dropped_broadcast: AtomicU64,
    pub dropped_queue_full: AtomicU64,
    pub driver_errors: AtomicU64,
}

impl CaptureCounters {
    fn count_prefilter_drop(&self, reason: DropReason) {
        let counter = match reason {
            DropReason::Loopback => &self.dropped_loopback,
            DropReason::PrivateRange => &self.dropped_private_range,
            DropReason::LinkLocal => &self.dropped_link_local,
            DropReason::Multicast => &self.dropped_multicast,
            DropReason::Broadcast => &self.dropped_broadcast,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop count for one prefilter reason.
    pub fn prefilter_drops(&self, reason: DropReason) -> u64 {
        let counter = match reason {
            DropReason::Loopback => &self.dropped_loopback,
            DropReason::PrivateRange => &self.dropped_private_range,
            DropReason::LinkLocal => &self.dropped_link_local,
            DropReason::Multicast => &self.dropped_multicast,
            DropReason::Broadcast => &self.dropped_broadcast,
        };
        counter.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum InterceptorState {
    Idle,
    Running,
    Degraded(String),
    Stopped,
}

/// Capture stage settings.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub monitored_ports: Vec<u16>,
    /// Bounded packet channel capacity (`buffer_size`).
    pub channel_capacity: usize,
}

/// The traffic interceptor: one per agent lifecycle.
pub struct TrafficInterceptor {
    backend: Box<dyn CaptureBackend>,
    filter: FilterExpression,
    settings: CaptureSettings,
    counters: Arc<CaptureCounters>,
    state: Mutex<InterceptorState>,
    shutdown: Arc<AtomicBool>,
    sender: mpsc::Sender<PacketRecord>,
    receiver: Mutex<Option<mpsc::Receiver<PacketRecord>>>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl TrafficInterceptor {
    pub fn new(backend: Box<dyn CaptureBackend>, settings: CaptureSettings) -> Self {
        let filter = FilterExpression::for_ports(&settings.monitored_ports);
        let (sender, receiver) = mpsc::channel(settings.channel_capacity.max(1));
        Self {
            backend,
            filter,
            settings,
            counters: Arc::new(CaptureCounters::default()),
            state: Mutex::new(InterceptorState::Idle),
            shutdown: Arc::new(AtomicBool::new(false)),
            sender,
            receiver: Mutex::new(Some(receiver)),
            thread: Mutex::new(None),
        }
    }

    /// Shared capture counters for the metrics service.
    pub fn counters(&self) -> Arc<CaptureCounters> {
        Arc::clone(&self.counters)
    }

    /// The active filter expression.
    pub fn filter(&self) -> &FilterExpression {
        &self.filter
    }

    fn open_with_retry(&self) -> Result<Box<dyn CaptureHandle>, DlpError> {
        match self.backend.open(&self.filter) {
            Ok(handle) => Ok(handle),
            Err(first) => {
                warn!(
                    backend = self.backend.name(),
                    error = %first,
                    "capture backend open failed, retrying driver registration once"
                );
                self.backend.open(&self.filter).map_err(|second| {
                    DlpError::driver_error(format!(
                        "backend '{}' failed twice: {}; retry: {}",
                        self.backend.name(),
                        first,
                        second
                    ))
                })
            }
        }
    }

    fn run_capture_loop(
        mut handle: Box<dyn CaptureHandle>,
        link: LinkLayer,
        filter: FilterExpression,
        counters: Arc<CaptureCounters>,
        sender: mpsc::Sender<PacketRecord>,
        shutdown: Arc<AtomicBool>,
    ) {
        // 64 KiB covers the largest frame any backend delivers.
        let mut buf = vec![0u8; 64 * 1024];
        while !shutdown.load(Ordering::SeqCst) {
            let len = match handle.next_frame(&mut buf) {
                Ok(Some(len)) => len,
                Ok(None) => continue,
                Err(e) => {
                    counters.driver_errors.fetch_add(1, Ordering::Relaxed);
                    error!(error = %e, "capture read failed");
                    // Transient faults are tolerated; the health check
                    // surfaces sustained failure via the error counter.
                    std::thread::sleep(std::time::Duration::from_millis(50));
                    continue;
                }
            };
            counters.captured.fetch_add(1, Ordering::Relaxed);

            let Some(decoded) = decoder::decode_frame(&buf[..len], link) else {
                counters.dropped_decode.fetch_add(1, Ordering::Relaxed);
                continue;
            };

            // Port heuristic determines direction relative to the monitored
            // set: traffic toward a monitored port is outbound, traffic from
            // one is the return direction of a monitored flow.
            let direction = if filter.matches_port(decoded.destination.port()) {
                Direction::Outbound
            } else if filter.matches_port(decoded.source.port()) {
                Direction::Inbound
            } else {
                counters.dropped_not_monitored.fetch_add(1, Ordering::Relaxed);
                continue;
            };

            // The invariant test: non-routable destinations never pass,
            // whatever the kernel filter let through.
            let guarded_addr = match direction {
                Direction::Outbound => decoded.destination.ip(),
                Direction::Inbound => decoded.source.ip(),
            };
            if let Some(reason) = prefilter::classify_destination(guarded_addr) {
                counters.count_prefilter_drop(reason);
                continue;
            }

            let mut record = PacketRecord::new(
                direction,
                decoded.protocol,
                decoded.source,
                decoded.destination,
                decoded.payload,
            );
            if let Some(tcp) = decoded.tcp {
                record = record.with_tcp_observation(tcp);
            }

            // Never block the kernel side: on a full channel the newest
            // packet is the casualty.
            match sender.try_send(record) {
                Ok(()) => {
                    counters.emitted.fetch_add(1, Ordering::Relaxed);
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    counters.dropped_queue_full.fetch_add(1, Ordering::Relaxed);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("packet channel closed, capture loop exiting");
                    break;
                }
            }
        }
        handle.close();
        info!("capture loop stopped");
    }
}

#[async_trait::async_trait]
impl PacketSource for TrafficInterceptor {
    async fn start(&self) -> Result<(), DlpError> {
        {
            let state = self.state.lock();
            if *state != InterceptorState::Idle {
                return Err(DlpError::internal_error(format!(
                    "interceptor cannot start from state {:?}",
                    *state
                )));
            }
        }

        match self.open_with_retry() {
            Ok(handle) => {
                let link = self.backend.link_layer();
                let filter = self.filter.clone();
                let counters = Arc::clone(&self.counters);
                let sender = self.sender.clone();
                let shutdown = Arc::clone(&self.shutdown);

                let thread = std::thread::Builder::new()
                    .name("sentinel-capture".to_string())
                    .spawn(move || {
                        Self::run_capture_loop(handle, link, filter, counters, sender, shutdown)
                    })
                    .map_err(|e| DlpError::internal_error(format!("spawn capture thread: {}", e)))?;

                *self.thread.lock() = Some(thread);
                *self.state.lock() = InterceptorState::Running;
                info!(
                    backend = self.backend.name(),
                    filter = %self.filter.to_bpf(),
                    "traffic interceptor started"
                );
                Ok(())
            }
            Err(e) => {
                // Degraded, not fatal: the stream stays silent and the
                // health check reports it.
                error!(error = %e, "interceptor entering degraded state");
                *self.state.lock() = InterceptorState::Degraded(e.to_string());
                Ok(())
            }
        }
    }

    async fn stop(&self) -> Result<(), DlpError> {
        self.shutdown.store(true, Ordering::SeqCst);
        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            tokio::task::spawn_blocking(move || {
                if thread.join().is_err() {
                    warn!("capture thread panicked during shutdown");
                }
            })
            .await
            .map_err(|e| DlpError::internal_error(format!("join capture thread: {}", e)))?;
        }
        *self.state.lock() = InterceptorState::Stopped;
        info!("traffic interceptor stopped");
        Ok(())
    }

    fn health_check(&self) -> ComponentHealth {
        match &*self.state.lock() {
            InterceptorState::Idle => ComponentHealth::Degraded("not started".to_string()),
            InterceptorState::Running => ComponentHealth::Healthy,
            InterceptorState::Degraded(reason) => ComponentHealth::Unhealthy(reason.clone()),
            InterceptorState::Stopped => ComponentHealth::Degraded("stopped".to_string()),
        }
    }

    fn take_packet_stream(&self) -> Option<BoxStream<'static, PacketRecord>> {
        let receiver = self.receiver.lock().take()?;
        Some(
            futures::stream::unfold(receiver, |mut rx| async move {
                rx.recv().await.map(|record| (record, rx))
            })
            .boxed(),
        )
    }
}

/// Creates the native capture backend for this platform.
pub fn create_backend() -> Box<dyn CaptureBackend> {
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        Box::new(linux::AfPacketBackend::new())
    }
    #[cfg(windows)]
    {
        Box::new(windows::WinDivertBackend::new())
    }
    #[cfg(all(unix, target_os = "macos"))]
    {
        // No native backend on macOS; the interceptor degrades at start.
        Box::new(replay::UnavailableBackend::new("macos"))
    }
}

#[cfg(test)]
mod tests {
    use super::replay::ReplayBackend;
    use super::*;
    use etherparse::PacketBuilder;

    fn tcp_frame(src: [u8; 4], sport: u16, dst: [u8; 4], dport: u16, payload: &[u8]) -> Vec<u8> {
        let builder = PacketBuilder::ipv4(src, dst, 64).tcp(sport, dport, 1, 64240);
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, payload).unwrap();
        frame
    }

    fn settings() -> CaptureSettings {
        CaptureSettings {
            monitored_ports: vec![80, 443, 3306],
            channel_capacity: 16,
        }
    }

    #[tokio::test]
    async fn test_emits_monitored_outbound_packets() {
        let frames = vec![tcp_frame([192, 168, 1, 100], 54321, [8, 8, 8, 8], 443, b"hello")];
        let interceptor =
            TrafficInterceptor::new(Box::new(ReplayBackend::new(frames)), settings());
        let mut stream = interceptor.take_packet_stream().unwrap();

        interceptor.start().await.unwrap();
        let record = stream.next().await.unwrap();
        assert_eq!(record.destination(), "8.8.8.8:443".parse().unwrap());
        assert!(record.is_outbound());
        interceptor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_private_destination_dropped_with_counter() {
        // Scenario: outbound TCP to 10.0.0.5:3306 never enters the pipeline.
        let frames = vec![
            tcp_frame([192, 168, 1, 100], 50000, [10, 0, 0, 5], 3306, b"select 1"),
            tcp_frame([192, 168, 1, 100], 50001, [8, 8, 8, 8], 443, b"ok"),
        ];
        let interceptor =
            TrafficInterceptor::new(Box::new(ReplayBackend::new(frames)), settings());
        let counters = interceptor.counters();
        let mut stream = interceptor.take_packet_stream().unwrap();

        interceptor.start().await.unwrap();
        // Only the routable packet arrives.
        let record = stream.next().await.unwrap();
        assert_eq!(record.destination().port(), 443);
        interceptor.stop().await.unwrap();

        assert_eq!(counters.prefilter_drops(DropReason::PrivateRange), 1);
        assert_eq!(counters.emitted.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_unmonitored_port_dropped() {
        let frames = vec![tcp_frame([192, 168, 1, 100], 50000, [8, 8, 8, 8], 8080, b"x")];
        let interceptor =
            TrafficInterceptor::new(Box::new(ReplayBackend::new(frames)), settings());
        let counters = interceptor.counters();

        interceptor.start().await.unwrap();
        // Give the capture thread a moment to drain the replay.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        interceptor.stop().await.unwrap();

        assert_eq!(counters.dropped_not_monitored.load(Ordering::Relaxed), 1);
        assert_eq!(counters.emitted.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_failing_backend_degrades_not_fails() {
        let interceptor = TrafficInterceptor::new(
            Box::new(replay::UnavailableBackend::new("test")),
            settings(),
        );
        interceptor.start().await.unwrap();
        match interceptor.health_check() {
            ComponentHealth::Unhealthy(_) => {}
            other => panic!("expected unhealthy, got {:?}", other.status()),
        }
        interceptor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_taken_exactly_once() {
        let interceptor = TrafficInterceptor::new(Box::new(ReplayBackend::new(vec![])), settings());
        assert!(interceptor.take_packet_stream().is_some());
        assert!(interceptor.take_packet_stream().is_none());
    }
}
