// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Packet Source Port
//!
//! The uniform interface over platform capture backends (WinDivert-class on
//! Windows, AF_PACKET/netfilter on Linux). The orchestrator only ever sees
//! this trait.
//!
//! ## Failure semantics
//!
//! Driver install/probe errors surface through `health_check()`. After one
//! failed registration retry the source transitions to a degraded state in
//! which the packet stream emits nothing and health reports `Unhealthy`; it
//! never panics the host and never blocks the kernel handle.

use crate::entities::packet_record::PacketRecord;
use crate::error::DlpError;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Health of a lifecycle component, as reported by its `health_check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentHealth {
    Healthy,
    /// Operating with reduced capability; the payload explains what is lost.
    Degraded(String),
    /// Not operating; the payload explains why.
    Unhealthy(String),
}

impl ComponentHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ComponentHealth::Healthy)
    }

    /// Stable label for logs and the health endpoint.
    pub fn status(&self) -> &'static str {
        match self {
            ComponentHealth::Healthy => "healthy",
            ComponentHealth::Degraded(_) => "degraded",
            ComponentHealth::Unhealthy(_) => "unhealthy",
        }
    }
}

impl std::fmt::Display for ComponentHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentHealth::Healthy => f.write_str("healthy"),
            ComponentHealth::Degraded(why) => write!(f, "degraded: {}", why),
            ComponentHealth::Unhealthy(why) => write!(f, "unhealthy: {}", why),
        }
    }
}

/// Uniform capture interface over the platform backends.
#[async_trait]
pub trait PacketSource: Send + Sync {
    /// Installs the kernel filter and begins capture.
    ///
    /// May be called once per lifecycle. Retries driver registration once
    /// internally; a second failure leaves the source degraded rather than
    /// returning an error, so a capture-less host can still start for
    /// file/clipboard monitoring.
    async fn start(&self) -> Result<(), DlpError>;

    /// Closes the kernel handle and stops emission.
    async fn stop(&self) -> Result<(), DlpError>;

    /// Current backend health.
    fn health_check(&self) -> ComponentHealth;

    /// Takes the receive-only packet stream.
    ///
    /// Yields `Some` exactly once; the orchestrator is the single consumer.
    fn take_packet_stream(&self) -> Option<BoxStream<'static, PacketRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_labels() {
        assert_eq!(ComponentHealth::Healthy.status(), "healthy");
        assert_eq!(ComponentHealth::Degraded("no driver".into()).status(), "degraded");
        assert!(!ComponentHealth::Unhealthy("probe failed".into()).is_healthy());
    }
}
