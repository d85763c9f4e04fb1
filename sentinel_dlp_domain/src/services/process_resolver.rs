// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Process Resolver Port
//!
//! Resolves a flow's 5-tuple to the identity of the owning process using the
//! OS connection tables. Resolution is best-effort: a miss yields `None` and
//! the pipeline proceeds with a null identity - attribution failure never
//! drops a packet.

use crate::entities::process_identity::ProcessIdentity;
use crate::error::DlpError;
use crate::value_objects::flow_key::FlowKey;
use async_trait::async_trait;

/// Flow-to-process attribution.
#[async_trait]
pub trait ProcessResolver: Send + Sync {
    /// Resolves the process owning `key`'s local endpoint.
    ///
    /// Consults the cached connection-table snapshot first; on a miss,
    /// triggers an on-demand refresh before giving up.
    async fn resolve(&self, key: &FlowKey) -> Option<ProcessIdentity>;

    /// Forces a connection-table snapshot refresh.
    async fn refresh(&self) -> Result<(), DlpError>;

    /// Count of resolution misses since start (exported as a metric).
    fn miss_count(&self) -> u64;
}
