// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Action Executor Port
//!
//! One executor per [`ActionKind`], registered with the execution manager.
//! The manager owns retry, timeout, metrics, and notification; the executor
//! owns the side effect itself.
//!
//! ## Atomicity
//!
//! An executor either completes its side effect fully or leaves no trace:
//! on error (including cancellation) it must roll back partial state before
//! returning. The manager relies on this to guarantee "no record is
//! half-processed".

use crate::entities::decision::{DecisionContext, PolicyDecision};
use crate::entities::execution_result::AffectedData;
use crate::entities::policy_rule::ActionKind;
use crate::error::DlpError;
use async_trait::async_trait;

/// A component that performs the side effect for one decided action.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// The action this executor handles.
    fn kind(&self) -> ActionKind;

    /// Carries out the side effect.
    ///
    /// Retryable failures must be reported as
    /// [`DlpError::ExecutorRetryable`] with the appropriate kind; everything
    /// else is terminal. Returns the produced artifact on success.
    async fn execute(
        &self,
        decision: &PolicyDecision,
        context: &DecisionContext,
    ) -> Result<AffectedData, DlpError>;
}
