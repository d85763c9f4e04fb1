// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Sentinel DLP Agent
//!
//! The infrastructure and application layers of the Sentinel DLP agent: a
//! streaming pipeline that intercepts outbound network traffic, attributes
//! each packet to its producing process, reconstructs the application-layer
//! message, inspects it for sensitive content, evaluates policy, and carries
//! out a terminal action.
//!
//! ## Stage layout
//!
//! ```text
//! capture ──▶ attribution ──▶ [orchestrator queue] ──▶ worker × N
//!                                                         │
//!                      reassembly → parsers → analysis → policy
//!                                                         │
//!                                             execution → audit
//! ```
//!
//! Stages communicate only through bounded queues owned by the orchestrator;
//! no stage calls another directly. Shared lookup tables (process map, flow
//! table, rule store, executor registry) live behind reader-writer locks
//! with a single writing owner each.
//!
//! ## Layers
//!
//! - [`infrastructure`] - the adapters: capture backends, OS attribution,
//!   flow reassembly, protocol parsers, content analyzers, the policy
//!   engine, action executors, the audit sink, typed configuration, and
//!   Prometheus metrics
//! - [`application`] - the composition root ([`application::AgentContext`])
//!   and the pipeline orchestrator

pub mod application;
pub mod infrastructure;
