// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logger Initialization
//!
//! One-shot tracing subscriber setup for the agent process. Every layer logs
//! through `tracing`; this module decides where those events go.
//!
//! Verbosity resolution, highest wins:
//!
//! 1. `RUST_LOG` environment variable (EnvFilter syntax)
//! 2. `-v` / `-vv` CLI flags (info → debug → trace)
//! 3. default `info`

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber.
///
/// `verbosity` is the count of `-v` flags. Calling twice is a no-op (the
/// second registration fails quietly), which keeps tests that each
/// initialize logging from panicking.
pub fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .try_init();
}
