// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Bootstrap Module
//!
//! The bootstrap module sits **outside** the enterprise application layers
//! (domain, application, infrastructure) and provides:
//!
//! - **Entry point** - Agent lifecycle management
//! - **Platform abstraction** - OS-specific privilege acquisition
//! - **Signal handling** - Graceful shutdown (SIGTERM, SIGINT, SIGHUP)
//! - **Argument parsing** - CLI validation with agent exit-code contract
//! - **Logging** - tracing subscriber initialization
//! - **Async coordination** - Shutdown coordination and cancellation
//!
//! ## Architecture Position
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │          BOOTSTRAP (This Module)            │
//! │  - Entry Point / CLI / Exit Codes           │
//! │  - Platform Privileges                      │
//! │  - Signal Handling / Shutdown               │
//! └──────────────────┬──────────────────────────┘
//!                    ▼
//! ┌─────────────────────────────────────────────┐
//! │  APPLICATION LAYER (agent context, pipeline)│
//! └──────────────────┬──────────────────────────┘
//!                    ▼
//! ┌─────────────────────────────────────────────┐
//! │  DOMAIN LAYER (entities, ports)             │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Bootstrap can reach every layer; no enterprise layer may depend on
//! bootstrap - except through the [`shutdown::CancellationToken`] it hands
//! to Start.
//!
//! ## Exit Code Contract
//!
//! The agent CLI commits to three exit codes:
//!
//! - `0` - success
//! - `1` - configuration error (invalid config file, bad CLI arguments)
//! - `2` - runtime failure (driver errors, audit sink unavailable, panics)

// Re-export modules
pub mod cli;
pub mod exit_code;
pub mod logger;
pub mod platform;
pub mod shutdown;
pub mod signals;

// Re-export commonly used types
pub use cli::{parse_and_validate, Cli, Command, ParseError};
pub use exit_code::{result_to_exit_code, ExitCode};
pub use platform::{create_platform, Platform, PrivilegeStatus};
pub use shutdown::{CancellationToken, ShutdownCoordinator};

/// Bootstrap and parse CLI arguments.
///
/// Entry point for the bootstrap layer: parses the CLI with clap, applies
/// validation, and returns the validated command. Clap handles `--help` and
/// `--version` itself and exits the process.
///
/// # Errors
///
/// Returns [`cli::ParseError`] when validation fails; the caller maps that
/// to [`ExitCode::ConfigError`].
pub fn bootstrap_cli() -> Result<Cli, ParseError> {
    cli::parse_and_validate()
}
