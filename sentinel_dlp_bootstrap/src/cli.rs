// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface Module
//!
//! Bootstrap-layer CLI handling for the agent binary.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  1. clap parse                      │  Structure + --help/--version
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  2. validate()                      │  Path and range checks
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  3. Cli (validated)                 │  Handed to the agent runner
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Subcommands
//!
//! - `start` - run the agent in the foreground
//! - `stop` - signal a running agent to shut down (PID-file based)
//! - `plugin list` - enumerate registered parser/analyzer plugins
//! - `version` - print version information
//!
//! Validation failures map to exit code 1 (configuration error).

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

/// CLI parse/validation failures.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid configuration: {0}")]
    InvalidValue(String),

    #[error("Invalid configuration: config file not found: {0}")]
    ConfigNotFound(PathBuf),
}

/// Sentinel DLP agent command line.
#[derive(Debug, Parser)]
#[command(name = "sentinel_dlp", version, about = "Host-based data loss prevention agent")]
pub struct Cli {
    /// Path to the agent configuration file (TOML or YAML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Agent subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the agent in the foreground
    Start(StartArgs),

    /// Signal a running agent to shut down gracefully
    Stop {
        /// PID file written by the running agent
        #[arg(long, default_value = "/var/run/sentinel_dlp.pid")]
        pid_file: PathBuf,
    },

    /// Plugin inspection
    Plugin {
        #[command(subcommand)]
        command: PluginCommand,
    },

    /// Print version information
    Version,
}

/// `plugin` subcommands.
#[derive(Debug, Subcommand)]
pub enum PluginCommand {
    /// List registered parser and analyzer plugins
    List,
}

/// Arguments for `start`.
#[derive(Debug, Args)]
pub struct StartArgs {
    /// Override the pipeline worker count
    #[arg(long)]
    pub workers: Option<usize>,

    /// Override the orchestrator queue capacity
    #[arg(long)]
    pub queue_capacity: Option<usize>,
}

/// Parse and validate CLI arguments.
///
/// Combines clap parsing with the range/path validation the agent requires.
/// Clap handles `--help`/`--version` and exits on its own.
pub fn parse_and_validate() -> Result<Cli, ParseError> {
    validate(Cli::parse())
}

fn validate(cli: Cli) -> Result<Cli, ParseError> {
    if let Some(ref path) = cli.config {
        if !path.exists() {
            return Err(ParseError::ConfigNotFound(path.clone()));
        }
    }

    if let Command::Start(ref args) = cli.command {
        if let Some(workers) = args.workers {
            if workers == 0 || workers > 128 {
                return Err(ParseError::InvalidValue(
                    "workers must be between 1 and 128".to_string(),
                ));
            }
        }
        if let Some(capacity) = args.queue_capacity {
            if capacity == 0 {
                return Err(ParseError::InvalidValue(
                    "queue-capacity must be greater than 0".to_string(),
                ));
            }
        }
    }

    Ok(cli)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, ParseError> {
        let cli = Cli::try_parse_from(args).expect("clap parse");
        validate(cli)
    }

    #[test]
    fn test_start_defaults() {
        let cli = parse(&["sentinel_dlp", "start"]).unwrap();
        match cli.command {
            Command::Start(ref args) => {
                assert!(args.workers.is_none());
                assert!(args.queue_capacity.is_none());
            }
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn test_worker_range_rejected() {
        assert!(parse(&["sentinel_dlp", "start", "--workers", "0"]).is_err());
        assert!(parse(&["sentinel_dlp", "start", "--workers", "129"]).is_err());
        assert!(parse(&["sentinel_dlp", "start", "--workers", "8"]).is_ok());
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        assert!(parse(&["sentinel_dlp", "start", "--queue-capacity", "0"]).is_err());
    }

    #[test]
    fn test_missing_config_rejected() {
        let err = parse(&["sentinel_dlp", "--config", "/definitely/not/here.toml", "start"]);
        assert!(matches!(err, Err(ParseError::ConfigNotFound(_))));
    }

    #[test]
    fn test_plugin_list_parses() {
        let cli = parse(&["sentinel_dlp", "plugin", "list"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Plugin {
                command: PluginCommand::List
            }
        ));
    }
}
