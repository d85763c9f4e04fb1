// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Sentinel DLP Agent Binary
//!
//! Entry point: CLI parsing and validation (bootstrap), configuration load,
//! context construction, orchestrator lifecycle, and signal-driven
//! shutdown. Exit codes: 0 success, 1 configuration error, 2 runtime
//! failure.

use sentinel_dlp::application::{AgentContext, PipelineOrchestrator};
use sentinel_dlp::infrastructure::analysis::text_analyzer::TextAnalyzer;
use sentinel_dlp::infrastructure::analysis::AnalyzerRegistry;
use sentinel_dlp::infrastructure::config::AgentConfig;
use sentinel_dlp::infrastructure::parsers::ParserRegistry;
use sentinel_dlp_bootstrap::shutdown::ShutdownCoordinator;
use sentinel_dlp_bootstrap::signals::create_signal_handler;
use sentinel_dlp_bootstrap::{bootstrap_cli, logger, platform, Cli, Command, ExitCode};
use sentinel_dlp_domain::error::DlpError;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

fn main() -> std::process::ExitCode {
    let cli = match bootstrap_cli() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::ConfigError.into_process_exit();
        }
    };
    logger::init_logging(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "cannot build tokio runtime");
            return ExitCode::RuntimeFailure.into_process_exit();
        }
    };

    let result = runtime.block_on(run(cli));
    match result {
        Ok(()) => ExitCode::Success.into_process_exit(),
        Err(e) => {
            error!(error = %e, category = e.category(), "agent failed");
            if matches!(e, DlpError::InvalidConfiguration(_)) {
                ExitCode::ConfigError.into_process_exit()
            } else {
                ExitCode::RuntimeFailure.into_process_exit()
            }
        }
    }
}

async fn run(cli: Cli) -> Result<(), DlpError> {
    let config_path = cli.config.clone();
    match cli.command {
        Command::Start(args) => start_agent(config_path.as_deref(), args).await,
        Command::Stop { pid_file } => stop_agent(&pid_file),
        Command::Plugin { command } => {
            match command {
                sentinel_dlp_bootstrap::cli::PluginCommand::List => {
                    list_plugins(config_path.as_deref())
                }
            }
        }
        Command::Version => {
            println!("sentinel_dlp {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn start_agent(
    config_path: Option<&Path>,
    args: sentinel_dlp_bootstrap::cli::StartArgs,
) -> Result<(), DlpError> {
    let mut config = AgentConfig::load(config_path)?;
    if let Some(workers) = args.workers {
        config.max_concurrency = sentinel_dlp::infrastructure::config::MaxConcurrency(workers);
    }
    if let Some(capacity) = args.queue_capacity {
        config.engine.queue_capacity = capacity;
    }

    // Privilege acquisition is attempted, reported, and never fatal.
    let platform = platform::create_platform();
    match platform.acquire_capture_privileges() {
        platform::PrivilegeStatus::Acquired => {
            info!(platform = platform.platform_name(), "capture privileges acquired");
        }
        platform::PrivilegeStatus::Partial(reason) | platform::PrivilegeStatus::Denied(reason) => {
            warn!(platform = platform.platform_name(), reason, "running without full privileges");
        }
    }

    let coordinator = ShutdownCoordinator::new(Duration::from_secs(30));
    let context = Arc::new(AgentContext::build(config, coordinator.token()).await?);
    let orchestrator = Arc::new(PipelineOrchestrator::new(Arc::clone(&context)));
    orchestrator.start().await?;

    for (component, health) in orchestrator.health() {
        info!(component, status = health.status(), "component health");
    }

    // Block until a shutdown signal arrives.
    let signals = create_signal_handler();
    let shutdown_token = coordinator.token();
    signals
        .wait_for_signal(Box::new(move || {
            shutdown_token.cancel();
        }))
        .await;
    coordinator.initiate_shutdown();

    orchestrator.stop(coordinator.grace_period()).await?;
    info!("agent exited cleanly");
    Ok(())
}

fn stop_agent(pid_file: &Path) -> Result<(), DlpError> {
    let text = std::fs::read_to_string(pid_file)
        .map_err(|e| DlpError::io_error(format!("read pid file {}: {}", pid_file.display(), e)))?;
    let pid: i32 = text
        .trim()
        .parse()
        .map_err(|e| DlpError::invalid_config(format!("bad pid file contents: {}", e)))?;

    #[cfg(unix)]
    {
        // SIGTERM triggers the agent's graceful shutdown path.
        let result = unsafe { libc::kill(pid, libc::SIGTERM) };
        if result != 0 {
            return Err(DlpError::io_error(format!(
                "signal pid {}: {}",
                pid,
                std::io::Error::last_os_error()
            )));
        }
        info!(pid, "sent SIGTERM");
        Ok(())
    }
    #[cfg(not(unix))]
    {
        Err(DlpError::internal_error(format!(
            "stop-by-pid ({}) is not supported on this platform; stop the service instead",
            pid
        )))
    }
}

fn list_plugins(config_path: Option<&Path>) -> Result<(), DlpError> {
    let config = AgentConfig::load(config_path)?;
    let parsers = ParserRegistry::with_default_parsers(&config.parser);
    let analyzers = AnalyzerRegistry::with_text_analyzer(TextAnalyzer::with_default_rules(
        config.analysis.clone(),
    ));

    println!("parsers:");
    for name in parsers.parser_names() {
        println!("  {}", name);
    }
    println!("analyzers:");
    for name in analyzers.analyzer_names() {
        println!("  {}", name);
    }
    Ok(())
}
