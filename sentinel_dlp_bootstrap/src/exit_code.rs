// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Code Management
//!
//! The agent-level exit code contract:
//!
//! - **0** - success
//! - **1** - configuration error (startup-time validation failures)
//! - **2** - runtime failure (everything that goes wrong after Start)
//!
//! The mapping from error text to code keys on the error's category prefix,
//! which the domain error type renders into its Display output.

use std::fmt;

/// Agent exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful termination (0)
    #[default]
    Success = 0,

    /// Configuration error (1): invalid config file, bad CLI arguments,
    /// missing required notification recipients.
    ConfigError = 1,

    /// Runtime failure (2): driver errors, audit sink bind failure,
    /// unrecoverable pipeline faults.
    RuntimeFailure = 2,
}

impl ExitCode {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// Converts to the std process exit code type.
    pub fn into_process_exit(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self.as_i32() as u8)
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExitCode::Success => "success",
            ExitCode::ConfigError => "configuration error",
            ExitCode::RuntimeFailure => "runtime failure",
        };
        write!(f, "{} ({})", label, self.as_i32())
    }
}

/// Maps an application result to the exit-code contract.
///
/// Errors whose Display output begins with a configuration-category prefix
/// map to `ConfigError`; everything else is a runtime failure.
pub fn result_to_exit_code<E: std::error::Error>(result: Result<(), E>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            let text = e.to_string();
            if text.starts_with("Invalid configuration") || text.starts_with("configuration") {
                ExitCode::ConfigError
            } else {
                ExitCode::RuntimeFailure
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct TestError(String);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl std::error::Error for TestError {}

    #[test]
    fn test_success_maps_to_zero() {
        let r: Result<(), TestError> = Ok(());
        assert_eq!(result_to_exit_code(r), ExitCode::Success);
        assert_eq!(ExitCode::Success.as_i32(), 0);
    }

    #[test]
    fn test_config_errors_map_to_one() {
        let r: Result<(), TestError> =
            Err(TestError("Invalid configuration: bad port".to_string()));
        assert_eq!(result_to_exit_code(r), ExitCode::ConfigError);
        assert_eq!(ExitCode::ConfigError.as_i32(), 1);
    }

    #[test]
    fn test_runtime_errors_map_to_two() {
        let r: Result<(), TestError> = Err(TestError("Driver error: probe failed".to_string()));
        assert_eq!(result_to_exit_code(r), ExitCode::RuntimeFailure);
        assert_eq!(ExitCode::RuntimeFailure.as_i32(), 2);
    }
}
