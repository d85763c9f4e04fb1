// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Platform Abstraction
//!
//! OS-specific operations behind a trait, selected at compile time. The
//! agent's privileged needs are narrow: read other processes' connection
//! tables and open a capture handle.
//!
//! - **Unix**: capture needs root or `CAP_NET_RAW`; reading `/proc` socket
//!   tables of other users needs root. Acquisition is a probe - we cannot
//!   grant ourselves capabilities, only detect them.
//! - **Windows**: attribution needs `SeDebugPrivilege` enabled on the
//!   process token; acquisition actually toggles the privilege.
//!
//! Privilege acquisition failure is reported, never fatal: the agent starts
//! degraded and attribution falls back to null identities.

/// Outcome of a privilege acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivilegeStatus {
    /// All required privileges are held.
    Acquired,
    /// Some privileges are missing; the payload names what was not obtained.
    Partial(String),
    /// Nothing could be acquired.
    Denied(String),
}

impl PrivilegeStatus {
    pub fn is_acquired(&self) -> bool {
        matches!(self, PrivilegeStatus::Acquired)
    }
}

/// Platform operations the agent depends on.
pub trait Platform: Send + Sync {
    /// Platform identifier: "linux", "macos", "windows".
    fn platform_name(&self) -> &'static str;

    /// Whether the process runs with elevated privileges (root /
    /// Administrator).
    fn is_elevated(&self) -> bool;

    /// Attempts to acquire the privileges needed for capture and
    /// attribution. Never fails the process.
    fn acquire_capture_privileges(&self) -> PrivilegeStatus;
}

/// Unix implementation.
#[cfg(unix)]
pub struct UnixPlatform;

#[cfg(unix)]
impl UnixPlatform {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl Default for UnixPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl Platform for UnixPlatform {
    fn platform_name(&self) -> &'static str {
        if cfg!(target_os = "macos") {
            "macos"
        } else {
            "linux"
        }
    }

    fn is_elevated(&self) -> bool {
        // Safety: geteuid has no preconditions and cannot fail.
        unsafe { libc::geteuid() == 0 }
    }

    fn acquire_capture_privileges(&self) -> PrivilegeStatus {
        if self.is_elevated() {
            PrivilegeStatus::Acquired
        } else {
            // Unprivileged: raw capture and cross-user /proc reads will fail.
            PrivilegeStatus::Denied(
                "not running as root; raw capture and cross-user attribution unavailable"
                    .to_string(),
            )
        }
    }
}

/// Windows implementation: enables SeDebugPrivilege on the process token.
#[cfg(windows)]
pub struct WindowsPlatform;

#[cfg(windows)]
impl WindowsPlatform {
    pub fn new() -> Self {
        Self
    }

    fn enable_debug_privilege() -> Result<(), String> {
        use std::ptr;
        use winapi::um::handleapi::CloseHandle;
        use winapi::um::processthreadsapi::{GetCurrentProcess, OpenProcessToken};
        use winapi::um::securitybaseapi::AdjustTokenPrivileges;
        use winapi::um::winbase::LookupPrivilegeValueW;
        use winapi::um::winnt::{
            LUID_AND_ATTRIBUTES, SE_PRIVILEGE_ENABLED, TOKEN_ADJUST_PRIVILEGES, TOKEN_PRIVILEGES,
            TOKEN_QUERY,
        };

        let name: Vec<u16> = "SeDebugPrivilege\0".encode_utf16().collect();

        unsafe {
            let mut token = ptr::null_mut();
            if OpenProcessToken(
                GetCurrentProcess(),
                TOKEN_ADJUST_PRIVILEGES | TOKEN_QUERY,
                &mut token,
            ) == 0
            {
                return Err("OpenProcessToken failed".to_string());
            }

            let mut luid = std::mem::zeroed();
            if LookupPrivilegeValueW(ptr::null(), name.as_ptr(), &mut luid) == 0 {
                CloseHandle(token);
                return Err("LookupPrivilegeValue failed for SeDebugPrivilege".to_string());
            }

            let mut privileges = TOKEN_PRIVILEGES {
                PrivilegeCount: 1,
                Privileges: [LUID_AND_ATTRIBUTES {
                    Luid: luid,
                    Attributes: SE_PRIVILEGE_ENABLED,
                }],
            };

            let ok = AdjustTokenPrivileges(
                token,
                0,
                &mut privileges,
                0,
                ptr::null_mut(),
                ptr::null_mut(),
            );
            CloseHandle(token);

            if ok == 0 {
                Err("AdjustTokenPrivileges failed".to_string())
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(windows)]
impl Default for WindowsPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(windows)]
impl Platform for WindowsPlatform {
    fn platform_name(&self) -> &'static str {
        "windows"
    }

    fn is_elevated(&self) -> bool {
        // Administrator detection is folded into the privilege probe; a
        // non-admin token cannot enable SeDebugPrivilege.
        Self::enable_debug_privilege().is_ok()
    }

    fn acquire_capture_privileges(&self) -> PrivilegeStatus {
        match Self::enable_debug_privilege() {
            Ok(()) => PrivilegeStatus::Acquired,
            Err(e) => PrivilegeStatus::Denied(format!("SeDebugPrivilege unavailable: {}", e)),
        }
    }
}

// === Platform Selection ===

#[cfg(unix)]
type PlatformImpl = UnixPlatform;

#[cfg(windows)]
type PlatformImpl = WindowsPlatform;

/// Creates the platform-specific implementation for the current OS.
pub fn create_platform() -> Box<dyn Platform> {
    Box::new(PlatformImpl::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_platform() {
        let platform = create_platform();
        assert!(!platform.platform_name().is_empty());
    }

    #[test]
    fn test_privilege_probe_never_panics() {
        let platform = create_platform();
        let status = platform.acquire_capture_privileges();
        match status {
            PrivilegeStatus::Acquired => assert!(platform.is_elevated()),
            PrivilegeStatus::Partial(reason) | PrivilegeStatus::Denied(reason) => {
                assert!(!reason.is_empty());
            }
        }
    }
}
