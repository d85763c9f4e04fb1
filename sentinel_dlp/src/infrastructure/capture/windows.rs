// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Windows WinDivert-Class Backend
//!
//! Surface for a WinDivert-class driver. The core does not bundle the driver
//! binaries; `open` probes for the driver's device path and fails with a
//! `DriverError` when it is not installed, which drives the interceptor's
//! documented degraded path. The filter handed to the driver uses the
//! WinDivert filter language rendered by
//! [`FilterExpression::to_windivert`].

use super::decoder::LinkLayer;
use super::filter::FilterExpression;
use super::{CaptureBackend, CaptureHandle};
use sentinel_dlp_domain::error::DlpError;

const DRIVER_DEVICE: &str = r"\\.\WinDivert";

/// WinDivert-class capture backend.
pub struct WinDivertBackend;

impl WinDivertBackend {
    pub fn new() -> Self {
        Self
    }

    fn probe_driver() -> Result<(), DlpError> {
        // Opening the device path succeeds only when the driver service is
        // installed and running.
        match std::fs::OpenOptions::new().read(true).open(DRIVER_DEVICE) {
            Ok(_) => Ok(()),
            Err(e) => Err(DlpError::driver_error(format!(
                "WinDivert driver unavailable at {}: {}",
                DRIVER_DEVICE, e
            ))),
        }
    }
}

impl Default for WinDivertBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for WinDivertBackend {
    fn name(&self) -> &'static str {
        "windivert"
    }

    fn link_layer(&self) -> LinkLayer {
        // WinDivert delivers packets starting at the IP header.
        LinkLayer::Ip
    }

    fn open(&self, filter: &FilterExpression) -> Result<Box<dyn CaptureHandle>, DlpError> {
        Self::probe_driver()?;
        tracing::info!(filter = %filter.to_windivert(), "WinDivert capture requested");
        // Driver handle plumbing (WinDivertOpen/WinDivertRecv) binds here
        // when the driver feature ships; the probe above gates it.
        Err(DlpError::driver_error(
            "WinDivert handle support not bundled in this build",
        ))
    }
}

/// Placeholder handle type for the driver build.
#[allow(dead_code)]
struct WinDivertHandle;

#[allow(dead_code)]
impl CaptureHandle for WinDivertHandle {
    fn next_frame(&mut self, _buf: &mut [u8]) -> Result<Option<usize>, DlpError> {
        Err(DlpError::driver_error("WinDivert handle not open"))
    }

    fn close(&mut self) {}
}
