// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Replay Capture Backend
//!
//! A deterministic backend that replays canned frames and then times out
//! forever. Used by the unit and end-to-end tests to drive the full pipeline
//! without privileges or a kernel driver, and by the unavailable-platform
//! fallback.

use super::decoder::LinkLayer;
use super::filter::FilterExpression;
use super::{CaptureBackend, CaptureHandle};
use parking_lot::Mutex;
use sentinel_dlp_domain::error::DlpError;
use std::collections::VecDeque;

/// Replays a fixed frame sequence (IP framing, no Ethernet header).
pub struct ReplayBackend {
    frames: Mutex<Option<VecDeque<Vec<u8>>>>,
}

impl ReplayBackend {
    pub fn new(frames: Vec<Vec<u8>>) -> Self {
        Self {
            frames: Mutex::new(Some(frames.into())),
        }
    }
}

impl CaptureBackend for ReplayBackend {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn link_layer(&self) -> LinkLayer {
        LinkLayer::Ip
    }

    fn open(&self, _filter: &FilterExpression) -> Result<Box<dyn CaptureHandle>, DlpError> {
        let frames = self
            .frames
            .lock()
            .take()
            .ok_or_else(|| DlpError::driver_error("replay backend already opened"))?;
        Ok(Box::new(ReplayHandle { frames }))
    }
}

struct ReplayHandle {
    frames: VecDeque<Vec<u8>>,
}

impl CaptureHandle for ReplayHandle {
    fn next_frame(&mut self, buf: &mut [u8]) -> Result<Option<usize>, DlpError> {
        match self.frames.pop_front() {
            Some(frame) => {
                let len = frame.len().min(buf.len());
                buf[..len].copy_from_slice(&frame[..len]);
                Ok(Some(len))
            }
            None => {
                // Drained: behave like a quiet wire.
                std::thread::sleep(std::time::Duration::from_millis(10));
                Ok(None)
            }
        }
    }

    fn close(&mut self) {}
}

/// A backend for platforms with no native capture; `open` always fails so
/// the interceptor degrades in its documented way.
pub struct UnavailableBackend {
    platform: &'static str,
}

impl UnavailableBackend {
    pub fn new(platform: &'static str) -> Self {
        Self { platform }
    }
}

impl CaptureBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn link_layer(&self) -> LinkLayer {
        LinkLayer::Ip
    }

    fn open(&self, _filter: &FilterExpression) -> Result<Box<dyn CaptureHandle>, DlpError> {
        Err(DlpError::driver_error(format!(
            "no capture backend available on {}",
            self.platform
        )))
    }
}
