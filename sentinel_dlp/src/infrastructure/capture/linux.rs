// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Linux AF_PACKET Backend
//!
//! Raw-socket capture via `AF_PACKET`/`SOCK_RAW` with `ETH_P_ALL`. The
//! kernel-side filter on Linux is coarse (AF_PACKET delivers everything);
//! the monitored-port and prefix tests run in the interceptor's user-space
//! path, which is the semantic contract across backends anyway.
//!
//! Requires root or `CAP_NET_RAW`; without it `open` fails and the
//! interceptor degrades.

use super::decoder::LinkLayer;
use super::filter::FilterExpression;
use super::{CaptureBackend, CaptureHandle};
use sentinel_dlp_domain::error::DlpError;
use socket2::{Domain, Protocol, Socket, Type};
use std::mem::MaybeUninit;
use std::time::Duration;
use tracing::info;

/// AF_PACKET capture backend.
pub struct AfPacketBackend {
    read_timeout: Duration,
}

impl AfPacketBackend {
    pub fn new() -> Self {
        Self {
            // Short timeout keeps the capture loop responsive to shutdown.
            read_timeout: Duration::from_millis(200),
        }
    }
}

impl Default for AfPacketBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for AfPacketBackend {
    fn name(&self) -> &'static str {
        "af_packet"
    }

    fn link_layer(&self) -> LinkLayer {
        LinkLayer::Ethernet
    }

    fn open(&self, filter: &FilterExpression) -> Result<Box<dyn CaptureHandle>, DlpError> {
        // ETH_P_ALL must be passed in network byte order.
        let protocol = (libc::ETH_P_ALL as u16).to_be() as i32;
        let socket = Socket::new(Domain::PACKET, Type::RAW, Some(Protocol::from(protocol)))
            .map_err(|e| {
                DlpError::driver_error(format!("AF_PACKET socket open failed (need CAP_NET_RAW): {}", e))
            })?;
        socket
            .set_read_timeout(Some(self.read_timeout))
            .map_err(|e| DlpError::driver_error(format!("set read timeout: {}", e)))?;

        info!(filter = %filter.to_bpf(), "AF_PACKET capture opened");
        Ok(Box::new(AfPacketHandle { socket: Some(socket) }))
    }
}

struct AfPacketHandle {
    socket: Option<Socket>,
}

impl CaptureHandle for AfPacketHandle {
    fn next_frame(&mut self, buf: &mut [u8]) -> Result<Option<usize>, DlpError> {
        let Some(socket) = self.socket.as_ref() else {
            return Err(DlpError::driver_error("capture handle closed"));
        };

        // Safety contract of recv: it writes initialized bytes into the
        // buffer and returns how many.
        let recv_buf = unsafe {
            std::slice::from_raw_parts_mut(buf.as_mut_ptr() as *mut MaybeUninit<u8>, buf.len())
        };
        match socket.recv(recv_buf) {
            Ok(len) => Ok(Some(len)),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(DlpError::driver_error(format!("AF_PACKET recv failed: {}", e))),
        }
    }

    fn close(&mut self) {
        self.socket = None;
    }
}
