// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # OS Socket Table Snapshot
//!
//! Reads the OS connection tables into a point-in-time snapshot mapping
//! sockets to owning PIDs:
//!
//! - TCP: full 5-tuple `(local ip, local port, remote ip, remote port)` per
//!   protocol, with a local-endpoint fallback for sockets observed before
//!   the table caught up.
//! - UDP: the OS only reports the local endpoint for unconnected sockets,
//!   so the UDP map keys on `(local ip, local port)`.
//!
//! The real provider wraps `netstat2`; tests substitute a canned provider.

use sentinel_dlp_domain::error::DlpError;
use std::collections::HashMap;
use std::net::IpAddr;

/// TCP connection key: local and remote endpoint.
pub type TcpKey = (IpAddr, u16, IpAddr, u16);
/// UDP socket key: local endpoint.
pub type UdpKey = (IpAddr, u16);

/// Point-in-time socket → PID snapshot.
#[derive(Debug, Clone, Default)]
pub struct SocketTableSnapshot {
    pub tcp: HashMap<TcpKey, u32>,
    /// Local-endpoint fallback for TCP (covers transient states where the
    /// remote side is not yet reported).
    pub tcp_local: HashMap<UdpKey, u32>,
    pub udp: HashMap<UdpKey, u32>,
}

impl SocketTableSnapshot {
    /// Looks up a TCP connection, falling back to the local endpoint.
    pub fn lookup_tcp(&self, local: (IpAddr, u16), remote: (IpAddr, u16)) -> Option<u32> {
        self.tcp
            .get(&(local.0, local.1, remote.0, remote.1))
            .or_else(|| self.tcp_local.get(&local))
            .copied()
    }

    pub fn lookup_udp(&self, local: (IpAddr, u16)) -> Option<u32> {
        self.udp.get(&local).copied()
    }

    pub fn len(&self) -> usize {
        self.tcp.len() + self.udp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tcp.is_empty() && self.udp.is_empty()
    }
}

/// Source of socket-table snapshots.
pub trait SocketTableProvider: Send + Sync {
    fn snapshot(&self) -> Result<SocketTableSnapshot, DlpError>;
}

/// `netstat2`-backed provider reading the live OS tables.
pub struct NetstatProvider;

impl NetstatProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NetstatProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketTableProvider for NetstatProvider {
    fn snapshot(&self) -> Result<SocketTableSnapshot, DlpError> {
        use netstat2::{AddressFamilyFlags, ProtocolFlags, ProtocolSocketInfo};

        let af = AddressFamilyFlags::IPV4 | AddressFamilyFlags::IPV6;
        let protocols = ProtocolFlags::TCP | ProtocolFlags::UDP;
        let sockets = netstat2::get_sockets_info(af, protocols)
            .map_err(|e| DlpError::io_error(format!("read OS socket tables: {}", e)))?;

        let mut snapshot = SocketTableSnapshot::default();
        for socket in sockets {
            let Some(&pid) = socket.associated_pids.first() else {
                continue;
            };
            match socket.protocol_socket_info {
                ProtocolSocketInfo::Tcp(tcp) => {
                    snapshot.tcp.insert(
                        (tcp.local_addr, tcp.local_port, tcp.remote_addr, tcp.remote_port),
                        pid,
                    );
                    snapshot.tcp_local.insert((tcp.local_addr, tcp.local_port), pid);
                }
                ProtocolSocketInfo::Udp(udp) => {
                    snapshot.udp.insert((udp.local_addr, udp.local_port), pid);
                }
            }
        }
        Ok(snapshot)
    }
}
