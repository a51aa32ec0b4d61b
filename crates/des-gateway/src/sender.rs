// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sender side: multicast group A -> TCP.

use crate::stats::RelayStats;
use crate::GatewayError;
use des::net::{local_host_address, resolve_interface, MulticastSocket};
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub group: Ipv4Addr,
    pub port: u16,
    /// Interface name or IPv4 address; the local host address otherwise.
    pub interface: Option<String>,
    /// Relay datagrams originating from this host too.
    pub allow_loopback: bool,
    /// Paired [`crate::GatewayReceiver`].
    pub receiver: SocketAddr,
    pub connect_timeout: Duration,
}

impl SenderConfig {
    pub fn new(group: Ipv4Addr, port: u16, receiver: SocketAddr) -> Self {
        Self {
            group,
            port,
            interface: None,
            allow_loopback: false,
            receiver,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Whether a datagram from `src` should be relayed. With loop avoidance on,
/// datagrams whose source is one of `local` are dropped.
pub fn should_relay(src: IpAddr, local: &[Ipv4Addr], avoid_loopback: bool) -> bool {
    if !avoid_loopback {
        return true;
    }
    match src {
        IpAddr::V4(v4) => !local.contains(&v4),
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map_or(true, |v4| !local.contains(&v4)),
    }
}

/// Send `payload` as the whole content of one TCP connection.
pub fn forward(payload: &[u8], receiver: SocketAddr, timeout: Duration) -> std::io::Result<()> {
    let mut stream = TcpStream::connect_timeout(&receiver, timeout)?;
    stream.set_write_timeout(Some(timeout))?;
    stream.write_all(payload)?;
    stream.flush()?;
    stream.shutdown(Shutdown::Write)
}

pub struct GatewaySender {
    socket: Arc<MulticastSocket>,
    running: Arc<AtomicBool>,
    stats: Arc<RelayStats>,
    thread: Option<JoinHandle<()>>,
}

impl GatewaySender {
    /// Join group A and start relaying.
    pub fn start(config: SenderConfig) -> Result<Self, GatewayError> {
        let interface = resolve_interface(config.interface.as_deref())?;
        let socket = Arc::new(MulticastSocket::join(
            config.group,
            config.port,
            interface,
            true,
        )?);

        let mut local = vec![interface];
        if let Some(host) = local_host_address() {
            if host != interface {
                local.push(host);
            }
        }

        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(RelayStats::default());

        let thread = {
            let socket = Arc::clone(&socket);
            let running = Arc::clone(&running);
            let stats = Arc::clone(&stats);
            let avoid_loopback = !config.allow_loopback;
            let receiver = config.receiver;
            let timeout = config.connect_timeout;
            std::thread::Builder::new()
                .name("des-gw-sender".to_string())
                .spawn(move || {
                    let result = socket.recv_loop(&running, |data, src| {
                        stats.received.fetch_add(1, Ordering::Relaxed);
                        if !should_relay(src.ip(), &local, avoid_loopback) {
                            stats.looped_back.fetch_add(1, Ordering::Relaxed);
                            log::trace!("[GATEWAY] dropped own datagram from {}", src);
                            return;
                        }
                        relay(data.to_vec(), receiver, timeout, Arc::clone(&stats));
                    });
                    if let Err(e) = result {
                        log::error!("[GATEWAY] sender loop stopped: {}", e);
                    }
                })?
        };

        log::info!(
            "[GATEWAY] relaying {}:{} on {} to {} (loop avoidance {})",
            config.group,
            config.port,
            interface,
            config.receiver,
            if config.allow_loopback { "off" } else { "on" }
        );

        Ok(Self {
            socket,
            running,
            stats,
            thread: Some(thread),
        })
    }

    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        self.socket.leave();
    }
}

impl Drop for GatewaySender {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One short-lived thread per datagram.
fn relay(payload: Vec<u8>, receiver: SocketAddr, timeout: Duration, stats: Arc<RelayStats>) {
    let spawned = std::thread::Builder::new()
        .name("des-gw-forward".to_string())
        .spawn(move || match forward(&payload, receiver, timeout) {
            Ok(()) => {
                stats.record_relayed(payload.len());
                log::debug!("[GATEWAY] {} bytes -> {}", payload.len(), receiver);
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("[GATEWAY] forward to {} failed: {}", receiver, e);
            }
        });
    if let Err(e) = spawned {
        log::error!("[GATEWAY] cannot spawn forward thread: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_loop_avoidance() {
        let local = [Ipv4Addr::new(10, 0, 0, 5)];
        let own = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
        let other = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 6));

        assert!(!should_relay(own, &local, true));
        assert!(should_relay(other, &local, true));
        assert!(should_relay(own, &local, false));

        let mapped = IpAddr::V6(Ipv4Addr::new(10, 0, 0, 5).to_ipv6_mapped());
        assert!(!should_relay(mapped, &local, true));
        assert!(should_relay(IpAddr::V6(Ipv6Addr::LOCALHOST), &local, true));
    }

    #[test]
    fn test_forward_to_closed_port_fails() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        assert!(forward(b"x", addr, Duration::from_secs(1)).is_err());
    }
}
