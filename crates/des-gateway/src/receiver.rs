// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Receiver side: TCP -> multicast group B.

use crate::stats::RelayStats;
use crate::GatewayError;
use des::net::{open_sender, resolve_interface, send_datagram, MAX_UDP_PAYLOAD};
use std::io::{self, Read};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// TTL for re-emitted datagrams, high enough to be routed onward.
pub const DEFAULT_RELAY_TTL: u8 = 32;

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Called with every complete payload read from a connection.
pub type PayloadHook = Arc<dyn Fn(&[u8]) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub group: Ipv4Addr,
    pub port: u16,
    pub listen: SocketAddr,
    pub interface: Option<String>,
    /// Receive but never re-emit.
    pub no_repeat: bool,
    pub relay_ttl: u8,
    /// Deliver re-emitted datagrams to listeners on this host.
    pub multicast_loopback: bool,
}

impl ReceiverConfig {
    pub fn new(group: Ipv4Addr, port: u16, listen_port: u16) -> Self {
        Self {
            group,
            port,
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, listen_port)),
            interface: None,
            no_repeat: false,
            relay_ttl: DEFAULT_RELAY_TTL,
            multicast_loopback: true,
        }
    }
}

pub struct GatewayReceiver {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    stats: Arc<RelayStats>,
    thread: Option<JoinHandle<()>>,
}

impl GatewayReceiver {
    pub fn start(config: ReceiverConfig) -> Result<Self, GatewayError> {
        Self::start_with_hook(config, None)
    }

    /// Like [`Self::start`], also handing every payload to `hook`.
    pub fn start_with_hook(
        config: ReceiverConfig,
        hook: Option<PayloadHook>,
    ) -> Result<Self, GatewayError> {
        let emitter = if config.no_repeat {
            None
        } else {
            let interface = resolve_interface(config.interface.as_deref())?;
            Some(Arc::new(open_sender(interface, config.multicast_loopback)?))
        };

        let listener = TcpListener::bind(config.listen)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(RelayStats::default());
        let target = SocketAddrV4::new(config.group, config.port);

        let thread = {
            let running = Arc::clone(&running);
            let stats = Arc::clone(&stats);
            let ttl = config.relay_ttl;
            std::thread::Builder::new()
                .name("des-gw-receiver".to_string())
                .spawn(move || {
                    accept_loop(&listener, &running, |stream, peer| {
                        let ctx = Connection {
                            emitter: emitter.clone(),
                            target,
                            ttl,
                            stats: Arc::clone(&stats),
                            hook: hook.clone(),
                        };
                        let spawned = std::thread::Builder::new()
                            .name("des-gw-conn".to_string())
                            .spawn(move || ctx.handle(stream, peer));
                        if let Err(e) = spawned {
                            log::error!("[GATEWAY] cannot spawn connection thread: {}", e);
                        }
                    });
                })?
        };

        log::info!(
            "[GATEWAY] listening on {}, repeating into {} (ttl {}{})",
            local_addr,
            target,
            config.relay_ttl,
            if config.no_repeat { ", no-repeat" } else { "" }
        );

        Ok(Self {
            local_addr,
            running,
            stats,
            thread: Some(thread),
        })
    }

    /// Bound listen address (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for GatewayReceiver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop<F>(listener: &TcpListener, running: &AtomicBool, mut on_accept: F)
where
    F: FnMut(TcpStream, SocketAddr),
{
    while running.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => on_accept(stream, peer),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => std::thread::sleep(ACCEPT_POLL),
            Err(e) => {
                log::warn!("[GATEWAY] accept failed: {}", e);
                std::thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

struct Connection {
    emitter: Option<Arc<UdpSocket>>,
    target: SocketAddrV4,
    ttl: u8,
    stats: Arc<RelayStats>,
    hook: Option<PayloadHook>,
}

impl Connection {
    fn handle(self, stream: TcpStream, peer: SocketAddr) {
        let payload = match read_to_end(stream) {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("[GATEWAY] read from {} failed: {}", peer, e);
                return;
            }
        };
        if payload.is_empty() {
            return;
        }
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        if let Some(hook) = &self.hook {
            hook(&payload);
        }

        let Some(emitter) = &self.emitter else {
            log::debug!("[GATEWAY] {} bytes from {} (no-repeat)", payload.len(), peer);
            return;
        };
        if payload.len() > MAX_UDP_PAYLOAD {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            log::warn!(
                "[GATEWAY] {} bytes from {} exceed one datagram, dropped",
                payload.len(),
                peer
            );
            return;
        }
        match send_datagram(emitter, self.target, &payload, self.ttl) {
            Ok(_) => {
                self.stats.record_relayed(payload.len());
                log::debug!("[GATEWAY] {} bytes from {} -> {}", payload.len(), peer, self.target);
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("[GATEWAY] repeat into {} failed: {}", self.target, e);
            }
        }
    }
}

/// Read until the peer closes its write side, keeping at most one byte
/// past the datagram limit.
fn read_to_end(stream: TcpStream) -> io::Result<Vec<u8>> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut payload = Vec::new();
    stream
        .take(MAX_UDP_PAYLOAD as u64 + 1)
        .read_to_end(&mut payload)?;
    Ok(payload)
}
