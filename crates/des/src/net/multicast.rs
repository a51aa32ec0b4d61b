// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! IPv4 multicast sockets and the mio receive loop shared by the multicast
//! transport and the gateway relay.
//!
//! ```text
//! mio::poll(100ms) -> recv_from(buf) -> on_datagram(&buf[..len], src)
//!        ^                                         |
//!        +------------- running flag --------------+
//! ```

use super::interface::describe_interface;
use crate::error::TransportError;
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Largest UDP payload over IPv4.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Poll timeout between running-flag checks.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

const SOCKET_TOKEN: Token = Token(0);

/// A UDP socket bound to the group port and joined to the group on one
/// interface.
#[derive(Debug)]
pub struct MulticastSocket {
    socket: UdpSocket,
    group: Ipv4Addr,
    port: u16,
    interface: Ipv4Addr,
    joined: AtomicBool,
}

impl MulticastSocket {
    /// Bind `0.0.0.0:port` with address reuse and join `group` on
    /// `interface`. A `port` of 0 binds an ephemeral port, see [`Self::port`].
    ///
    /// # Errors
    /// `TransportError::GroupJoin` carries a report of the interface's flags
    /// when the kernel refuses the membership.
    pub fn join(
        group: Ipv4Addr,
        port: u16,
        interface: Ipv4Addr,
        loopback: bool,
    ) -> Result<Self, TransportError> {
        if !group.is_multicast() {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not an IPv4 multicast group", group),
            )));
        }

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
        socket.set_reuse_port(true)?;
        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        socket.bind(&SockAddr::from(bind_addr))?;
        // Port 0 picks an ephemeral port; report the one actually bound.
        let port = socket
            .local_addr()?
            .as_socket()
            .map_or(port, |addr| addr.port());

        if let Err(source) = socket.join_multicast_v4(&group, &interface) {
            let diagnostics = describe_interface(interface);
            log::error!(
                "[MCAST] join {} on {} failed: {}\n{}",
                group,
                interface,
                source,
                diagnostics
            );
            return Err(TransportError::GroupJoin {
                group,
                interface,
                diagnostics,
                source,
            });
        }
        socket.set_multicast_if_v4(&interface)?;
        socket.set_multicast_loop_v4(loopback)?;

        log::debug!(
            "[MCAST] joined {}:{} on interface {} (loopback={})",
            group,
            port,
            interface,
            loopback
        );

        Ok(Self {
            socket: socket.into(),
            group,
            port,
            interface,
            joined: AtomicBool::new(true),
        })
    }

    pub fn group(&self) -> Ipv4Addr {
        self.group
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn interface(&self) -> Ipv4Addr {
        self.interface
    }

    pub fn group_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.group, self.port)
    }

    /// Send one datagram to the group with the given TTL.
    pub fn send(&self, payload: &[u8], ttl: u8) -> Result<usize, TransportError> {
        send_datagram(&self.socket, self.group_addr(), payload, ttl)
    }

    /// Leave the group. Idempotent.
    pub fn leave(&self) {
        if self.joined.swap(false, Ordering::AcqRel) {
            match self.socket.leave_multicast_v4(&self.group, &self.interface) {
                Ok(()) => log::debug!("[MCAST] left {} on {}", self.group, self.interface),
                Err(e) => log::debug!("[MCAST] leave {} failed: {}", self.group, e),
            }
        }
    }

    /// Run the receive loop until `running` is cleared.
    pub fn recv_loop<F>(&self, running: &AtomicBool, on_datagram: F) -> io::Result<()>
    where
        F: FnMut(&[u8], SocketAddr),
    {
        recv_loop(&self.socket, running, on_datagram)
    }
}

impl Drop for MulticastSocket {
    fn drop(&mut self) {
        self.leave();
    }
}

/// Unbound sender socket for emitting into a group without receiving from
/// it.
pub fn open_sender(interface: Ipv4Addr, loopback: bool) -> Result<UdpSocket, TransportError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_multicast_if_v4(&interface)?;
    socket.set_multicast_loop_v4(loopback)?;
    socket.bind(&SockAddr::from(SocketAddrV4::new(interface, 0)))?;
    Ok(socket.into())
}

/// Send `payload` to `target` after applying the multicast TTL.
pub fn send_datagram(
    socket: &UdpSocket,
    target: SocketAddrV4,
    payload: &[u8],
    ttl: u8,
) -> Result<usize, TransportError> {
    if payload.len() > MAX_UDP_PAYLOAD {
        return Err(TransportError::PayloadTooLarge {
            size: payload.len(),
            limit: MAX_UDP_PAYLOAD,
        });
    }
    socket.set_multicast_ttl_v4(u32::from(ttl))?;
    let sent = socket.send_to(payload, target)?;
    log::trace!("[MCAST] sent {} bytes to {} ttl={}", sent, target, ttl);
    Ok(sent)
}

/// mio-driven receive loop over a std socket.
///
/// Returns when `running` is cleared; poll errors other than `Interrupted`
/// are logged and retried.
pub fn recv_loop<F>(socket: &UdpSocket, running: &AtomicBool, mut on_datagram: F) -> io::Result<()>
where
    F: FnMut(&[u8], SocketAddr),
{
    let clone = socket.try_clone()?;
    clone.set_nonblocking(true)?;
    let mut mio_socket = mio::net::UdpSocket::from_std(clone);

    let mut poll = Poll::new()?;
    poll.registry()
        .register(&mut mio_socket, SOCKET_TOKEN, Interest::READABLE)?;
    let mut events = Events::with_capacity(16);
    let mut buf = vec![0u8; MAX_UDP_PAYLOAD];

    while running.load(Ordering::Relaxed) {
        if let Err(e) = poll.poll(&mut events, Some(POLL_TIMEOUT)) {
            if e.kind() != io::ErrorKind::Interrupted {
                log::debug!("[MCAST] poll error: {:?}", e);
            }
            continue;
        }

        for event in events.iter() {
            if event.token() != SOCKET_TOKEN {
                continue;
            }
            // Drain everything readable.
            loop {
                let (len, src) = match mio_socket.recv_from(&mut buf) {
                    Ok(result) => result,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        log::debug!("[MCAST] recv_from error: {:?}", e);
                        break;
                    }
                };
                log::trace!("[MCAST] recv len={} src={}", len, src);
                on_datagram(&buf[..len], src);
            }
        }
    }
    let _ = poll.registry().deregister(&mut mio_socket);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_rejects_unicast_group() {
        let err = MulticastSocket::join(Ipv4Addr::new(10, 0, 0, 1), 0, Ipv4Addr::LOCALHOST, true)
            .unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[test]
    fn test_oversized_datagram_rejected() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let target = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9);
        let err = send_datagram(&socket, target, &vec![0u8; MAX_UDP_PAYLOAD + 1], 1).unwrap_err();
        assert!(matches!(
            err,
            TransportError::PayloadTooLarge {
                limit: MAX_UDP_PAYLOAD,
                ..
            }
        ));
    }

    #[test]
    fn test_recv_loop_delivers_and_stops() {
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = rx.local_addr().unwrap();
        let running = Arc::new(AtomicBool::new(true));
        let (tx_done, rx_done) = crossbeam::channel::bounded::<Vec<u8>>(1);

        let running_loop = Arc::clone(&running);
        let handle = std::thread::spawn(move || {
            recv_loop(&rx, &running_loop, |bytes, _src| {
                let _ = tx_done.try_send(bytes.to_vec());
            })
        });

        let tx = UdpSocket::bind("127.0.0.1:0").unwrap();
        let got = loop {
            tx.send_to(b"<probe/>", addr).unwrap();
            if let Ok(bytes) = rx_done.recv_timeout(Duration::from_millis(200)) {
                break bytes;
            }
        };
        assert_eq!(got, b"<probe/>");

        running.store(false, Ordering::Relaxed);
        handle.join().unwrap().unwrap();
    }
}
