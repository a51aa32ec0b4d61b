// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process transport.
//!
//! Inbound probes are injected with [`ChannelTransport::inject`]; probes
//! sent through the transport are recorded and can be drained with
//! [`ChannelTransport::take_sent`]. Useful for embedding a responder in the
//! same process as its clients and for deterministic tests.

use super::{ProbeSink, Transport};
use crate::error::TransportError;
use crate::types::Probe;
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default payload limit; large enough to exercise the splitter in tests
/// without forcing it.
pub const DEFAULT_CHANNEL_PAYLOAD: usize = 65_507;

pub struct ChannelTransport {
    inbound_tx: Sender<(Probe, SocketAddr)>,
    inbound_rx: Receiver<(Probe, SocketAddr)>,
    sent: Mutex<Vec<Probe>>,
    max_payload_size: usize,
    running: AtomicBool,
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_CHANNEL_PAYLOAD)
    }

    pub fn with_max_payload(max_payload_size: usize) -> Self {
        let (inbound_tx, inbound_rx) = unbounded();
        Self {
            inbound_tx,
            inbound_rx,
            sent: Mutex::new(Vec::new()),
            max_payload_size,
            running: AtomicBool::new(true),
        }
    }

    /// Queue a probe as if it arrived from `127.0.0.1:0`.
    pub fn inject(&self, probe: Probe) {
        self.inject_from(
            probe,
            SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)),
        );
    }

    pub fn inject_from(&self, probe: Probe, source: SocketAddr) {
        // Both channel ends live in `self`, so the send cannot fail.
        let _ = self.inbound_tx.send((probe, source));
    }

    /// Drain the probes sent so far.
    pub fn take_sent(&self) -> Vec<Probe> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl Transport for ChannelTransport {
    fn run(&self, sink: ProbeSink) -> Result<(), TransportError> {
        while self.running.load(Ordering::Acquire) {
            match self.inbound_rx.recv_timeout(POLL_INTERVAL) {
                Ok((probe, source)) => sink(probe, source),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(())
    }

    fn send(&self, probe: &Probe) -> Result<(), TransportError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let size = crate::wire::probe_encoded_len(probe);
        if size > self.max_payload_size {
            return Err(TransportError::PayloadTooLarge {
                size,
                limit: self.max_payload_size,
            });
        }
        self.sent.lock().push(probe.clone());
        Ok(())
    }

    fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
    }

    fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    fn describe(&self) -> String {
        format!("channel(max={})", self.max_payload_size)
    }
}
