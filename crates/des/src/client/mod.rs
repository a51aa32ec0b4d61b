// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client side: sending probes and caching what comes back.

mod cache;

pub use cache::{ExpiringService, ResponseCache};

use crate::builder::split_probe;
use crate::error::Error;
use crate::transport::Transport;
use crate::types::Probe;
use std::sync::Arc;
use std::time::Duration;

/// Default spacing between copies of a burst.
pub const DEFAULT_BURST_INTERVAL: Duration = Duration::from_millis(50);

/// Sends probes through one transport, splitting them to its payload limit.
pub struct DiscoveryClient {
    transport: Arc<dyn Transport>,
    burst_interval: Duration,
}

impl DiscoveryClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            burst_interval: DEFAULT_BURST_INTERVAL,
        }
    }

    pub fn with_burst_interval(mut self, interval: Duration) -> Self {
        self.burst_interval = interval;
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Split `probe` for the transport and send every piece `copies` times.
    ///
    /// Copies of one piece share its probe id, so responders answer each
    /// piece once. Returns the number of messages sent. Nothing is sent if
    /// the probe cannot be split.
    pub fn send(&self, probe: &Probe, copies: usize) -> Result<usize, Error> {
        let copies = copies.max(1);
        let pieces = split_probe(probe, self.transport.max_payload_size())?;
        let mut sent = 0;
        for piece in &pieces {
            for copy in 0..copies {
                if sent > 0 && !self.burst_interval.is_zero() {
                    std::thread::sleep(self.burst_interval);
                }
                self.transport.send(piece)?;
                sent += 1;
                log::trace!(
                    "[CLIENT] sent probe {} copy {}/{}",
                    piece.probe_id,
                    copy + 1,
                    copies
                );
            }
        }
        log::debug!(
            "[CLIENT] probe {} sent as {} pieces x {} copies via {}",
            probe.probe_id,
            pieces.len(),
            copies,
            self.transport.describe()
        );
        Ok(sent)
    }
}
