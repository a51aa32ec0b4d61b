// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay counters and their snapshots.

use std::sync::atomic::{AtomicU64, Ordering};

/// Relay counters shared by the loop thread and per-packet threads.
#[derive(Debug, Default)]
pub struct RelayStats {
    pub received: AtomicU64,
    pub relayed: AtomicU64,
    /// Datagrams discarded because they came from this host.
    pub looped_back: AtomicU64,
    pub failed: AtomicU64,
    /// Payload bytes relayed.
    pub bytes: AtomicU64,
}

impl RelayStats {
    pub fn record_relayed(&self, bytes: usize) {
        self.relayed.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            relayed: self.relayed.load(Ordering::Relaxed),
            looped_back: self.looped_back.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStatsSnapshot {
    pub received: u64,
    pub relayed: u64,
    pub looped_back: u64,
    pub failed: u64,
    pub bytes: u64,
}
