// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Probe deduplication.
//!
//! Clients burst several copies of each probe, so the same id usually
//! arrives more than once within milliseconds. An id is claimed atomically
//! at receive time; every later copy within the window is a duplicate.
//!
//! ```text
//! try_claim(id)  ->  NEW        (absent, or last seen > window ago)
//!                ->  DUPLICATE  (claimed or handled within window)
//! mark_handled   ->  refresh timestamp after the handler sweep
//! release        ->  forget a claim whose work was rejected
//! ```

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Default deduplication window (5 minutes).
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(300);

/// Concurrent map of recently seen probe ids.
#[derive(Debug)]
pub struct DedupCache {
    entries: DashMap<String, Instant>,
    window: Duration,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

impl DedupCache {
    pub fn new(window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Claim `id` for processing.
    ///
    /// Returns `true` if the caller owns the probe, `false` for a duplicate.
    /// The check and the insert happen under the same shard lock, so two
    /// concurrent copies cannot both win.
    pub fn try_claim(&self, id: &str, now: Instant) -> bool {
        match self.entries.entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                if now.saturating_duration_since(*entry.get()) >= self.window {
                    entry.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    /// Record that `id` was fully handled at `now`.
    pub fn mark_handled(&self, id: &str, now: Instant) {
        self.entries.insert(id.to_string(), now);
    }

    /// Forget a claim so a later copy of the probe can be served.
    pub fn release(&self, id: &str) {
        self.entries.remove(id);
    }

    /// Drop entries older than the window. Returns how many were removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, seen| now.saturating_duration_since(*seen) < self.window);
        before.saturating_sub(self.entries.len())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
