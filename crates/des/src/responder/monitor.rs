// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Worker pool monitoring.

use super::pool::WorkerPool;
use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Point-in-time view of the worker pool.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoolStats {
    pub pool_size: usize,
    /// Threads kept alive when idle; equal to `pool_size` for a fixed pool.
    pub core_threads: usize,
    pub active: usize,
    pub completed: u64,
    pub queued: usize,
    pub rejected: u64,
    pub probes_per_second: f64,
}

/// The last N completion timestamps.
///
/// The rate is the number of retained completions inside the trailing
/// second, so it saturates at N per second.
#[derive(Debug)]
pub struct ThroughputWindow {
    capacity: usize,
    times: Mutex<VecDeque<Instant>>,
}

impl ThroughputWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            times: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, at: Instant) {
        let mut times = self.times.lock();
        if times.len() == self.capacity {
            times.pop_front();
        }
        times.push_back(at);
    }

    /// Completions per second ending at `now`.
    pub fn rate_at(&self, now: Instant) -> f64 {
        let horizon = Duration::from_secs(1);
        self.times
            .lock()
            .iter()
            .rev()
            .take_while(|t| now.saturating_duration_since(**t) <= horizon)
            .count() as f64
    }
}

/// Thread logging [`PoolStats`] at a fixed interval.
pub struct PoolMonitor {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl PoolMonitor {
    pub fn spawn(pool: Arc<WorkerPool>, interval: Duration) -> io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name("des-pool-monitor".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let s = pool.stats();
                        log::info!(
                            "[POOL] size={} core={} active={} completed={} queued={} rejected={} rate={:.1}/s",
                            s.pool_size,
                            s.core_threads,
                            s.active,
                            s.completed,
                            s.queued,
                            s.rejected,
                            s.probes_per_second
                        );
                    }
                    _ => break,
                }
            })?;
        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PoolMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_counts_trailing_second() {
        let window = ThroughputWindow::new(100);
        let start = Instant::now();
        for i in 0..10 {
            window.record(start + Duration::from_millis(i * 300));
        }
        // 1800, 2100, 2400 and 2700 ms lie within one second of 2700 ms.
        let now = start + Duration::from_millis(2700);
        assert_eq!(window.rate_at(now), 4.0);
        assert_eq!(window.rate_at(now + Duration::from_secs(5)), 0.0);
    }

    #[test]
    fn test_window_capacity_bounds_rate() {
        let window = ThroughputWindow::new(3);
        let now = Instant::now();
        for _ in 0..10 {
            window.record(now);
        }
        assert_eq!(window.rate_at(now), 3.0);
    }
}
