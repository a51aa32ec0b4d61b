// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-size worker pool over a bounded crossbeam queue.
//!
//! Submission never blocks the receive threads: a full or closed queue is
//! resolved by the [`RejectionPolicy`] on the spot. A panicking job is
//! caught and logged; the worker that ran it keeps serving the queue.

use super::monitor::{PoolStats, ThroughputWindow};
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// Unit of work executed by a worker.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// What happens to a job the queue cannot take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionPolicy {
    /// Drop the job; the caller logs and accounts for it.
    #[default]
    Drop,
    /// Run the job on the submitting thread.
    CallerRuns,
}

/// Result of [`WorkerPool::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Queued,
    RanInline,
    Rejected,
}

struct Shared {
    active: AtomicUsize,
    completed: AtomicU64,
    rejected: AtomicU64,
    discarded: AtomicU64,
    panicked: AtomicU64,
    discard: AtomicBool,
    throughput: ThroughputWindow,
}

pub struct WorkerPool {
    size: usize,
    policy: RejectionPolicy,
    tx: RwLock<Option<Sender<Job>>>,
    rx: Receiver<Job>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Spawn `size` workers named `{name}-{i}` behind a queue of
    /// `capacity` jobs. `window` is the throughput sample size.
    pub fn new(
        name: &str,
        size: usize,
        capacity: usize,
        policy: RejectionPolicy,
        window: usize,
    ) -> io::Result<Self> {
        let size = size.max(1);
        let (tx, rx) = bounded::<Job>(capacity.max(1));
        let shared = Arc::new(Shared {
            active: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
            discard: AtomicBool::new(false),
            throughput: ThroughputWindow::new(window),
        });

        let mut workers = Vec::with_capacity(size);
        for i in 0..size {
            let rx = rx.clone();
            let shared = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name(format!("{}-{}", name, i))
                .spawn(move || Self::worker_loop(rx, shared))?;
            workers.push(handle);
        }
        log::debug!(
            "[POOL] {} started: {} workers, queue capacity {}",
            name,
            size,
            capacity
        );

        Ok(Self {
            size,
            policy,
            tx: RwLock::new(Some(tx)),
            rx,
            workers: Mutex::new(workers),
            shared,
        })
    }

    fn worker_loop(rx: Receiver<Job>, shared: Arc<Shared>) {
        // Ends once every sender is gone and the queue is empty.
        while let Ok(job) = rx.recv() {
            if shared.discard.load(Ordering::Acquire) {
                shared.discarded.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            Self::execute(&shared, job);
        }
    }

    fn execute(shared: &Shared, job: Job) {
        shared.active.fetch_add(1, Ordering::AcqRel);
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            shared.panicked.fetch_add(1, Ordering::Relaxed);
            log::error!("[POOL] job panicked: {}", panic_message(payload.as_ref()));
        }
        shared.active.fetch_sub(1, Ordering::AcqRel);
        shared.completed.fetch_add(1, Ordering::Relaxed);
        shared.throughput.record(Instant::now());
    }

    /// Hand a job to the pool without blocking.
    pub fn submit(&self, job: Job) -> Submission {
        let guard = self.tx.read();
        let rejected = match guard.as_ref() {
            Some(tx) => match tx.try_send(job) {
                Ok(()) => return Submission::Queued,
                Err(TrySendError::Full(job)) => Some(job),
                Err(TrySendError::Disconnected(_)) => None,
            },
            None => None,
        };
        drop(guard);

        match (self.policy, rejected) {
            (RejectionPolicy::CallerRuns, Some(job)) => {
                Self::execute(&self.shared, job);
                Submission::RanInline
            }
            _ => {
                self.shared.rejected.fetch_add(1, Ordering::Relaxed);
                Submission::Rejected
            }
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_closed(&self) -> bool {
        self.tx.read().is_none()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            pool_size: self.size,
            core_threads: self.size,
            active: self.shared.active.load(Ordering::Acquire),
            completed: self.shared.completed.load(Ordering::Relaxed),
            queued: self.rx.len(),
            rejected: self.shared.rejected.load(Ordering::Relaxed),
            probes_per_second: self.shared.throughput.rate_at(Instant::now()),
        }
    }

    /// Jobs dropped from the queue by [`Self::shutdown_now`].
    pub fn discarded(&self) -> u64 {
        self.shared.discarded.load(Ordering::Relaxed)
    }

    /// Jobs that panicked. They also count as completed.
    pub fn panicked(&self) -> u64 {
        self.shared.panicked.load(Ordering::Relaxed)
    }

    /// Stop accepting jobs, run everything already queued, join workers.
    pub fn shutdown(&self) {
        self.tx.write().take();
        self.join();
    }

    /// Stop accepting jobs, discard the queue, join workers. Jobs already
    /// running finish.
    pub fn shutdown_now(&self) {
        self.shared.discard.store(true, Ordering::Release);
        self.tx.write().take();
        self.join();
    }

    fn join(&self) {
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                log::error!("[POOL] worker panicked");
            }
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string payload"
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown_now();
    }
}
