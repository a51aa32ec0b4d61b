// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Responder dispatch engine.
//!
//! # Architecture
//!
//! ```text
//! transport thread (one per transport)
//!     Transport::run -> sink(probe, src)
//!         v
//!     DedupCache::try_claim ---------------> DUPLICATE (dropped)
//!         v NEW
//!     naked filter (optional) -------------> NAKED_FILTERED (marked handled)
//!         v
//!     WorkerPool::submit ------------------> REJECTED (claim released)
//!         v DISPATCHED
//! worker thread
//!     every RegistryHandler::handle(probe)   (a panic skips that handler only)
//!         -> drop services XML cannot carry
//!         -> skip empty responses
//!         -> encode in the probe's payload type
//!         -> ResponseDeliverer::deliver (per DeliveryPolicy)
//!     DedupCache::mark_handled              HANDLED
//! ```

mod dedup;
mod delivery;
mod monitor;
mod pool;

pub use crate::config::DeliveryPolicy;
pub use dedup::{DedupCache, DEFAULT_DEDUP_WINDOW};
pub use delivery::{DeliveryOutcome, ResponseDeliverer};
pub use monitor::{PoolMonitor, PoolStats, ThroughputWindow};
pub use pool::{Job, RejectionPolicy, Submission, WorkerPool};

use crate::config::ResponderConfig;
use crate::error::Error;
use crate::registry::{HandlerRegistry, RegistryHandler};
use crate::transport::{ProbeSink, Transport, TransportRegistry};
use crate::types::Probe;
use crate::wire;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How often the receive path purges the dedup cache.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// What the engine did with a received probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeDisposition {
    /// Same id seen within the dedup window.
    Duplicate,
    /// Naked probe dropped because naked probes are rejected.
    NakedFiltered,
    /// Handed to the worker pool.
    Dispatched,
    /// Worker pool refused the probe.
    Rejected,
}

/// Engine counters.
#[derive(Debug, Default)]
pub struct ResponderStats {
    pub received: AtomicU64,
    pub duplicates: AtomicU64,
    pub naked_filtered: AtomicU64,
    pub dispatched: AtomicU64,
    pub rejected: AtomicU64,
    pub handled: AtomicU64,
    pub responses_sent: AtomicU64,
    pub delivery_failures: AtomicU64,
}

impl ResponderStats {
    pub fn snapshot(&self) -> ResponderStatsSnapshot {
        ResponderStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            naked_filtered: self.naked_filtered.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            responses_sent: self.responses_sent.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            pool: PoolStats::default(),
        }
    }
}

/// Point-in-time copy of [`ResponderStats`] plus pool state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponderStatsSnapshot {
    pub received: u64,
    pub duplicates: u64,
    pub naked_filtered: u64,
    pub dispatched: u64,
    pub rejected: u64,
    pub handled: u64,
    pub responses_sent: u64,
    pub delivery_failures: u64,
    pub pool: PoolStats,
}

/// State shared between receive threads and workers.
struct Core {
    handlers: Vec<Arc<dyn RegistryHandler>>,
    dedup: DedupCache,
    deliverer: ResponseDeliverer,
    stats: ResponderStats,
    reject_naked: bool,
    last_purge: Mutex<Instant>,
}

impl Core {
    /// Run every handler and deliver non-empty responses. A handler that
    /// panics is logged and skipped; the others still answer.
    fn handle(&self, probe: Probe) {
        for handler in &self.handlers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&probe)));
            let mut response = match outcome {
                Ok(response) => response,
                Err(payload) => {
                    log::error!(
                        "[DISPATCH] handler {} panicked on probe {}: {}",
                        handler.name(),
                        probe.probe_id,
                        pool::panic_message(payload.as_ref())
                    );
                    continue;
                }
            };
            let dropped = response.retain_encodable();
            if !dropped.is_empty() {
                log::warn!(
                    "[DISPATCH] {} returned services XML cannot carry, dropped: {:?}",
                    handler.name(),
                    dropped
                );
            }
            if response.is_empty() {
                continue;
            }
            let body = wire::encode_response(&response, probe.payload_type);
            let outcome = self.deliverer.deliver(&probe, &body);
            self.stats
                .responses_sent
                .fetch_add(outcome.delivered as u64, Ordering::Relaxed);
            self.stats
                .delivery_failures
                .fetch_add(outcome.failures.len() as u64, Ordering::Relaxed);
            log::debug!(
                "[DISPATCH] {} answered probe {} with {} services ({} delivered)",
                handler.name(),
                probe.probe_id,
                response.len(),
                outcome.delivered
            );
        }
        self.dedup.mark_handled(&probe.probe_id, Instant::now());
        self.stats.handled.fetch_add(1, Ordering::Relaxed);
    }

    fn maybe_purge(&self, now: Instant) {
        if let Some(mut last) = self.last_purge.try_lock() {
            if now.saturating_duration_since(*last) >= PURGE_INTERVAL {
                *last = now;
                let removed = self.dedup.purge_expired(now);
                if removed > 0 {
                    log::debug!("[DISPATCH] purged {} expired probe ids", removed);
                }
            }
        }
    }
}

/// The responder: transports in, handlers and HTTP delivery out.
pub struct Responder {
    core: Arc<Core>,
    pool: Arc<WorkerPool>,
    transports: Vec<Arc<dyn Transport>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    monitor: Mutex<Option<PoolMonitor>>,
    monitor_config: crate::config::MonitorConfig,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl Responder {
    /// Build an engine from already-constructed plugins.
    ///
    /// # Errors
    /// `Error::NothingLoaded` when either list is empty; configuration
    /// errors from the delivery client; I/O errors spawning workers.
    pub fn new(
        config: &ResponderConfig,
        transports: Vec<Arc<dyn Transport>>,
        handlers: Vec<Arc<dyn RegistryHandler>>,
    ) -> Result<Self, Error> {
        config.validate()?;
        if transports.is_empty() {
            return Err(Error::NothingLoaded("transport"));
        }
        if handlers.is_empty() {
            return Err(Error::NothingLoaded("handler"));
        }

        let deliverer = ResponseDeliverer::new(&config.delivery, &config.tls)?;
        let pool = WorkerPool::new(
            "des-worker",
            config.pool_size,
            config.queue_capacity,
            config.rejection_policy,
            config.monitor.window,
        )?;

        Ok(Self {
            core: Arc::new(Core {
                handlers,
                dedup: DedupCache::default(),
                deliverer,
                stats: ResponderStats::default(),
                reject_naked: config.reject_naked_probes,
                last_purge: Mutex::new(Instant::now()),
            }),
            pool: Arc::new(pool),
            transports,
            threads: Mutex::new(Vec::new()),
            monitor: Mutex::new(None),
            monitor_config: config.monitor.clone(),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// Load plugins through the registries and build the engine.
    ///
    /// A plugin that fails to load is logged and skipped; the engine still
    /// refuses to exist without at least one transport and one handler.
    pub fn from_config(
        config: &ResponderConfig,
        transports: &TransportRegistry,
        handlers: &HandlerRegistry,
    ) -> Result<Self, Error> {
        let mut loaded_transports = Vec::new();
        for spec in &config.transports {
            match transports.create(spec) {
                Ok(t) => {
                    log::info!("[DISPATCH] loaded transport {}", t.describe());
                    loaded_transports.push(t);
                }
                Err(e) => log::error!("[DISPATCH] transport '{}' failed to load: {}", spec.kind, e),
            }
        }

        let mut loaded_handlers = Vec::new();
        for spec in &config.handlers {
            match handlers.create(spec) {
                Ok(h) => {
                    log::info!("[DISPATCH] loaded handler {}", h.name());
                    loaded_handlers.push(h);
                }
                Err(e) => log::error!("[DISPATCH] handler '{}' failed to load: {}", spec.kind, e),
            }
        }

        Self::new(config, loaded_transports, loaded_handlers)
    }

    /// Spawn one receive thread per transport (and the monitor if enabled).
    pub fn start(&self) -> Result<(), Error> {
        if self.stopped.load(Ordering::Acquire) || self.started.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyRunning);
        }

        let mut threads = self.threads.lock();
        for (i, transport) in self.transports.iter().enumerate() {
            let transport = Arc::clone(transport);
            let sink = self.sink();
            let handle = std::thread::Builder::new()
                .name(format!("des-rx-{}", i))
                .spawn(move || {
                    let name = transport.describe();
                    log::debug!("[DISPATCH] receiving on {}", name);
                    if let Err(e) = transport.run(sink) {
                        log::error!("[DISPATCH] transport {} stopped: {}", name, e);
                    }
                })?;
            threads.push(handle);
        }

        if self.monitor_config.enabled {
            let interval = Duration::from_secs(self.monitor_config.interval_secs);
            *self.monitor.lock() = Some(PoolMonitor::spawn(Arc::clone(&self.pool), interval)?);
        }

        log::info!(
            "[DISPATCH] responder started: {} transports, {} handlers, {} workers",
            self.transports.len(),
            self.core.handlers.len(),
            self.pool.size()
        );
        Ok(())
    }

    /// Callback handed to every transport.
    pub fn sink(&self) -> ProbeSink {
        let core = Arc::clone(&self.core);
        let pool = Arc::clone(&self.pool);
        Arc::new(move |probe: Probe, src: SocketAddr| {
            Self::dispatch(&core, &pool, probe, src);
        })
    }

    /// Feed one probe through the engine as if a transport received it.
    pub fn process(&self, probe: Probe, src: SocketAddr) -> ProbeDisposition {
        Self::dispatch(&self.core, &self.pool, probe, src)
    }

    fn dispatch(core: &Arc<Core>, pool: &WorkerPool, probe: Probe, src: SocketAddr) -> ProbeDisposition {
        let now = Instant::now();
        core.stats.received.fetch_add(1, Ordering::Relaxed);
        core.maybe_purge(now);

        if !core.dedup.try_claim(&probe.probe_id, now) {
            core.stats.duplicates.fetch_add(1, Ordering::Relaxed);
            log::debug!("[DISPATCH] duplicate probe {} from {}", probe.probe_id, src);
            return ProbeDisposition::Duplicate;
        }

        if core.reject_naked && probe.is_naked() {
            core.stats.naked_filtered.fetch_add(1, Ordering::Relaxed);
            core.dedup.mark_handled(&probe.probe_id, now);
            log::info!("[DISPATCH] naked probe {} from {} filtered", probe.probe_id, src);
            return ProbeDisposition::NakedFiltered;
        }

        let probe_id = probe.probe_id.clone();
        let worker_core = Arc::clone(core);
        match pool.submit(Box::new(move || worker_core.handle(probe))) {
            Submission::Queued | Submission::RanInline => {
                core.stats.dispatched.fetch_add(1, Ordering::Relaxed);
                ProbeDisposition::Dispatched
            }
            Submission::Rejected => {
                core.stats.rejected.fetch_add(1, Ordering::Relaxed);
                core.dedup.release(&probe_id);
                log::warn!(
                    "[DISPATCH] worker queue full, probe {} from {} dropped",
                    probe_id,
                    src
                );
                ProbeDisposition::Rejected
            }
        }
    }

    pub fn stats(&self) -> ResponderStatsSnapshot {
        let mut snapshot = self.core.stats.snapshot();
        snapshot.pool = self.pool.stats();
        snapshot
    }

    pub fn transports(&self) -> &[Arc<dyn Transport>] {
        &self.transports
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire) && !self.stopped.load(Ordering::Acquire)
    }

    /// Graceful stop: close transports, finish queued probes, join threads.
    pub fn shutdown(&self) {
        if self.stop_intake() {
            self.pool.shutdown();
            log::info!("[DISPATCH] responder stopped");
        }
    }

    /// Forced stop: close transports, discard queued probes, join threads.
    pub fn shutdown_now(&self) {
        if self.stop_intake() {
            self.pool.shutdown_now();
            log::info!(
                "[DISPATCH] responder stopped, {} queued probes discarded",
                self.pool.discarded()
            );
        }
    }

    /// Stop transports, receive threads and monitor. Returns false if
    /// already stopped.
    fn stop_intake(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        for transport in &self.transports {
            transport.shutdown();
        }
        let threads: Vec<_> = self.threads.lock().drain(..).collect();
        for handle in threads {
            if handle.join().is_err() {
                log::error!("[DISPATCH] receive thread panicked");
            }
        }
        if let Some(mut monitor) = self.monitor.lock().take() {
            monitor.stop();
        }
        true
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        self.shutdown_now();
    }
}
