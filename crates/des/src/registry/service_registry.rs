// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! File-backed service registry.
//!
//! The service list lives behind an `ArcSwap`: workers load the current
//! snapshot without locking while a reload swaps in a new list atomically.
//! A reader sees either the old list or the new one, never a mix.
//!
//! The file is a JSON array of services in the wire JSON shape:
//!
//! ```json
//! [{"id": "weather-eu", "serviceContractID": "urn:contract:weather",
//!   "serviceName": "Weather EU", "consumability": "MACHINE_CONSUMABLE",
//!   "ttl": 60, "accessPoints": [{"label": "rest", "url": "http://10.0.0.5/api"}]}]
//! ```

use super::RegistryHandler;
use crate::config::parse_settings;
use crate::error::{ConfigError, Error};
use crate::types::{Probe, Response, Service};
use crate::wire::json::services_from_json;
use arc_swap::ArcSwap;
use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

/// `[handlers.settings]` for `kind = "service-registry"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceRegistrySettings {
    /// JSON service list.
    pub path: PathBuf,

    /// Poll the file's mtime this often and reload on change; 0 disables.
    #[serde(default)]
    pub reload_interval_secs: u64,

    #[serde(default = "default_name")]
    pub name: String,
}

fn default_name() -> String {
    "service-registry".to_string()
}

pub struct ServiceRegistryHandler {
    name: String,
    services: Arc<ArcSwap<Vec<Service>>>,
    path: Option<PathBuf>,
    watcher: Mutex<Option<FileWatcher>>,
}

impl ServiceRegistryHandler {
    /// In-memory registry.
    pub fn new(name: impl Into<String>, services: Vec<Service>) -> Self {
        Self {
            name: name.into(),
            services: Arc::new(ArcSwap::from_pointee(services)),
            path: None,
            watcher: Mutex::new(None),
        }
    }

    /// Registry loaded from a JSON file; [`Self::reload`] re-reads it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let services = load_services(&path)?;
        log::info!(
            "[REGISTRY] loaded {} services from {}",
            services.len(),
            path.display()
        );
        let mut handler = Self::new(default_name(), services);
        handler.path = Some(path);
        Ok(handler)
    }

    /// Factory entry for [`super::HandlerRegistry`].
    pub fn from_settings(table: &toml::Table) -> Result<Arc<Self>, Error> {
        let settings: ServiceRegistrySettings = parse_settings(table)?;
        let mut handler = Self::from_file(&settings.path)?;
        handler.name = settings.name;
        let handler = Arc::new(handler);
        if settings.reload_interval_secs > 0 {
            handler.watch(Duration::from_secs(settings.reload_interval_secs))?;
        }
        Ok(handler)
    }

    /// Current snapshot.
    pub fn services(&self) -> Arc<Vec<Service>> {
        self.services.load_full()
    }

    /// Atomically install a new service list.
    pub fn replace(&self, services: Vec<Service>) {
        self.services.store(Arc::new(services));
    }

    /// Re-read the backing file. On failure the current list stays.
    pub fn reload(&self) -> Result<usize, ConfigError> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| ConfigError::Invalid("registry has no backing file".into()))?;
        reload_into(&self.services, path)
    }

    /// Start polling the backing file's mtime every `interval`.
    pub fn watch(&self, interval: Duration) -> Result<(), Error> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| ConfigError::Invalid("registry has no backing file".into()))?;
        let mut slot = self.watcher.lock();
        if slot.is_none() {
            *slot = Some(FileWatcher::spawn(
                path,
                Arc::clone(&self.services),
                interval,
            )?);
        }
        Ok(())
    }

    /// Services matching `probe`: everything for a naked probe, otherwise
    /// those whose contract id or instance id was asked for.
    pub fn matching(&self, probe: &Probe) -> Vec<Service> {
        let naked = probe.is_naked();
        self.services
            .load()
            .iter()
            .filter(|s| {
                naked
                    || probe.service_contract_ids.contains(&s.service_contract_id)
                    || probe.service_instance_ids.contains(&s.id)
            })
            .cloned()
            .collect()
    }
}

impl RegistryHandler for ServiceRegistryHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, probe: &Probe) -> Response {
        let mut response = Response::for_probe(probe);
        for service in self.matching(probe) {
            response.add_service(service);
        }
        log::debug!(
            "[REGISTRY] {} matched {} services for probe {}",
            self.name,
            response.len(),
            probe.probe_id
        );
        response
    }
}

fn load_services(path: &Path) -> Result<Vec<Service>, ConfigError> {
    let bytes = std::fs::read(path)?;
    services_from_json(&bytes).map_err(|e| {
        ConfigError::Invalid(format!("service registry {}: {}", path.display(), e))
    })
}

fn reload_into(target: &ArcSwap<Vec<Service>>, path: &Path) -> Result<usize, ConfigError> {
    let services = load_services(path)?;
    let count = services.len();
    target.store(Arc::new(services));
    log::info!("[REGISTRY] reloaded {} services from {}", count, path.display());
    Ok(count)
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Background mtime poller.
struct FileWatcher {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl FileWatcher {
    fn spawn(
        path: PathBuf,
        target: Arc<ArcSwap<Vec<Service>>>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name("des-registry-watch".to_string())
            .spawn(move || {
                let mut last = modified(&path);
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                    let current = modified(&path);
                    if current != last {
                        last = current;
                        if let Err(e) = reload_into(&target, &path) {
                            log::warn!("[REGISTRY] reload of {} failed: {}", path.display(), e);
                        }
                    }
                }
            })?;
        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
