// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Responder configuration.
//!
//! Supports both programmatic and file-based (TOML) configuration. Plugins
//! are declared as `[[transports]]` / `[[handlers]]` sections with a `kind`
//! and a free-form `settings` table that the plugin's factory deserializes.
//!
//! ```toml
//! pool_size = 8
//! reject_naked_probes = false
//!
//! [delivery]
//! policy = "first"
//! timeout_ms = 5000
//!
//! [[transports]]
//! kind = "multicast"
//! [transports.settings]
//! group = "239.255.90.1"
//! port = 21000
//!
//! [[handlers]]
//! kind = "service-registry"
//! [handlers.settings]
//! path = "services.json"
//! ```

use crate::error::ConfigError;
use crate::responder::RejectionPolicy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Responder engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderConfig {
    /// Worker threads processing probes.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Bounded probe queue in front of the workers.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// What happens to a probe arriving at a full queue.
    #[serde(default)]
    pub rejection_policy: RejectionPolicy,

    /// Drop probes that carry no identifiers instead of answering with
    /// every known service.
    #[serde(default)]
    pub reject_naked_probes: bool,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub transports: Vec<PluginSpec>,

    #[serde(default)]
    pub handlers: Vec<PluginSpec>,
}

fn default_pool_size() -> usize {
    8
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            queue_capacity: default_queue_capacity(),
            rejection_policy: RejectionPolicy::default(),
            reject_naked_probes: false,
            monitor: MonitorConfig::default(),
            delivery: DeliveryConfig::default(),
            tls: TlsConfig::default(),
            transports: Vec::new(),
            handlers: Vec::new(),
        }
    }
}

impl ResponderConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be at least 1".into(),
            ));
        }
        if self.monitor.enabled && self.monitor.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "monitor.interval_secs must be at least 1".into(),
            ));
        }
        if self.monitor.window == 0 {
            return Err(ConfigError::Invalid("monitor.window must be at least 1".into()));
        }
        if self.delivery.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "delivery.timeout_ms must be at least 1".into(),
            ));
        }
        for (i, spec) in self.transports.iter().chain(&self.handlers).enumerate() {
            if spec.kind.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "plugin section {} has an empty kind",
                    i
                )));
            }
        }
        Ok(())
    }

    /// Add a transport section.
    pub fn add_transport(&mut self, spec: PluginSpec) {
        self.transports.push(spec);
    }

    /// Add a handler section.
    pub fn add_handler(&mut self, spec: PluginSpec) {
        self.handlers.push(spec);
    }
}

/// Pool monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Seconds between stats lines.
    #[serde(default = "default_monitor_interval")]
    pub interval_secs: u64,

    /// Completion timestamps retained for the throughput estimate.
    #[serde(default = "default_monitor_window")]
    pub window: usize,
}

fn default_monitor_interval() -> u64 {
    10
}

fn default_monitor_window() -> usize {
    1000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_monitor_interval(),
            window: default_monitor_window(),
        }
    }
}

/// Which respondTo addresses a response is posted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryPolicy {
    /// Only the first address; failures are logged, not retried elsewhere.
    #[default]
    #[serde(alias = "first_only")]
    First,
    /// Addresses in order until one accepts the response.
    Failover,
    /// Every address.
    All,
}

/// Response delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub policy: DeliveryPolicy,

    /// Per-request timeout (connect + transfer).
    #[serde(default = "default_delivery_timeout")]
    pub timeout_ms: u64,
}

fn default_delivery_timeout() -> u64 {
    5000
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            policy: DeliveryPolicy::default(),
            timeout_ms: default_delivery_timeout(),
        }
    }
}

/// TLS material for HTTPS delivery. Both files are PEM.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Extra trusted root certificates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_path: Option<PathBuf>,

    /// Client certificate and private key, concatenated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_path: Option<PathBuf>,
}

/// One `[[transports]]` or `[[handlers]]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSpec {
    /// Factory name, e.g. `multicast` or `service-registry`.
    pub kind: String,

    #[serde(default)]
    pub settings: toml::Table,
}

impl PluginSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            settings: toml::Table::new(),
        }
    }

    /// Set one settings key.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }
}

/// Deserialize a plugin's settings table into its typed config.
pub fn parse_settings<T: DeserializeOwned>(settings: &toml::Table) -> Result<T, ConfigError> {
    Ok(toml::Value::Table(settings.clone()).try_into()?)
}
