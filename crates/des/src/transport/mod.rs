// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Probe transports.
//!
//! A transport moves encoded probes between clients and responders. The
//! responder owns one receive thread per transport, each blocked in
//! [`Transport::run`] until [`Transport::shutdown`] is called.
//!
//! # Implementations
//!
//! - [`MulticastTransport`] - UDP multicast group (`multicast`)
//! - [`PubSubTransport`] - HTTP pub/sub broker topic (`pubsub`, feature `pubsub`)
//! - [`ChannelTransport`] - in-process bus for embedding and tests

mod channel;
mod multicast;
#[cfg(feature = "pubsub")]
mod pubsub;

pub use channel::ChannelTransport;
pub use multicast::{MulticastSettings, MulticastTransport};
#[cfg(feature = "pubsub")]
pub use pubsub::{PubSubSettings, PubSubTransport};

use crate::config::PluginSpec;
use crate::error::{ConfigError, Error, TransportError};
use crate::types::Probe;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

/// Callback receiving each decoded probe and the address it came from.
pub type ProbeSink = Arc<dyn Fn(Probe, SocketAddr) + Send + Sync>;

/// A bidirectional probe transport.
pub trait Transport: Send + Sync {
    /// Block, delivering inbound probes to `sink`, until shut down.
    ///
    /// Undecodable payloads are logged and skipped.
    fn run(&self, sink: ProbeSink) -> Result<(), TransportError>;

    /// Send one probe. Callers split oversized probes first.
    fn send(&self, probe: &Probe) -> Result<(), TransportError>;

    /// Stop `run` and release network resources. Idempotent.
    fn shutdown(&self);

    /// Largest encoded probe this transport carries.
    fn max_payload_size(&self) -> usize;

    /// Short human-readable identity for logs and thread names.
    fn describe(&self) -> String;
}

/// Builds a transport from its `[transports.settings]` table.
pub type TransportFactory =
    Box<dyn Fn(&toml::Table) -> Result<Arc<dyn Transport>, Error> + Send + Sync>;

/// Named transport factories.
pub struct TransportRegistry {
    factories: HashMap<String, TransportFactory>,
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TransportRegistry {
    /// Registry without any factories.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with `multicast` (and `pubsub` when enabled).
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("multicast", |settings| {
            Ok(MulticastTransport::from_settings(settings)? as Arc<dyn Transport>)
        });
        #[cfg(feature = "pubsub")]
        registry.register("pubsub", |settings| {
            Ok(PubSubTransport::from_settings(settings)? as Arc<dyn Transport>)
        });
        registry
    }

    /// Add or replace a factory.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&toml::Table) -> Result<Arc<dyn Transport>, Error> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Instantiate the transport a config section describes.
    pub fn create(&self, spec: &PluginSpec) -> Result<Arc<dyn Transport>, Error> {
        let factory = self
            .factories
            .get(&spec.kind)
            .ok_or_else(|| ConfigError::UnknownPlugin {
                kind: "transport",
                name: spec.kind.clone(),
            })?;
        factory(&spec.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = TransportRegistry::with_builtins();
        assert!(registry.contains("multicast"));
        #[cfg(feature = "pubsub")]
        assert!(registry.contains("pubsub"));
    }

    #[test]
    fn test_unknown_kind() {
        let registry = TransportRegistry::empty();
        let err = registry.create(&PluginSpec::new("carrier-pigeon")).err().unwrap();
        assert!(matches!(
            err,
            Error::Config(ConfigError::UnknownPlugin {
                kind: "transport",
                ..
            })
        ));
    }

    #[test]
    fn test_custom_factory() {
        let mut registry = TransportRegistry::empty();
        registry.register("channel", |_| Ok(Arc::new(ChannelTransport::new()) as Arc<dyn Transport>));
        let transport = registry.create(&PluginSpec::new("channel")).unwrap();
        assert!(transport.describe().starts_with("channel"));
        assert_eq!(registry.kinds(), vec!["channel".to_string()]);
    }
}
