// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registry handlers answer probes from a service registry.

mod service_registry;

pub use service_registry::{ServiceRegistryHandler, ServiceRegistrySettings};

use crate::config::PluginSpec;
use crate::error::{ConfigError, Error};
use crate::types::{Probe, Response};
use std::collections::HashMap;
use std::sync::Arc;

/// Produces the response for one probe. Called from worker threads.
pub trait RegistryHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Matching services for `probe`; an empty response means "nothing here".
    fn handle(&self, probe: &Probe) -> Response;
}

/// Builds a handler from its `[handlers.settings]` table.
pub type HandlerFactory =
    Box<dyn Fn(&toml::Table) -> Result<Arc<dyn RegistryHandler>, Error> + Send + Sync>;

/// Named handler factories.
pub struct HandlerRegistry {
    factories: HashMap<String, HandlerFactory>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl HandlerRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with `service-registry`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("service-registry", |settings| {
            Ok(ServiceRegistryHandler::from_settings(settings)? as Arc<dyn RegistryHandler>)
        });
        registry
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&toml::Table) -> Result<Arc<dyn RegistryHandler>, Error> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn create(&self, spec: &PluginSpec) -> Result<Arc<dyn RegistryHandler>, Error> {
        let factory = self
            .factories
            .get(&spec.kind)
            .ok_or_else(|| ConfigError::UnknownPlugin {
                kind: "handler",
                name: spec.kind.clone(),
            })?;
        factory(&spec.settings)
    }
}
