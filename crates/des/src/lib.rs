// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # DES - Decentralized multicast service discovery
//!
//! Clients announce what they are looking for with a *probe*; responders
//! that know matching services answer with a *response* posted over HTTP to
//! the probe's respondTo addresses.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use des::builder::ProbeBuilder;
//! use des::client::DiscoveryClient;
//! use des::transport::{MulticastSettings, MulticastTransport};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), des::Error> {
//!     let transport = Arc::new(MulticastTransport::open(MulticastSettings::default())?);
//!     let probe = ProbeBuilder::new()
//!         .respond_to("me", "http://10.0.0.7:8765/listener/probeResponse")
//!         .service_contract_id("urn:contract:weather")
//!         .build()?;
//!     DiscoveryClient::new(transport).send(&probe, 3)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |  client: ProbeBuilder -> split_probe -> DiscoveryClient             |
//! |          ResponseCache <- POST /listener/probeResponse              |
//! +---------------------------------------------------------------------+
//! |  responder: Transport -> DedupCache -> WorkerPool                   |
//! |             -> RegistryHandler -> ResponseDeliverer (HTTP)          |
//! +---------------------------------------------------------------------+
//! |  wire: XML / JSON codecs      net: interfaces, multicast sockets    |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`types`] - probe, response and service records
//! - [`wire`] - XML and JSON encodings
//! - [`builder`] - probe construction and splitting
//! - [`transport`] - multicast, pub/sub and in-process transports
//! - [`responder`] - dispatch engine
//! - [`registry`] - registry handlers
//! - [`client`] - probe sending and response caching
//! - [`config`] - responder configuration

pub mod builder;
pub mod client;
pub mod config;
pub mod error;
pub mod net;
pub mod registry;
pub mod responder;
pub mod transport;
pub mod types;
pub mod wire;

pub use builder::{split_probe, ProbeBuilder};
pub use client::{DiscoveryClient, ResponseCache};
pub use config::{DeliveryPolicy, PluginSpec, ResponderConfig};
pub use error::{
    ConfigError, DeliveryError, Error, ParseError, ProbeError, SplitError, TransportError,
};
pub use registry::{HandlerRegistry, RegistryHandler, ServiceRegistryHandler};
pub use responder::{ProbeDisposition, Responder};
pub use transport::{Transport, TransportRegistry};
pub use types::{AccessPoint, Consumability, PayloadType, Probe, RespondTo, Response, Service};

/// Result alias over the crate's top-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
