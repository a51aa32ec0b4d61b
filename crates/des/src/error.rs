// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy.
//!
//! Each concern has its own error type so callers can tell "not a probe at
//! all" ([`ParseError`]) apart from a dead network path ([`TransportError`])
//! or an unusable configuration ([`ConfigError`]). [`Error`] wraps them for
//! the top-level startup path.

use std::net::Ipv4Addr;
use thiserror::Error;

/// Malformed wire payload. Recovered locally: the packet is dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("payload is not well-formed: {0}")]
    Malformed(String),

    #[error("unexpected root element <{found}> (expected <{expected}>)")]
    UnexpectedRoot { expected: &'static str, found: String },

    #[error("unknown element <{0}>")]
    UnknownElement(String),

    #[error("unknown attribute '{attribute}' on <{element}>")]
    UnknownAttribute { element: String, attribute: String },

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid value for '{field}': {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("protocol version mismatch: {0}")]
    VersionMismatch(String),

    #[error("'{field}' contains U+{code:04X}, which XML cannot carry")]
    InvalidCharacter { field: &'static str, code: u32 },
}

/// Malformed or missing configuration. Fatal for the plugin it concerns.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown {kind} plugin '{name}'")]
    UnknownPlugin { kind: &'static str, name: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Probe construction rejected by [`crate::builder::ProbeBuilder`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("probe needs at least one respondTo address")]
    NoRespondTo,

    #[error("invalid respondTo URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported respondTo scheme '{0}' (expected http or https)")]
    UnsupportedScheme(String),

    #[error("unsupported payload type '{0}' (expected XML or JSON)")]
    UnsupportedPayloadType(String),

    #[error("'{field}' contains U+{code:04X}, which XML cannot carry")]
    InvalidCharacter { field: &'static str, code: u32 },
}

/// Probe cannot be fragmented for a transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SplitError {
    #[error(
        "too many respondTo addresses for this transport: frame needs {frame_size} bytes \
         plus one identifier, limit is {limit}"
    )]
    RespondToTooLarge { frame_size: usize, limit: usize },
}

/// HTTP delivery of a response failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("probe has no respondTo address")]
    NoAddress,
}

/// Transport setup or I/O failure.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("network interface '{0}' not found or has no IPv4 address")]
    InterfaceNotFound(String),

    #[error("resolved interface {0} is a loopback interface; configure an interface explicitly")]
    LoopbackInterface(Ipv4Addr),

    #[error("failed to join multicast group {group} on {interface}: {source}\n{diagnostics}")]
    GroupJoin {
        group: Ipv4Addr,
        interface: Ipv4Addr,
        diagnostics: String,
        #[source]
        source: std::io::Error,
    },

    #[error("payload of {size} bytes exceeds transport limit of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("pub/sub broker error: {0}")]
    Broker(String),

    #[error("transport is shut down")]
    Closed,
}

/// Top-level error for engine construction and client operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("split error: {0}")]
    Split(#[from] SplitError),

    #[error("no usable {0} could be loaded")]
    NothingLoaded(&'static str),

    #[error("responder already running")]
    AlreadyRunning,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
