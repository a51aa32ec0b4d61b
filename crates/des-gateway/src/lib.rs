// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multicast gateway relay.
//!
//! Bridges two multicast segments that cannot route multicast to each other.
//!
//! ```text
//!   segment A                                            segment B
//! group A --> GatewaySender --TCP, one conn per datagram--> GatewayReceiver --> group B
//!             (drops datagrams from its own host)           (TTL relay_ttl)
//! ```
//!
//! Each datagram travels as the full content of one TCP connection; the
//! receiver reads to end-of-stream so segmented writes arrive as one
//! payload.

mod receiver;
mod sender;
mod stats;

pub use receiver::{GatewayReceiver, PayloadHook, ReceiverConfig, DEFAULT_RELAY_TTL};
pub use sender::{forward, should_relay, GatewaySender, SenderConfig};
pub use stats::{RelayStats, RelayStatsSnapshot};

use des::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid address '{0}'")]
    InvalidAddress(String),
}
