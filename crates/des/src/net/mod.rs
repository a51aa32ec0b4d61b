// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Interface selection and multicast socket plumbing.

pub mod interface;
pub mod multicast;

pub use interface::{describe_interface, local_host_address, resolve_interface};
pub use multicast::{open_sender, send_datagram, MulticastSocket, MAX_UDP_PAYLOAD};
