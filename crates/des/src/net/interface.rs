// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network interface selection and diagnostics.
//!
//! Multicast failures are common and interface-dependent, so every failure
//! path here carries enough context (name, address, flags) to tell a
//! loopback, a down link or a point-to-point tunnel apart at a glance.
//!
//! # Environment Variable
//!
//! `DES_MULTICAST_IF=<ipv4>` - Override the local host address lookup.

use crate::error::TransportError;
use std::io;
use std::net::{IpAddr, Ipv4Addr};

/// Link flags relevant to multicast, as far as the platform exposes them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceFlags {
    pub up: bool,
    pub loopback: bool,
    pub multicast: bool,
    pub point_to_point: bool,
    pub is_virtual: bool,
}

/// One IPv4 interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub address: Ipv4Addr,
    /// `None` when the platform does not expose link flags.
    pub flags: Option<InterfaceFlags>,
}

/// All IPv4 interfaces on this host.
pub fn list_interfaces() -> io::Result<Vec<InterfaceInfo>> {
    let netifs = local_ip_address::list_afinet_netifas()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    Ok(netifs
        .into_iter()
        .filter_map(|(name, ip)| match ip {
            IpAddr::V4(address) => Some(InterfaceInfo {
                flags: read_flags(&name),
                name,
                address,
            }),
            IpAddr::V6(_) => None,
        })
        .collect())
}

/// IPv4 address bound to the local host (the default-route interface).
///
/// Honors `DES_MULTICAST_IF`.
pub fn local_host_address() -> Option<Ipv4Addr> {
    if let Ok(var) = std::env::var("DES_MULTICAST_IF") {
        if let Ok(addr) = var.trim().parse::<Ipv4Addr>() {
            log::debug!("[NET] Using DES_MULTICAST_IF override: {}", addr);
            return Some(addr);
        }
        log::warn!("[NET] Ignoring invalid DES_MULTICAST_IF='{}'", var);
    }
    match local_ip_address::local_ip() {
        Ok(IpAddr::V4(addr)) => Some(addr),
        Ok(IpAddr::V6(addr)) => {
            log::debug!("[NET] Local host address {} is IPv6, no IPv4 fallback", addr);
            None
        }
        Err(e) => {
            log::debug!("[NET] Failed to resolve local host address: {}", e);
            None
        }
    }
}

/// Pick the IPv4 address of the interface to use for multicast.
///
/// - `Some(name)`: the interface with that name (an IPv4 literal is also
///   accepted). Explicitly chosen loopback interfaces are allowed.
/// - `None`: the interface bound to the local host address; rejected if it
///   is a loopback interface, since nothing off-host would be reachable.
pub fn resolve_interface(name: Option<&str>) -> Result<Ipv4Addr, TransportError> {
    if let Some(name) = name {
        if let Ok(addr) = name.parse::<Ipv4Addr>() {
            return Ok(addr);
        }
        let interfaces = list_interfaces()?;
        return interfaces
            .into_iter()
            .find(|iface| iface.name == name)
            .map(|iface| iface.address)
            .ok_or_else(|| TransportError::InterfaceNotFound(name.to_string()));
    }

    let addr = local_host_address()
        .ok_or_else(|| TransportError::InterfaceNotFound("<local host address>".to_string()))?;
    if addr.is_loopback() {
        log::error!("[NET] Local host address {} is a loopback interface", addr);
        return Err(TransportError::LoopbackInterface(addr));
    }
    log::debug!("[NET] Resolved multicast interface {}", addr);
    Ok(addr)
}

/// Human-readable report about `addr`'s interface and its peers, used when a
/// group join fails.
pub fn describe_interface(addr: Ipv4Addr) -> String {
    let interfaces = match list_interfaces() {
        Ok(list) => list,
        Err(e) => return format!("interface {}: unable to list interfaces ({})", addr, e),
    };

    let mut out = String::new();
    match interfaces.iter().find(|iface| iface.address == addr) {
        Some(iface) => {
            out.push_str(&format!("selected interface: {}\n", format_interface(iface)));
        }
        None => out.push_str(&format!("selected address {} matches no interface\n", addr)),
    }
    out.push_str("available interfaces:");
    for iface in &interfaces {
        out.push_str("\n  ");
        out.push_str(&format_interface(iface));
    }
    out
}

fn format_interface(iface: &InterfaceInfo) -> String {
    match iface.flags {
        Some(flags) => format!(
            "{} ({}) up={} loopback={} multicast={} point-to-point={} virtual={}",
            iface.name,
            iface.address,
            flags.up,
            flags.loopback,
            flags.multicast,
            flags.point_to_point,
            flags.is_virtual
        ),
        None => format!(
            "{} ({}) loopback={} flags=unavailable",
            iface.name,
            iface.address,
            iface.address.is_loopback()
        ),
    }
}

/// Linux: decode `/sys/class/net/<name>/flags` (IFF_* bits).
#[cfg(target_os = "linux")]
fn read_flags(name: &str) -> Option<InterfaceFlags> {
    const IFF_UP: u32 = 0x1;
    const IFF_LOOPBACK: u32 = 0x8;
    const IFF_POINTOPOINT: u32 = 0x10;
    const IFF_MULTICAST: u32 = 0x1000;

    let raw = std::fs::read_to_string(format!("/sys/class/net/{}/flags", name)).ok()?;
    let bits = u32::from_str_radix(raw.trim().trim_start_matches("0x"), 16).ok()?;
    Some(InterfaceFlags {
        up: bits & IFF_UP != 0,
        loopback: bits & IFF_LOOPBACK != 0,
        multicast: bits & IFF_MULTICAST != 0,
        point_to_point: bits & IFF_POINTOPOINT != 0,
        is_virtual: std::path::Path::new(&format!("/sys/devices/virtual/net/{}", name)).exists(),
    })
}

#[cfg(not(target_os = "linux"))]
fn read_flags(_name: &str) -> Option<InterfaceFlags> {
    None
}
