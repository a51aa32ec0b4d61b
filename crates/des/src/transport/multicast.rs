// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP multicast transport.
//!
//! The group is joined when the transport is constructed so a bad interface
//! fails the plugin at load time rather than on the first probe.

use super::{ProbeSink, Transport};
use crate::config::parse_settings;
use crate::error::{ConfigError, Error, TransportError};
use crate::net::{resolve_interface, MulticastSocket, MAX_UDP_PAYLOAD};
use crate::types::{PayloadType, Probe};
use crate::wire;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Default discovery group.
pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 90, 1);
/// Default discovery port.
pub const DEFAULT_PORT: u16 = 21000;
/// Default probe size limit.
pub const DEFAULT_MAX_PAYLOAD: usize = 8192;

/// `[transports.settings]` for `kind = "multicast"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MulticastSettings {
    #[serde(default = "default_group")]
    pub group: Ipv4Addr,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Interface name or IPv4 address. Defaults to the local host address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,

    #[serde(default = "default_max_payload")]
    pub max_payload_size: usize,

    /// Receive our own probes (needed when client and responder share a host).
    #[serde(default = "default_loopback")]
    pub loopback: bool,
}

fn default_group() -> Ipv4Addr {
    DEFAULT_GROUP
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_payload() -> usize {
    DEFAULT_MAX_PAYLOAD
}

fn default_loopback() -> bool {
    true
}

impl Default for MulticastSettings {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP,
            port: DEFAULT_PORT,
            interface: None,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            loopback: true,
        }
    }
}

impl MulticastSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.group.is_multicast() {
            return Err(ConfigError::Invalid(format!(
                "{} is not an IPv4 multicast group",
                self.group
            )));
        }
        if self.max_payload_size == 0 || self.max_payload_size > MAX_UDP_PAYLOAD {
            return Err(ConfigError::Invalid(format!(
                "max_payload_size must be in 1..={}",
                MAX_UDP_PAYLOAD
            )));
        }
        Ok(())
    }
}

pub struct MulticastTransport {
    settings: MulticastSettings,
    socket: MulticastSocket,
    running: AtomicBool,
}

impl MulticastTransport {
    /// Resolve the interface and join the group.
    pub fn open(settings: MulticastSettings) -> Result<Self, Error> {
        settings.validate()?;
        let interface = resolve_interface(settings.interface.as_deref())?;
        let socket =
            MulticastSocket::join(settings.group, settings.port, interface, settings.loopback)?;
        log::info!(
            "[MCAST] transport ready on {}:{} via {}",
            settings.group,
            settings.port,
            interface
        );
        Ok(Self {
            settings,
            socket,
            running: AtomicBool::new(true),
        })
    }

    /// Factory entry for [`super::TransportRegistry`].
    pub fn from_settings(table: &toml::Table) -> Result<Arc<Self>, Error> {
        let settings: MulticastSettings = parse_settings(table)?;
        Ok(Arc::new(Self::open(settings)?))
    }

    pub fn settings(&self) -> &MulticastSettings {
        &self.settings
    }

    /// Port the socket is bound to; differs from the settings when they
    /// ask for port 0.
    pub fn local_port(&self) -> u16 {
        self.socket.port()
    }
}

impl Transport for MulticastTransport {
    fn run(&self, sink: ProbeSink) -> Result<(), TransportError> {
        let group = self.socket.group_addr();
        self.socket.recv_loop(&self.running, |bytes, src| {
            match wire::decode_probe(bytes, PayloadType::Xml) {
                Ok(probe) => sink(probe, src),
                Err(e) => {
                    log::debug!(
                        "[MCAST] dropping {} byte datagram from {} on {}: {}",
                        bytes.len(),
                        src,
                        group,
                        e
                    );
                }
            }
        })?;
        Ok(())
    }

    fn send(&self, probe: &Probe) -> Result<(), TransportError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let bytes = wire::encode_probe(probe, PayloadType::Xml);
        if bytes.len() > self.settings.max_payload_size {
            return Err(TransportError::PayloadTooLarge {
                size: bytes.len(),
                limit: self.settings.max_payload_size,
            });
        }
        self.socket.send(&bytes, probe.hop_limit)?;
        log::debug!(
            "[MCAST] sent probe {} ({} bytes, ttl={})",
            probe.probe_id,
            bytes.len(),
            probe.hop_limit
        );
        Ok(())
    }

    fn shutdown(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            self.socket.leave();
            log::debug!("[MCAST] transport {} shut down", self.describe());
        }
    }

    fn max_payload_size(&self) -> usize {
        self.settings.max_payload_size
    }

    fn describe(&self) -> String {
        format!(
            "multicast({}:{} if={})",
            self.settings.group,
            self.socket.port(),
            self.socket.interface()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluginSpec;

    #[test]
    fn test_settings_defaults() {
        let settings: MulticastSettings = parse_settings(&toml::Table::new()).unwrap();
        assert_eq!(settings, MulticastSettings::default());
        assert_eq!(settings.group, Ipv4Addr::new(239, 255, 90, 1));
        assert_eq!(settings.port, 21000);
        assert_eq!(settings.max_payload_size, 8192);
    }

    #[test]
    fn test_settings_reject_unknown_key() {
        let spec = PluginSpec::new("multicast").with("grup", "239.1.1.1");
        assert!(parse_settings::<MulticastSettings>(&spec.settings).is_err());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = MulticastSettings {
            group: Ipv4Addr::new(10, 0, 0, 1),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
        settings.group = DEFAULT_GROUP;
        settings.max_payload_size = 70_000;
        assert!(settings.validate().is_err());
        settings.max_payload_size = 1400;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_unknown_interface_fails_open() {
        let settings = MulticastSettings {
            interface: Some("no-such-if0".into()),
            ..Default::default()
        };
        assert!(matches!(
            MulticastTransport::open(settings),
            Err(Error::Transport(TransportError::InterfaceNotFound(_)))
        ));
    }

    #[test]
    #[ignore = "requires a multicast-capable interface"]
    fn test_send_and_receive_on_loopback_group() {
        use crate::builder::ProbeBuilder;
        use std::net::SocketAddr;
        use std::time::Duration;

        let settings = MulticastSettings {
            port: 21_917,
            ..Default::default()
        };
        let transport = Arc::new(MulticastTransport::open(settings).unwrap());
        let (tx, rx) = crossbeam::channel::bounded(4);
        let sink: ProbeSink = Arc::new(move |p: Probe, _src: SocketAddr| {
            let _ = tx.try_send(p);
        });
        let runner = Arc::clone(&transport);
        let handle = std::thread::spawn(move || runner.run(sink));

        let probe = ProbeBuilder::new()
            .respond_to("a", "http://127.0.0.1:9/")
            .service_contract_id("X")
            .build()
            .unwrap();
        transport.send(&probe).unwrap();
        let got = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got, probe);

        transport.shutdown();
        handle.join().unwrap().unwrap();
    }
}
