// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outbound probe construction and fragmentation.
//!
//! ```
//! use des::builder::ProbeBuilder;
//! use des::types::PayloadType;
//!
//! let probe = ProbeBuilder::new()
//!     .client_id("inventory-ui")
//!     .respond_to("primary", "http://127.0.0.1:8765/listener/probeResponse")
//!     .payload_type(PayloadType::Json)
//!     .service_contract_id("urn:contract:weather")
//!     .build()
//!     .expect("valid probe");
//! assert!(!probe.is_naked());
//! ```

mod split;

pub use split::split_probe;

use crate::error::ProbeError;
use crate::types::{PayloadType, Probe, RespondTo, DEFAULT_HOP_LIMIT};

/// Validating builder for [`Probe`].
#[derive(Debug, Clone)]
pub struct ProbeBuilder {
    client_id: Option<String>,
    hop_limit: u8,
    respond_to: Vec<RespondTo>,
    payload_type: PayloadType,
    service_contract_ids: Vec<String>,
    service_instance_ids: Vec<String>,
}

impl Default for ProbeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeBuilder {
    pub fn new() -> Self {
        Self {
            client_id: None,
            hop_limit: DEFAULT_HOP_LIMIT,
            respond_to: Vec::new(),
            payload_type: PayloadType::Xml,
            service_contract_ids: Vec::new(),
            service_instance_ids: Vec::new(),
        }
    }

    /// Free-form hint for responders; not protocol-significant.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Multicast hop limit (TTL) used when the probe is sent.
    pub fn hop_limit(mut self, hop_limit: u8) -> Self {
        self.hop_limit = hop_limit;
        self
    }

    /// Append a respondTo address. Order is preserved.
    pub fn respond_to(mut self, label: impl Into<String>, url: impl Into<String>) -> Self {
        self.respond_to.push(RespondTo::new(label, url));
        self
    }

    pub fn payload_type(mut self, payload_type: PayloadType) -> Self {
        self.payload_type = payload_type;
        self
    }

    pub fn service_contract_id(mut self, id: impl Into<String>) -> Self {
        self.service_contract_ids.push(id.into());
        self
    }

    pub fn service_contract_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.service_contract_ids
            .extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn service_instance_id(mut self, id: impl Into<String>) -> Self {
        self.service_instance_ids.push(id.into());
        self
    }

    pub fn service_instance_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.service_instance_ids
            .extend(ids.into_iter().map(Into::into));
        self
    }

    /// Validate and produce a probe with a fresh id.
    pub fn build(self) -> Result<Probe, ProbeError> {
        if self.respond_to.is_empty() {
            return Err(ProbeError::NoRespondTo);
        }
        for rt in &self.respond_to {
            validate_respond_to_url(&rt.url)?;
        }

        let mut probe = Probe::new();
        probe.client_id = self.client_id;
        probe.hop_limit = self.hop_limit;
        probe.respond_to = self.respond_to;
        probe.payload_type = self.payload_type;
        for id in self.service_contract_ids {
            probe.add_service_contract_id(id);
        }
        for id in self.service_instance_ids {
            probe.add_service_instance_id(id);
        }
        if let Some((field, c)) = probe.find_non_xml_char() {
            return Err(ProbeError::InvalidCharacter {
                field,
                code: u32::from(c),
            });
        }
        Ok(probe)
    }
}

/// Accept only absolute `http`/`https` URLs with a host. Loopback hosts are
/// allowed so a client and responder can share a machine.
pub fn validate_respond_to_url(raw: &str) -> Result<(), ProbeError> {
    let parsed = url::Url::parse(raw).map_err(|e| ProbeError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(ProbeError::UnsupportedScheme(other.to_string())),
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ProbeError::InvalidUrl {
            url: raw.to_string(),
            reason: "missing host".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_valid_probe() {
        let probe = ProbeBuilder::new()
            .client_id("c")
            .hop_limit(8)
            .respond_to("a", "http://127.0.0.1:8080/listener")
            .respond_to("b", "https://[::1]:8443/listener")
            .service_contract_ids(["X", "Y", "X"])
            .service_instance_id("i-1")
            .build()
            .unwrap();

        assert_eq!(probe.hop_limit, 8);
        assert_eq!(probe.respond_to.len(), 2);
        assert_eq!(probe.service_contract_ids, vec!["X", "Y"]);
        assert_eq!(probe.service_instance_ids, vec!["i-1"]);
        assert!(probe.probe_id.starts_with("urn:uuid:"));
    }

    #[test]
    fn test_build_requires_respond_to() {
        assert_eq!(
            ProbeBuilder::new().build().unwrap_err(),
            ProbeError::NoRespondTo
        );
    }

    #[test]
    fn test_rejects_non_http_schemes() {
        let err = ProbeBuilder::new()
            .respond_to("ftp", "ftp://example.org/")
            .build()
            .unwrap_err();
        assert_eq!(err, ProbeError::UnsupportedScheme("ftp".into()));

        assert!(matches!(
            validate_respond_to_url("not a url"),
            Err(ProbeError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_loopback_allowed() {
        assert!(validate_respond_to_url("http://localhost:1234/").is_ok());
        assert!(validate_respond_to_url("http://127.0.0.1/").is_ok());
    }

    #[test]
    fn test_rejects_characters_xml_cannot_carry() {
        let forbidden = (0u32..0x20)
            .filter(|c| ![0x09, 0x0A, 0x0D].contains(c))
            .chain([0xFFFE, 0xFFFF])
            .filter_map(char::from_u32);
        let base = || ProbeBuilder::new().respond_to("a", "http://h/");
        for c in forbidden {
            let text = format!("a{}b", c);
            let expect = |field| ProbeError::InvalidCharacter {
                field,
                code: u32::from(c),
            };
            assert_eq!(
                base().client_id(text.as_str()).build().unwrap_err(),
                expect("client")
            );
            assert_eq!(
                ProbeBuilder::new()
                    .respond_to(text.as_str(), "http://h/")
                    .build()
                    .unwrap_err(),
                expect("label")
            );
            assert_eq!(
                base().service_contract_id(text.as_str()).build().unwrap_err(),
                expect("serviceContractID")
            );
            assert_eq!(
                base().service_instance_id(text.as_str()).build().unwrap_err(),
                expect("serviceInstanceID")
            );
        }
    }

    #[test]
    fn test_builder_output_is_naked_without_ids() {
        let probe = ProbeBuilder::new()
            .respond_to("a", "http://h/")
            .build()
            .unwrap();
        assert!(probe.is_naked());
    }
}
