// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Probe: a discovery query broadcast by a client.

use crate::error::ProbeError;
use std::fmt;
use std::str::FromStr;

/// Wire format a responder must use for its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PayloadType {
    #[default]
    Xml,
    Json,
}

impl PayloadType {
    /// Token used on the wire (`XML` / `JSON`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Xml => "XML",
            Self::Json => "JSON",
        }
    }

    /// HTTP `Content-Type` for a body in this format.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Xml => "application/xml",
            Self::Json => "application/json",
        }
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayloadType {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "XML" => Ok(Self::Xml),
            "JSON" => Ok(Self::Json),
            _ => Err(ProbeError::UnsupportedPayloadType(s.to_string())),
        }
    }
}

/// A labelled HTTP(S) endpoint where responses are delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RespondTo {
    pub label: String,
    pub url: String,
}

impl RespondTo {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// Discovery query.
///
/// Use [`crate::builder::ProbeBuilder`] to construct a validated probe. The
/// identifier lists behave as ordered sets: [`Probe::add_service_contract_id`]
/// and [`Probe::add_service_instance_id`] ignore duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub probe_id: String,
    pub client_id: Option<String>,
    pub hop_limit: u8,
    pub respond_to: Vec<RespondTo>,
    pub payload_type: PayloadType,
    pub service_contract_ids: Vec<String>,
    pub service_instance_ids: Vec<String>,
}

/// Default multicast hop limit (link-local).
pub const DEFAULT_HOP_LIMIT: u8 = 1;

impl Probe {
    /// Empty probe with a fresh id and no respondTo addresses.
    pub fn new() -> Self {
        Self {
            probe_id: super::new_urn(),
            client_id: None,
            hop_limit: DEFAULT_HOP_LIMIT,
            respond_to: Vec::new(),
            payload_type: PayloadType::Xml,
            service_contract_ids: Vec::new(),
            service_instance_ids: Vec::new(),
        }
    }

    /// A probe without contract or instance qualifiers matches everything.
    pub fn is_naked(&self) -> bool {
        self.service_contract_ids.is_empty() && self.service_instance_ids.is_empty()
    }

    /// Replace the probe id, keeping every other field.
    ///
    /// Required before resending an unmodified probe: responders
    /// deduplicate by id and would discard the resend.
    pub fn recreate_id(&mut self) {
        self.probe_id = super::new_urn();
    }

    /// Copy of this probe without identifiers, under a fresh id.
    pub fn frame(&self) -> Self {
        Self {
            probe_id: super::new_urn(),
            client_id: self.client_id.clone(),
            hop_limit: self.hop_limit,
            respond_to: self.respond_to.clone(),
            payload_type: self.payload_type,
            service_contract_ids: Vec::new(),
            service_instance_ids: Vec::new(),
        }
    }

    /// Add a service contract id; returns false if already present.
    pub fn add_service_contract_id(&mut self, id: impl Into<String>) -> bool {
        push_unique(&mut self.service_contract_ids, id.into())
    }

    /// Add a service instance id; returns false if already present.
    pub fn add_service_instance_id(&mut self, id: impl Into<String>) -> bool {
        push_unique(&mut self.service_instance_ids, id.into())
    }

    /// First field holding a character XML cannot carry, named as on the
    /// wire.
    pub fn find_non_xml_char(&self) -> Option<(&'static str, char)> {
        let respond_to = self
            .respond_to
            .iter()
            .flat_map(|rt| [("label", rt.label.as_str()), ("url", rt.url.as_str())]);
        super::find_non_xml(
            std::iter::once(("id", self.probe_id.as_str()))
                .chain(self.client_id.as_deref().map(|c| ("client", c)))
                .chain(respond_to)
                .chain(self.service_contract_ids.iter().map(|id| ("serviceContractID", id.as_str())))
                .chain(self.service_instance_ids.iter().map(|id| ("serviceInstanceID", id.as_str()))),
        )
    }

    /// Number of query identifiers (contracts + instances).
    pub fn identifier_count(&self) -> usize {
        self.service_contract_ids.len() + self.service_instance_ids.len()
    }
}

impl Default for Probe {
    fn default() -> Self {
        Self::new()
    }
}

fn push_unique(list: &mut Vec<String>, value: String) -> bool {
    if list.contains(&value) {
        false
    } else {
        list.push(value);
        true
    }
}
