// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service records advertised by registries and carried in responses.

use std::fmt;
use std::str::FromStr;

/// Intended consumer of a service record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Consumability {
    HumanConsumable,
    #[default]
    MachineConsumable,
}

impl Consumability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HumanConsumable => "HUMAN_CONSUMABLE",
            Self::MachineConsumable => "MACHINE_CONSUMABLE",
        }
    }
}

impl fmt::Display for Consumability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Consumability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HUMAN_CONSUMABLE" => Ok(Self::HumanConsumable),
            "MACHINE_CONSUMABLE" => Ok(Self::MachineConsumable),
            other => Err(other.to_string()),
        }
    }
}

/// Where and how a service can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccessPoint {
    pub label: String,
    pub url: String,
    pub ip_address: Option<String>,
    pub port: Option<u16>,
    pub data_type: Option<String>,
    /// Opaque blob, base64 on the wire.
    pub data: Option<Vec<u8>>,
}

/// Registry entry / response element. Unique by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Service {
    pub id: String,
    pub service_contract_id: String,
    pub service_name: String,
    pub description: Option<String>,
    pub contract_description: Option<String>,
    pub consumability: Consumability,
    /// Minutes a consumer may cache this record; 0 never expires.
    pub ttl: u32,
    pub access_points: Vec<AccessPoint>,
}

impl Service {
    pub fn new(
        id: impl Into<String>,
        service_contract_id: impl Into<String>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            service_contract_id: service_contract_id.into(),
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the cache lifetime in minutes.
    pub fn with_ttl(mut self, minutes: u32) -> Self {
        self.ttl = minutes;
        self
    }

    /// Append an access point.
    pub fn with_access_point(mut self, access_point: AccessPoint) -> Self {
        self.access_points.push(access_point);
        self
    }

    /// First field holding a character XML cannot carry.
    pub fn find_non_xml_char(&self) -> Option<(&'static str, char)> {
        let access_points = self.access_points.iter().flat_map(|ap| {
            [("label", Some(ap.label.as_str())), ("url", Some(ap.url.as_str()))]
                .into_iter()
                .chain([
                    ("ipAddress", ap.ip_address.as_deref()),
                    ("dataType", ap.data_type.as_deref()),
                ])
                .filter_map(|(field, text)| text.map(|t| (field, t)))
        });
        super::find_non_xml(
            [
                ("id", Some(self.id.as_str())),
                ("serviceContractID", Some(self.service_contract_id.as_str())),
                ("serviceName", Some(self.service_name.as_str())),
                ("description", self.description.as_deref()),
                ("contractDescription", self.contract_description.as_deref()),
            ]
            .into_iter()
            .filter_map(|(field, text)| text.map(|t| (field, t)))
            .chain(access_points),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumability_tokens() {
        for c in [Consumability::HumanConsumable, Consumability::MachineConsumable] {
            assert_eq!(c.as_str().parse::<Consumability>(), Ok(c));
        }
        assert!("machine".parse::<Consumability>().is_err());
    }

    #[test]
    fn test_service_builder() {
        let svc = Service::new("id-1", "contract", "Name")
            .with_ttl(5)
            .with_access_point(AccessPoint {
                label: "rest".into(),
                url: "http://10.0.0.1:80/api".into(),
                ..Default::default()
            });
        assert_eq!(svc.ttl, 5);
        assert_eq!(svc.access_points.len(), 1);
        assert_eq!(svc.consumability, Consumability::MachineConsumable);
    }

    #[test]
    fn test_find_non_xml_char_covers_access_points() {
        let mut svc = Service::new("id-1", "contract", "Name");
        assert_eq!(svc.find_non_xml_char(), None);
        svc.description = Some("bell\u{7}".into());
        assert_eq!(svc.find_non_xml_char(), Some(("description", '\u{7}')));
        svc.description = None;
        svc = svc.with_access_point(AccessPoint {
            label: "rest".into(),
            url: "http://10.0.0.1/".into(),
            data_type: Some("\u{FFFE}".into()),
            data: Some(vec![0, 1, 2]),
            ..Default::default()
        });
        assert_eq!(svc.find_non_xml_char(), Some(("dataType", '\u{FFFE}')));
    }
}
