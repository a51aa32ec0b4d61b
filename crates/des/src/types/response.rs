// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Response: the answer to one probe.

use super::{Probe, Service};

/// Services matching one probe, correlated by `probe_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub response_id: String,
    pub probe_id: String,
    pub services: Vec<Service>,
}

impl Response {
    /// Empty response with a freshly minted response id.
    pub fn new(probe_id: impl Into<String>) -> Self {
        Self {
            response_id: super::new_urn(),
            probe_id: probe_id.into(),
            services: Vec::new(),
        }
    }

    /// Empty response correlated to `probe`.
    pub fn for_probe(probe: &Probe) -> Self {
        Self::new(probe.probe_id.clone())
    }

    /// Insert a service; a service with the same id is replaced in place.
    pub fn add_service(&mut self, service: Service) {
        match self.services.iter_mut().find(|s| s.id == service.id) {
            Some(existing) => *existing = service,
            None => self.services.push(service),
        }
    }

    /// Drop services XML cannot carry; returns the ids removed.
    pub fn retain_encodable(&mut self) -> Vec<String> {
        let mut removed = Vec::new();
        self.services.retain(|s| {
            let keep = s.find_non_xml_char().is_none();
            if !keep {
                removed.push(s.id.clone());
            }
            keep
        });
        removed
    }

    /// Empty responses are never transmitted.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_service_is_unique_by_id() {
        let mut resp = Response::new("urn:uuid:p");
        resp.add_service(Service::new("a", "c1", "first"));
        resp.add_service(Service::new("b", "c1", "second"));
        resp.add_service(Service::new("a", "c2", "replaced"));

        assert_eq!(resp.len(), 2);
        assert_eq!(resp.services[0].service_name, "replaced");
        assert_eq!(resp.services[0].service_contract_id, "c2");
    }

    #[test]
    fn test_retain_encodable() {
        let mut resp = Response::new("urn:uuid:p");
        resp.add_service(Service::new("ok", "c", "fine"));
        resp.add_service(Service::new("bad", "c", "form\u{C}feed"));
        assert_eq!(resp.retain_encodable(), vec!["bad".to_string()]);
        assert_eq!(resp.len(), 1);
        assert_eq!(resp.services[0].id, "ok");
    }

    #[test]
    fn test_for_probe_correlates() {
        let probe = Probe::new();
        let resp = Response::for_probe(&probe);
        assert_eq!(resp.probe_id, probe.probe_id);
        assert_ne!(resp.response_id, probe.probe_id);
        assert!(resp.is_empty());
    }
}
