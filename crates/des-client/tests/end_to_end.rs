// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client, responder and listener wired together in one process.

use des::error::TransportError;
use des::registry::ServiceRegistryHandler;
use des::transport::{ChannelTransport, ProbeSink, Transport};
use des::{
    wire, DiscoveryClient, PayloadType, Probe, ProbeBuilder, RegistryHandler, Responder,
    ResponderConfig, Response, Service,
};
use des_client::{ListenerHandle, ListenerState, PROBE_RESPONSE_PATH};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Client-side transport whose sends arrive at the responder's channel.
struct Loopback(Arc<ChannelTransport>);

impl Transport for Loopback {
    fn run(&self, _sink: ProbeSink) -> Result<(), TransportError> {
        Ok(())
    }

    fn send(&self, probe: &Probe) -> Result<(), TransportError> {
        self.0.inject(probe.clone());
        Ok(())
    }

    fn shutdown(&self) {}

    fn max_payload_size(&self) -> usize {
        self.0.max_payload_size()
    }

    fn describe(&self) -> String {
        "loopback".to_string()
    }
}

struct Harness {
    listener: ListenerHandle,
    responder: Responder,
    client: DiscoveryClient,
}

impl Harness {
    fn start() -> Self {
        let listener = ListenerHandle::spawn(
            SocketAddr::from(([127, 0, 0, 1], 0)),
            ListenerState::new(),
        )
        .unwrap();

        let registry: Arc<dyn RegistryHandler> = Arc::new(ServiceRegistryHandler::new(
            "e2e",
            vec![
                Service::new("weather-eu", "urn:contract:weather", "Weather EU").with_ttl(5),
                Service::new("weather-us", "urn:contract:weather", "Weather US"),
                Service::new("geo-1", "urn:contract:geo", "Geocoder").with_ttl(1),
            ],
        ));
        let inbound = Arc::new(ChannelTransport::new());
        let responder = Responder::new(
            &ResponderConfig::default(),
            vec![inbound.clone() as Arc<dyn Transport>],
            vec![registry],
        )
        .unwrap();
        responder.start().unwrap();

        let client = DiscoveryClient::new(Arc::new(Loopback(inbound)))
            .with_burst_interval(Duration::from_millis(5));
        Self {
            listener,
            responder,
            client,
        }
    }

    fn respond_to(&self) -> String {
        format!("{}{}", self.listener.base_url("127.0.0.1"), PROBE_RESPONSE_PATH)
    }

    fn wait_for_services(&self, count: usize) -> Vec<Service> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let services = self.listener.cache().snapshot();
            if services.len() >= count || Instant::now() > deadline {
                return services;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    fn stop(mut self) {
        self.responder.shutdown();
        self.listener.shutdown();
    }
}

#[test]
fn naked_probe_caches_every_service() {
    let harness = Harness::start();
    let probe = ProbeBuilder::new()
        .respond_to("e2e", harness.respond_to())
        .build()
        .unwrap();
    harness.client.send(&probe, 1).unwrap();

    let services = harness.wait_for_services(3);
    let ids: Vec<_> = services.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["geo-1", "weather-eu", "weather-us"]);
    assert_eq!(services[1].ttl, 5);
    harness.stop();
}

#[test]
fn duplicate_copies_post_once() {
    let harness = Harness::start();
    let probe = ProbeBuilder::new()
        .respond_to("e2e", harness.respond_to())
        .payload_type(PayloadType::Json)
        .service_contract_id("urn:contract:weather")
        .build()
        .unwrap();
    assert_eq!(harness.client.send(&probe, 4).unwrap(), 4);

    assert_eq!(harness.wait_for_services(2).len(), 2);
    // Leave time for any stray duplicate answer to land.
    std::thread::sleep(Duration::from_millis(300));
    harness.responder.shutdown();

    let state = harness.listener.state();
    assert_eq!(state.accepted.load(Ordering::SeqCst), 1);
    let stats = harness.responder.stats();
    assert_eq!(stats.duplicates, 3);
    assert_eq!(stats.responses_sent, 1);
    harness.stop();
}

#[test]
fn rest_surface() {
    let listener = ListenerHandle::spawn(
        SocketAddr::from(([127, 0, 0, 1], 0)),
        ListenerState::new(),
    )
    .unwrap();
    let base = listener.base_url("127.0.0.1");
    let http = reqwest::blocking::Client::new();

    let mut response = Response::new("urn:uuid:p1");
    response.add_service(Service::new("a", "urn:c", "A"));
    let post = http
        .post(format!("{}{}", base, PROBE_RESPONSE_PATH))
        .header("content-type", "application/xml")
        .body(wire::encode_response(&response, PayloadType::Xml))
        .send()
        .unwrap();
    assert!(post.status().is_success());

    let bad = http
        .post(format!("{}{}", base, PROBE_RESPONSE_PATH))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .unwrap();
    assert_eq!(bad.status().as_u16(), 400);

    let listed: serde_json::Value = http
        .get(format!("{}/listener/responses", base))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    assert_eq!(listed[0]["id"], "a");

    let cleared = http
        .get(format!("{}/listener/clearCache", base))
        .send()
        .unwrap()
        .text()
        .unwrap();
    assert_eq!(cleared, "cache cleared");
    assert!(listener.cache().is_empty());
}
