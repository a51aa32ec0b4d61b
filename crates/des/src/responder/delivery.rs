// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP delivery of responses to a probe's respondTo addresses.

use crate::config::{DeliveryConfig, DeliveryPolicy, TlsConfig};
use crate::error::{ConfigError, DeliveryError};
use crate::types::{PayloadType, Probe};
use std::time::Duration;

/// Result of delivering one response.
#[derive(Debug, Default)]
pub struct DeliveryOutcome {
    /// Addresses a POST was attempted against.
    pub attempted: usize,
    /// Addresses that answered 2xx.
    pub delivered: usize,
    pub failures: Vec<DeliveryError>,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        self.delivered > 0
    }
}

/// Posts encoded responses with a blocking reqwest client.
#[derive(Debug, Clone)]
pub struct ResponseDeliverer {
    client: reqwest::blocking::Client,
    policy: DeliveryPolicy,
}

impl ResponseDeliverer {
    pub fn new(delivery: &DeliveryConfig, tls: &TlsConfig) -> Result<Self, ConfigError> {
        let timeout = Duration::from_millis(delivery.timeout_ms);
        let mut builder = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout);

        if let Some(path) = &tls.ca_cert_path {
            let pem = std::fs::read(path)?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                ConfigError::Invalid(format!("truststore {}: {}", path.display(), e))
            })?;
            builder = builder.add_root_certificate(cert);
        }
        if let Some(path) = &tls.identity_path {
            let pem = std::fs::read(path)?;
            let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
                ConfigError::Invalid(format!("keystore {}: {}", path.display(), e))
            })?;
            builder = builder.identity(identity);
        }

        let client = builder
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            policy: delivery.policy,
        })
    }

    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    /// POST `body` to the probe's respondTo addresses per the policy.
    pub fn deliver(&self, probe: &Probe, body: &[u8]) -> DeliveryOutcome {
        let mut outcome = DeliveryOutcome::default();
        if probe.respond_to.is_empty() {
            outcome.failures.push(DeliveryError::NoAddress);
            return outcome;
        }

        let targets = match self.policy {
            DeliveryPolicy::First => &probe.respond_to[..1],
            DeliveryPolicy::Failover | DeliveryPolicy::All => &probe.respond_to[..],
        };

        for target in targets {
            outcome.attempted += 1;
            match self.post(&target.url, probe.payload_type, body) {
                Ok(()) => {
                    log::debug!(
                        "[DELIVERY] probe {} -> {} ({}) ok",
                        probe.probe_id,
                        target.url,
                        target.label
                    );
                    outcome.delivered += 1;
                    if self.policy == DeliveryPolicy::Failover {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("[DELIVERY] probe {}: {}", probe.probe_id, e);
                    outcome.failures.push(e);
                }
            }
        }
        outcome
    }

    /// POST one encoded response to `url`.
    pub fn post(
        &self,
        url: &str,
        payload_type: PayloadType,
        body: &[u8],
    ) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, payload_type.content_type())
            .body(body.to_vec())
            .send()
            .map_err(|source| DeliveryError::Http {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RespondTo;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// One-request-per-connection HTTP stub answering `status`.
    fn stub_server(status: u16, hits: Arc<AtomicUsize>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                drain_request(&mut stream);
                hits.fetch_add(1, Ordering::SeqCst);
                let reply = format!(
                    "HTTP/1.1 {} X\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    status
                );
                let _ = stream.write_all(reply.as_bytes());
            }
        });
        format!("http://{}/listener/probeResponse", addr)
    }

    /// Read headers and a content-length body so closing cannot reset.
    fn drain_request(stream: &mut std::net::TcpStream) {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = match stream.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            data.extend_from_slice(&buf[..n]);
            if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&data[..pos]).to_ascii_lowercase();
                let len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if data.len() >= pos + 4 + len {
                    return;
                }
            }
        }
    }

    fn probe_to(urls: &[String]) -> Probe {
        let mut probe = Probe::new();
        for (i, url) in urls.iter().enumerate() {
            probe.respond_to.push(RespondTo::new(format!("r{}", i), url.clone()));
        }
        probe
    }

    fn deliverer(policy: DeliveryPolicy) -> ResponseDeliverer {
        let config = DeliveryConfig {
            policy,
            timeout_ms: 2000,
        };
        ResponseDeliverer::new(&config, &TlsConfig::default()).unwrap()
    }

    #[test]
    fn test_first_only_posts_once() {
        let hits_a = Arc::new(AtomicUsize::new(0));
        let hits_b = Arc::new(AtomicUsize::new(0));
        let a = stub_server(200, Arc::clone(&hits_a));
        let b = stub_server(200, Arc::clone(&hits_b));
        let outcome = deliverer(DeliveryPolicy::First).deliver(&probe_to(&[a, b]), b"<x/>");
        assert_eq!(outcome.attempted, 1);
        assert!(outcome.is_success());
        assert_eq!(hits_a.load(Ordering::SeqCst), 1);
        assert_eq!(hits_b.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failover_skips_failing_address() {
        let hits_a = Arc::new(AtomicUsize::new(0));
        let hits_b = Arc::new(AtomicUsize::new(0));
        let hits_c = Arc::new(AtomicUsize::new(0));
        let a = stub_server(500, Arc::clone(&hits_a));
        let b = stub_server(200, Arc::clone(&hits_b));
        let c = stub_server(200, Arc::clone(&hits_c));
        let outcome =
            deliverer(DeliveryPolicy::Failover).deliver(&probe_to(&[a, b, c]), b"<x/>");
        assert_eq!(outcome.attempted, 2);
        assert_eq!(outcome.delivered, 1);
        assert!(matches!(
            outcome.failures[0],
            DeliveryError::Status { status: 500, .. }
        ));
        assert_eq!(hits_c.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_all_posts_everywhere() {
        let hits = Arc::new(AtomicUsize::new(0));
        let a = stub_server(200, Arc::clone(&hits));
        let b = stub_server(200, Arc::clone(&hits));
        let outcome = deliverer(DeliveryPolicy::All).deliver(&probe_to(&[a, b]), b"<x/>");
        assert_eq!(outcome.delivered, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unreachable_address_is_http_error() {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = format!("http://127.0.0.1:{}/", port);
        let outcome = deliverer(DeliveryPolicy::First).deliver(&probe_to(&[url]), b"{}");
        assert!(!outcome.is_success());
        assert!(matches!(outcome.failures[0], DeliveryError::Http { .. }));
    }

    #[test]
    fn test_missing_truststore_file() {
        let tls = TlsConfig {
            ca_cert_path: Some("/nonexistent/ca.pem".into()),
            identity_path: None,
        };
        assert!(matches!(
            ResponseDeliverer::new(&DeliveryConfig::default(), &tls),
            Err(ConfigError::Io(_))
        ));
    }
}
