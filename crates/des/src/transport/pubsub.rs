// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP pub/sub broker transport.
//!
//! Probes are published to a broker topic; the broker fans them out by
//! POSTing to every subscribed endpoint. The receive side hosts that
//! endpoint with axum on a private single-threaded tokio runtime inside the
//! transport's receive thread. Decoded probes reach the sink through
//! `spawn_blocking`, since a caller-runs sink handles and delivers inline.
//!
//! ```text
//! send:  POST {broker}/topics/{topic}/messages        {"message": "<probe .../>"}
//! run:   POST {broker}/topics/{topic}/subscriptions   {"endpoint": callback_url, "protocol": "http"}
//!        broker -> POST callback_url                  {"type": "Notification", "message": "..."}
//!        broker -> POST callback_url                  {"type": "SubscriptionConfirmation", "subscribeUrl": "..."}
//! stop:  DELETE {broker}/topics/{topic}/subscriptions/{id}
//! ```

use super::{ProbeSink, Transport};
use crate::config::parse_settings;
use crate::error::{ConfigError, Error, TransportError};
use crate::types::{PayloadType, Probe};
use crate::wire;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Default probe size limit for broker messages.
pub const DEFAULT_MAX_PAYLOAD: usize = 262_144;

const BROKER_TIMEOUT: Duration = Duration::from_secs(10);

/// `[transports.settings]` for `kind = "pubsub"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PubSubSettings {
    /// Base URL of the broker's HTTP API.
    pub broker_url: String,

    pub topic: String,

    /// Local address the callback endpoint listens on.
    pub callback_bind: SocketAddr,

    /// URL under which the broker reaches `callback_bind`.
    pub callback_url: String,

    #[serde(default = "default_max_payload")]
    pub max_payload_size: usize,
}

fn default_max_payload() -> usize {
    DEFAULT_MAX_PAYLOAD
}

impl PubSubSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("broker_url", &self.broker_url),
            ("callback_url", &self.callback_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| ConfigError::Invalid(format!("{} '{}': {}", name, value, e)))?;
        }
        if self.topic.is_empty() || self.topic.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "topic '{}' must be non-empty and contain no '/'",
                self.topic
            )));
        }
        if self.max_payload_size == 0 {
            return Err(ConfigError::Invalid("max_payload_size must be at least 1".into()));
        }
        Ok(())
    }

    fn topic_url(&self) -> String {
        format!(
            "{}/topics/{}",
            self.broker_url.trim_end_matches('/'),
            self.topic
        )
    }
}

#[derive(Serialize)]
struct SubscribeRequest<'a> {
    endpoint: &'a str,
    protocol: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeReply {
    subscription_id: String,
}

#[derive(Serialize)]
struct PublishRequest<'a> {
    message: &'a str,
}

/// What the broker POSTs to the callback endpoint.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum BrokerMessage {
    Notification {
        message: String,
    },
    SubscriptionConfirmation {
        #[serde(rename = "subscribeUrl")]
        subscribe_url: String,
    },
}

struct CallbackState {
    sink: ProbeSink,
    http: reqwest::Client,
}

pub struct PubSubTransport {
    settings: PubSubSettings,
    http: reqwest::blocking::Client,
    subscription: Mutex<Option<String>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    shutdown_rx: Mutex<Option<oneshot::Receiver<()>>>,
    closed: AtomicBool,
}

impl PubSubTransport {
    pub fn open(settings: PubSubSettings) -> Result<Self, Error> {
        settings.validate()?;
        let http = reqwest::blocking::Client::builder()
            .timeout(BROKER_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Broker(e.to_string()))?;
        let (tx, rx) = oneshot::channel();
        Ok(Self {
            settings,
            http,
            subscription: Mutex::new(None),
            shutdown_tx: Mutex::new(Some(tx)),
            shutdown_rx: Mutex::new(Some(rx)),
            closed: AtomicBool::new(false),
        })
    }

    /// Factory entry for [`super::TransportRegistry`].
    pub fn from_settings(table: &toml::Table) -> Result<Arc<Self>, Error> {
        let settings: PubSubSettings = parse_settings(table)?;
        Ok(Arc::new(Self::open(settings)?))
    }

    pub fn settings(&self) -> &PubSubSettings {
        &self.settings
    }

    fn subscribe(&self) -> Result<String, TransportError> {
        let url = format!("{}/subscriptions", self.settings.topic_url());
        let reply = self
            .http
            .post(&url)
            .json(&SubscribeRequest {
                endpoint: &self.settings.callback_url,
                protocol: "http",
            })
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| TransportError::Broker(format!("subscribe via {}: {}", url, e)))?;
        let reply: SubscribeReply = reply
            .json()
            .map_err(|e| TransportError::Broker(format!("subscribe reply: {}", e)))?;
        log::info!(
            "[PUBSUB] subscribed {} to topic '{}' ({})",
            self.settings.callback_url,
            self.settings.topic,
            reply.subscription_id
        );
        Ok(reply.subscription_id)
    }

    fn unsubscribe(&self, subscription_id: &str) {
        let url = format!(
            "{}/subscriptions/{}",
            self.settings.topic_url(),
            subscription_id
        );
        match self.http.delete(&url).send().and_then(|r| r.error_for_status()) {
            Ok(_) => log::debug!("[PUBSUB] unsubscribed {}", subscription_id),
            Err(e) => log::warn!("[PUBSUB] unsubscribe {} failed: {}", subscription_id, e),
        }
    }
}

async fn on_callback(
    State(state): State<Arc<CallbackState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> StatusCode {
    let message: BrokerMessage = match serde_json::from_slice(&body) {
        Ok(m) => m,
        Err(e) => {
            log::debug!("[PUBSUB] unreadable callback from {}: {}", peer, e);
            return StatusCode::BAD_REQUEST;
        }
    };

    match message {
        BrokerMessage::Notification { message } => {
            match wire::decode_probe(message.as_bytes(), PayloadType::Xml) {
                Ok(probe) => {
                    let sink = Arc::clone(&state.sink);
                    match tokio::task::spawn_blocking(move || sink(probe, peer)).await {
                        Ok(()) => StatusCode::OK,
                        Err(e) => {
                            log::error!("[PUBSUB] probe from {} not dispatched: {}", peer, e);
                            StatusCode::INTERNAL_SERVER_ERROR
                        }
                    }
                }
                Err(e) => {
                    log::debug!("[PUBSUB] dropping malformed probe from {}: {}", peer, e);
                    StatusCode::BAD_REQUEST
                }
            }
        }
        BrokerMessage::SubscriptionConfirmation { subscribe_url } => {
            match state
                .http
                .get(&subscribe_url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
            {
                Ok(_) => {
                    log::info!("[PUBSUB] confirmed subscription via {}", subscribe_url);
                    StatusCode::OK
                }
                Err(e) => {
                    log::warn!("[PUBSUB] subscription confirmation failed: {}", e);
                    StatusCode::BAD_GATEWAY
                }
            }
        }
    }
}

impl Transport for PubSubTransport {
    fn run(&self, sink: ProbeSink) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        let shutdown_rx = self.shutdown_rx.lock().take().ok_or(TransportError::Closed)?;

        let listener = std::net::TcpListener::bind(self.settings.callback_bind)?;
        listener.set_nonblocking(true)?;
        let subscription_id = self.subscribe()?;
        *self.subscription.lock() = Some(subscription_id.clone());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let state = Arc::new(CallbackState {
            sink,
            http: reqwest::Client::new(),
        });

        log::debug!(
            "[PUBSUB] callback endpoint listening on {}",
            self.settings.callback_bind
        );
        let served = runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener)?;
            let app = Router::new()
                .route("/", post(on_callback))
                .route("/*path", post(on_callback))
                .with_state(state);
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
        });
        drop(runtime);

        if let Some(id) = self.subscription.lock().take() {
            self.unsubscribe(&id);
        }
        served.map_err(TransportError::Io)
    }

    fn send(&self, probe: &Probe) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let bytes = wire::encode_probe(probe, PayloadType::Xml);
        if bytes.len() > self.settings.max_payload_size {
            return Err(TransportError::PayloadTooLarge {
                size: bytes.len(),
                limit: self.settings.max_payload_size,
            });
        }
        let message = String::from_utf8_lossy(&bytes);
        let url = format!("{}/messages", self.settings.topic_url());
        self.http
            .post(&url)
            .json(&PublishRequest { message: &message })
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| TransportError::Broker(format!("publish to {}: {}", url, e)))?;
        log::debug!(
            "[PUBSUB] published probe {} to topic '{}'",
            probe.probe_id,
            self.settings.topic
        );
        Ok(())
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
    }

    fn max_payload_size(&self) -> usize {
        self.settings.max_payload_size
    }

    fn describe(&self) -> String {
        format!("pubsub({})", self.settings.topic_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProbeBuilder;
    use crate::config::ResponderConfig;
    use crate::registry::RegistryHandler;
    use crate::responder::{ProbeDisposition, RejectionPolicy, Responder};
    use crate::types::{Response, Service};
    use axum::extract::Path;
    use axum::routing::delete;
    use axum::Json;

    #[derive(Default)]
    struct MockBroker {
        events: Mutex<Vec<String>>,
    }

    /// Minimal broker on its own thread; returns its base URL.
    fn spawn_broker(broker: Arc<MockBroker>) -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async move {
                let app = Router::new()
                    .route(
                        "/topics/:topic/subscriptions",
                        post(
                            |State(b): State<Arc<MockBroker>>, Path(topic): Path<String>| async move {
                                b.events.lock().push(format!("subscribe {}", topic));
                                Json(serde_json::json!({"subscriptionId": "sub-1"}))
                            },
                        ),
                    )
                    .route(
                        "/topics/:topic/subscriptions/:id",
                        delete(
                            |State(b): State<Arc<MockBroker>>,
                             Path((_topic, id)): Path<(String, String)>| async move {
                                b.events.lock().push(format!("unsubscribe {}", id));
                                StatusCode::OK
                            },
                        ),
                    )
                    .route(
                        "/sink",
                        post(
                            |State(b): State<Arc<MockBroker>>, body: Bytes| async move {
                                b.events
                                    .lock()
                                    .push(format!("response {}", String::from_utf8_lossy(&body)));
                                StatusCode::OK
                            },
                        ),
                    )
                    .route(
                        "/topics/:topic/messages",
                        post(
                            |State(b): State<Arc<MockBroker>>, body: Bytes| async move {
                                let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
                                b.events
                                    .lock()
                                    .push(format!("publish {}", v["message"].as_str().unwrap_or("")));
                                StatusCode::OK
                            },
                        ),
                    )
                    .with_state(broker);
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                axum::serve(listener, app).await.unwrap();
            });
        });
        format!("http://{}", addr)
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn settings(broker_url: String) -> PubSubSettings {
        let port = free_port();
        PubSubSettings {
            broker_url,
            topic: "des-probes".into(),
            callback_bind: SocketAddr::from(([127, 0, 0, 1], port)),
            callback_url: format!("http://127.0.0.1:{}/des", port),
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }

    #[test]
    fn test_settings_validation() {
        let mut s = settings("http://broker:9000".into());
        assert!(s.validate().is_ok());
        s.topic = "a/b".into();
        assert!(s.validate().is_err());
        s.topic = "t".into();
        s.broker_url = "::not a url".into();
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_publish_subscribe_and_notification() {
        let broker = Arc::new(MockBroker::default());
        let base = spawn_broker(Arc::clone(&broker));
        let s = settings(base);
        let callback_url = s.callback_url.clone();
        let transport = Arc::new(PubSubTransport::open(s).unwrap());

        let probe = ProbeBuilder::new()
            .respond_to("a", "http://127.0.0.1:9/")
            .service_instance_id("svc-1")
            .build()
            .unwrap();

        // Publish goes to the broker's message endpoint.
        let mut published = false;
        for _ in 0..50 {
            if transport.send(&probe).is_ok() {
                published = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(published);
        assert!(broker
            .events
            .lock()
            .iter()
            .any(|e| e.starts_with("publish <probe")));

        // Inbound notifications reach the sink.
        let (tx, rx) = crossbeam::channel::bounded(1);
        let sink: ProbeSink = Arc::new(move |p: Probe, _src: SocketAddr| {
            let _ = tx.try_send(p);
        });
        let runner = Arc::clone(&transport);
        let handle = std::thread::spawn(move || runner.run(sink));

        let xml = String::from_utf8(wire::encode_probe(&probe, PayloadType::Xml)).unwrap();
        let http = reqwest::blocking::Client::new();
        let mut delivered = false;
        for _ in 0..50 {
            let sent = http
                .post(&callback_url)
                .json(&serde_json::json!({"type": "Notification", "message": xml}))
                .send();
            if matches!(sent, Ok(ref r) if r.status().is_success()) {
                delivered = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(delivered);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), probe);

        let bad = http
            .post(&callback_url)
            .json(&serde_json::json!({"type": "Notification", "message": "<nope/>"}))
            .send()
            .unwrap();
        assert_eq!(bad.status().as_u16(), 400);

        transport.shutdown();
        handle.join().unwrap().unwrap();

        let events = broker.events.lock().clone();
        assert!(events.contains(&"subscribe des-probes".to_string()));
        assert!(events.contains(&"unsubscribe sub-1".to_string()));
    }

    /// Holds one probe on a gate and answers every probe with one service.
    struct GatedHandler {
        hold: String,
        started: crossbeam::channel::Sender<()>,
        gate: crossbeam::channel::Receiver<()>,
    }

    impl RegistryHandler for GatedHandler {
        fn name(&self) -> &str {
            "gated"
        }

        fn handle(&self, probe: &Probe) -> Response {
            if probe.probe_id == self.hold {
                let _ = self.started.send(());
                let _ = self.gate.recv();
            }
            let mut response = Response::for_probe(probe);
            response.add_service(Service::new("svc-1", "urn:contract:x", "Gated"));
            response
        }
    }

    #[test]
    fn test_caller_runs_notification_delivers_off_the_runtime() {
        let broker = Arc::new(MockBroker::default());
        let base = spawn_broker(Arc::clone(&broker));
        let s = settings(base.clone());
        let callback_url = s.callback_url.clone();
        let transport = Arc::new(PubSubTransport::open(s).unwrap());
        let sink_url = format!("{}/sink", base);
        let to_sink = || {
            ProbeBuilder::new()
                .respond_to("broker", sink_url.as_str())
                .service_contract_id("urn:contract:x")
                .build()
                .unwrap()
        };

        let held = to_sink();
        let (started_tx, started_rx) = crossbeam::channel::unbounded();
        let (gate_tx, gate_rx) = crossbeam::channel::unbounded::<()>();
        let handler = Arc::new(GatedHandler {
            hold: held.probe_id.clone(),
            started: started_tx,
            gate: gate_rx,
        });
        let config = ResponderConfig {
            pool_size: 1,
            queue_capacity: 1,
            rejection_policy: RejectionPolicy::CallerRuns,
            ..Default::default()
        };
        let responder = Responder::new(
            &config,
            vec![transport as Arc<dyn Transport>],
            vec![handler as Arc<dyn RegistryHandler>],
        )
        .unwrap();
        responder.start().unwrap();

        // Busy worker plus a full queue: the next one runs on the caller.
        let src = SocketAddr::from(([127, 0, 0, 1], 1));
        assert_eq!(responder.process(held, src), ProbeDisposition::Dispatched);
        started_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(responder.process(to_sink(), src), ProbeDisposition::Dispatched);
        assert_eq!(responder.stats().pool.queued, 1);

        let inline = to_sink();
        let xml = String::from_utf8(wire::encode_probe(&inline, PayloadType::Xml)).unwrap();
        let http = reqwest::blocking::Client::new();
        let mut accepted = false;
        for _ in 0..50 {
            let sent = http
                .post(&callback_url)
                .json(&serde_json::json!({"type": "Notification", "message": xml}))
                .send();
            if matches!(sent, Ok(ref r) if r.status().is_success()) {
                accepted = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(accepted);

        // Delivered before the callback returned.
        let answered = broker
            .events
            .lock()
            .iter()
            .any(|e| e.starts_with("response") && e.contains(&inline.probe_id));
        assert!(answered);

        drop(gate_tx);
        responder.shutdown();
        let stats = responder.stats();
        assert_eq!(stats.handled, 3);
        assert_eq!(stats.responses_sent, 3);
        assert_eq!(stats.pool.rejected, 0);
    }
}
