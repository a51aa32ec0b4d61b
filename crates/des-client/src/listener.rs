// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP listener that collects probe responses into a [`ResponseCache`].
//!
//! | Route | Method | |
//! |-------|--------|-|
//! | `/listener/probeResponse` | POST | XML or JSON response, by `Content-Type` |
//! | `/listener/responses` | GET | cached services as JSON |
//! | `/listener/clearCache` | GET | empty the cache |

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use des::wire::{self, json::services_to_json};
use des::{PayloadType, ResponseCache};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;

pub const PROBE_RESPONSE_PATH: &str = "/listener/probeResponse";
pub const RESPONSES_PATH: &str = "/listener/responses";
pub const CLEAR_CACHE_PATH: &str = "/listener/clearCache";

/// Shared by every request handler.
#[derive(Debug, Default)]
pub struct ListenerState {
    pub cache: ResponseCache,
    /// Responses accepted into the cache.
    pub accepted: AtomicU64,
    /// Bodies refused with a 4xx.
    pub refused: AtomicU64,
}

impl ListenerState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

pub fn router(state: Arc<ListenerState>) -> Router {
    Router::new()
        .route(PROBE_RESPONSE_PATH, post(on_probe_response))
        .route(RESPONSES_PATH, get(on_responses))
        .route(CLEAR_CACHE_PATH, get(on_clear_cache))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn on_probe_response(
    State(state): State<Arc<ListenerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    // A missing content type is read as XML.
    let format = match headers.get(header::CONTENT_TYPE) {
        None => Some(PayloadType::Xml),
        Some(value) => value.to_str().ok().and_then(wire::format_for_content_type),
    };
    let Some(format) = format else {
        state.refused.fetch_add(1, Ordering::Relaxed);
        return (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported content type");
    };

    match wire::decode_response(&body, format) {
        Ok(response) => {
            log::debug!(
                "[LISTENER] response {} for probe {} with {} services",
                response.response_id,
                response.probe_id,
                response.len()
            );
            state.cache.cache_all(&response);
            state.accepted.fetch_add(1, Ordering::Relaxed);
            (StatusCode::OK, "ok")
        }
        Err(e) => {
            log::warn!("[LISTENER] unreadable {} response: {}", format, e);
            state.refused.fetch_add(1, Ordering::Relaxed);
            (StatusCode::BAD_REQUEST, "malformed response")
        }
    }
}

async fn on_responses(State(state): State<Arc<ListenerState>>) -> Json<serde_json::Value> {
    Json(services_to_json(&state.cache.snapshot()))
}

async fn on_clear_cache(State(state): State<Arc<ListenerState>>) -> &'static str {
    state.cache.clear();
    "cache cleared"
}

/// Listener served from its own thread on a private tokio runtime.
pub struct ListenerHandle {
    local_addr: SocketAddr,
    state: Arc<ListenerState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<io::Result<()>>>,
}

impl ListenerHandle {
    /// Bind `addr` and start serving.
    pub fn spawn(addr: SocketAddr, state: Arc<ListenerState>) -> io::Result<Self> {
        let listener = std::net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(Arc::clone(&state));

        let thread = std::thread::Builder::new()
            .name("des-listener".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                runtime.block_on(async move {
                    let listener = tokio::net::TcpListener::from_std(listener)?;
                    axum::serve(listener, app)
                        .with_graceful_shutdown(async {
                            let _ = shutdown_rx.await;
                        })
                        .await
                })
            })?;

        log::info!("[LISTENER] serving on {}", local_addr);
        Ok(Self {
            local_addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> &Arc<ListenerState> {
        &self.state
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.state.cache
    }

    /// `http://host:port` as reachable on `host`.
    pub fn base_url(&self, host: &str) -> String {
        format!("http://{}:{}", host, self.local_addr.port())
    }

    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            match thread.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("[LISTENER] stopped with error: {}", e),
                Err(_) => log::error!("[LISTENER] server thread panicked"),
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
