// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DES client listener.
//!
//! Responders POST their answers to the address a probe names in its
//! respondTo list. This crate hosts that endpoint and keeps what arrives in
//! a [`des::ResponseCache`].
//!
//! | Method | Path | |
//! |--------|------|-|
//! | POST | `/listener/probeResponse` | XML or JSON response, by content type |
//! | GET | `/listener/responses` | cached services as a JSON array |
//! | GET | `/listener/clearCache` | empty the cache |

mod listener;

pub use listener::{
    router, ListenerHandle, ListenerState, CLEAR_CACHE_PATH, PROBE_RESPONSE_PATH, RESPONSES_PATH,
};
