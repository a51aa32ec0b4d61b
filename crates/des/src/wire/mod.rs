// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire codec for probes and responses.
//!
//! Two semantically equivalent encodings are supported:
//!
//! | Format | Probe | Response |
//! |--------|-------|----------|
//! | XML    | yes (the only format transports put on the wire) | yes |
//! | JSON   | yes (for tooling and round-trip symmetry) | yes |
//!
//! Encoding is pure. Decoding is strict: unknown elements or keys, missing
//! required fields and non-well-formed input all fail with a
//! [`ParseError`], so receive loops can drop noise without guessing.
//!
//! The XML writer emits no insignificant whitespace, which makes encoded
//! sizes exactly predictable (see [`probe_encoded_len`]); the probe splitter
//! depends on that.

pub mod json;
pub mod xml;

use crate::error::ParseError;
use crate::types::{PayloadType, Probe, Response};

/// Protocol version stamped on every probe and response.
pub const DES_VERSION: &str = "urn:uuid:3b7c4f2a-9c1d-4e8b-a6f0-5d2e1c9b7a40";

/// Encode a probe in the requested format.
pub fn encode_probe(probe: &Probe, format: PayloadType) -> Vec<u8> {
    match format {
        PayloadType::Xml => xml::encode_probe(probe).into_bytes(),
        PayloadType::Json => json::encode_probe(probe),
    }
}

/// Decode a probe from bytes in the given format.
pub fn decode_probe(bytes: &[u8], format: PayloadType) -> Result<Probe, ParseError> {
    match format {
        PayloadType::Xml => xml::decode_probe(utf8(bytes)?),
        PayloadType::Json => json::decode_probe(bytes),
    }
}

/// Encode a response in the requested format.
pub fn encode_response(response: &Response, format: PayloadType) -> Vec<u8> {
    match format {
        PayloadType::Xml => xml::encode_response(response).into_bytes(),
        PayloadType::Json => json::encode_response(response),
    }
}

/// Decode a response from bytes in the given format.
pub fn decode_response(bytes: &[u8], format: PayloadType) -> Result<Response, ParseError> {
    match format {
        PayloadType::Xml => xml::decode_response(utf8(bytes)?),
        PayloadType::Json => json::decode_response(bytes),
    }
}

/// Exact size in bytes of the XML encoding of `probe`.
pub fn probe_encoded_len(probe: &Probe) -> usize {
    xml::encode_probe(probe).len()
}

/// Map an HTTP `Content-Type` header value to a payload format.
pub fn format_for_content_type(content_type: &str) -> Option<PayloadType> {
    let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
    match mime.as_str() {
        "application/xml" | "text/xml" => Some(PayloadType::Xml),
        "application/json" => Some(PayloadType::Json),
        _ => None,
    }
}

fn utf8(bytes: &[u8]) -> Result<&str, ParseError> {
    std::str::from_utf8(bytes).map_err(|e| ParseError::Malformed(format!("invalid UTF-8: {}", e)))
}
