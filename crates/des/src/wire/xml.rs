// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! XML encoding.
//!
//! Reading goes through `roxmltree`; writing is a small deterministic
//! emitter (no indentation, fixed element order, fixed escaping) so that
//! [`escaped_len`] and [`text_element_len`] predict output sizes exactly.
//! Text is assumed to hold only XML characters; builders and decoders
//! refuse anything else (see [`crate::types::is_xml_char`]).

use super::DES_VERSION;
use crate::error::ParseError;
use crate::types::{
    AccessPoint, Consumability, PayloadType, Probe, RespondTo, Response, Service,
};
use base64::Engine;
use roxmltree::{Document, Node};

// Probe vocabulary
pub(crate) const PROBE: &str = "probe";
pub(crate) const RA: &str = "ra";
pub(crate) const RESPOND_TO: &str = "respondTo";
pub(crate) const SCIDS: &str = "scids";
pub(crate) const SCID: &str = "serviceContractID";
pub(crate) const SIIDS: &str = "siids";
pub(crate) const SIID: &str = "serviceInstanceID";
const PAYLOAD_TYPE: &str = "respondToPayloadType";
const ATTR_VERSION: &str = "DESVersion";
const ATTR_ID: &str = "id";
const ATTR_CLIENT: &str = "client";
const ATTR_HOP_LIMIT: &str = "hopLimit";
const ATTR_LABEL: &str = "label";

// Response vocabulary
const PROBE_RESPONSE: &str = "probeResponse";
const ATTR_RESPONSE_ID: &str = "responseID";
const ATTR_PROBE_ID: &str = "probeID";
const SERVICES: &str = "services";
const SERVICE: &str = "service";
const SERVICE_NAME: &str = "serviceName";
const DESCRIPTION: &str = "description";
const CONTRACT_DESCRIPTION: &str = "contractDescription";
const CONSUMABILITY: &str = "consumability";
const TTL: &str = "ttl";
const ACCESS_POINTS: &str = "accessPoints";
const ACCESS_POINT: &str = "accessPoint";
const URL: &str = "url";
const IP_ADDRESS: &str = "ipAddress";
const PORT: &str = "port";
const DATA_TYPE: &str = "dataType";
const DATA: &str = "data";

// ============================================================================
// Writer
// ============================================================================

fn escape_char(c: char) -> Option<&'static str> {
    match c {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        '"' => Some("&quot;"),
        '\'' => Some("&apos;"),
        // Parsers normalise these; character references survive untouched.
        '\t' => Some("&#9;"),
        '\n' => Some("&#10;"),
        '\r' => Some("&#13;"),
        _ => None,
    }
}

fn escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match escape_char(c) {
            Some(entity) => out.push_str(entity),
            None => out.push(c),
        }
    }
}

/// Byte length of `s` once escaped.
pub(crate) fn escaped_len(s: &str) -> usize {
    s.chars()
        .map(|c| escape_char(c).map_or(c.len_utf8(), str::len))
        .sum()
}

/// Byte length of `<tag>text</tag>`.
pub(crate) fn text_element_len(tag: &str, text: &str) -> usize {
    container_len(tag) + escaped_len(text)
}

/// Byte length of an empty `<tag></tag>` pair.
pub(crate) fn container_len(tag: &str) -> usize {
    2 * tag.len() + 5
}

struct XmlWriter {
    out: String,
}

impl XmlWriter {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            out: String::with_capacity(capacity),
        }
    }

    fn open(&mut self, tag: &str, attrs: &[(&str, &str)]) {
        self.out.push('<');
        self.out.push_str(tag);
        for (name, value) in attrs {
            self.out.push(' ');
            self.out.push_str(name);
            self.out.push_str("=\"");
            escape_into(&mut self.out, value);
            self.out.push('"');
        }
        self.out.push('>');
    }

    fn close(&mut self, tag: &str) {
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push('>');
    }

    fn text_element(&mut self, tag: &str, attrs: &[(&str, &str)], text: &str) {
        self.open(tag, attrs);
        escape_into(&mut self.out, text);
        self.close(tag);
    }

    fn optional_element(&mut self, tag: &str, text: Option<&str>) {
        if let Some(text) = text {
            self.text_element(tag, &[], text);
        }
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Encode a probe as compact XML.
pub fn encode_probe(probe: &Probe) -> String {
    let mut w = XmlWriter::with_capacity(256);
    let hop_limit = probe.hop_limit.to_string();
    let mut attrs = vec![(ATTR_VERSION, DES_VERSION), (ATTR_ID, probe.probe_id.as_str())];
    if let Some(client) = probe.client_id.as_deref() {
        attrs.push((ATTR_CLIENT, client));
    }
    attrs.push((ATTR_HOP_LIMIT, hop_limit.as_str()));
    w.open(PROBE, &attrs);

    w.open(RA, &[]);
    for rt in &probe.respond_to {
        w.text_element(RESPOND_TO, &[(ATTR_LABEL, rt.label.as_str())], &rt.url);
    }
    w.close(RA);

    if !probe.service_contract_ids.is_empty() {
        w.open(SCIDS, &[]);
        for id in &probe.service_contract_ids {
            w.text_element(SCID, &[], id);
        }
        w.close(SCIDS);
    }
    if !probe.service_instance_ids.is_empty() {
        w.open(SIIDS, &[]);
        for id in &probe.service_instance_ids {
            w.text_element(SIID, &[], id);
        }
        w.close(SIIDS);
    }

    w.text_element(PAYLOAD_TYPE, &[], probe.payload_type.as_str());
    w.close(PROBE);
    w.finish()
}

/// Encode a response as compact XML.
pub fn encode_response(response: &Response) -> String {
    let mut w = XmlWriter::with_capacity(512);
    w.open(
        PROBE_RESPONSE,
        &[
            (ATTR_VERSION, DES_VERSION),
            (ATTR_RESPONSE_ID, response.response_id.as_str()),
            (ATTR_PROBE_ID, response.probe_id.as_str()),
        ],
    );
    w.open(SERVICES, &[]);
    for service in &response.services {
        write_service(&mut w, service);
    }
    w.close(SERVICES);
    w.close(PROBE_RESPONSE);
    w.finish()
}

fn write_service(w: &mut XmlWriter, service: &Service) {
    w.open(SERVICE, &[(ATTR_ID, service.id.as_str())]);
    w.text_element(SCID, &[], &service.service_contract_id);
    w.text_element(SERVICE_NAME, &[], &service.service_name);
    w.optional_element(DESCRIPTION, service.description.as_deref());
    w.optional_element(CONTRACT_DESCRIPTION, service.contract_description.as_deref());
    w.text_element(CONSUMABILITY, &[], service.consumability.as_str());
    w.text_element(TTL, &[], &service.ttl.to_string());
    w.open(ACCESS_POINTS, &[]);
    for ap in &service.access_points {
        w.open(ACCESS_POINT, &[(ATTR_LABEL, ap.label.as_str())]);
        w.text_element(URL, &[], &ap.url);
        w.optional_element(IP_ADDRESS, ap.ip_address.as_deref());
        w.optional_element(PORT, ap.port.map(|p| p.to_string()).as_deref());
        w.optional_element(DATA_TYPE, ap.data_type.as_deref());
        if let Some(data) = &ap.data {
            let encoded = base64::engine::general_purpose::STANDARD.encode(data);
            w.text_element(DATA, &[], &encoded);
        }
        w.close(ACCESS_POINT);
    }
    w.close(ACCESS_POINTS);
    w.close(SERVICE);
}

// ============================================================================
// Reader
// ============================================================================

fn parse_document(text: &str) -> Result<Document<'_>, ParseError> {
    Document::parse(text).map_err(|e| ParseError::Malformed(e.to_string()))
}

fn expect_root<'a, 'input>(
    doc: &'a Document<'input>,
    expected: &'static str,
) -> Result<Node<'a, 'input>, ParseError> {
    let root = doc.root_element();
    let found = root.tag_name().name();
    if found != expected {
        return Err(ParseError::UnexpectedRoot {
            expected,
            found: found.to_string(),
        });
    }
    Ok(root)
}

fn check_attributes(node: Node<'_, '_>, allowed: &[&str]) -> Result<(), ParseError> {
    for attr in node.attributes() {
        if !allowed.contains(&attr.name()) {
            return Err(ParseError::UnknownAttribute {
                element: node.tag_name().name().to_string(),
                attribute: attr.name().to_string(),
            });
        }
    }
    Ok(())
}

fn check_version(node: Node<'_, '_>) -> Result<(), ParseError> {
    match node.attribute(ATTR_VERSION) {
        Some(DES_VERSION) => Ok(()),
        Some(other) => Err(ParseError::VersionMismatch(other.to_string())),
        None => Err(ParseError::MissingField(ATTR_VERSION)),
    }
}

fn required_attr(node: Node<'_, '_>, name: &'static str) -> Result<String, ParseError> {
    node.attribute(name)
        .map(str::to_string)
        .ok_or(ParseError::MissingField(name))
}

/// Element children of a container; stray non-whitespace text is an error.
fn child_elements<'a, 'input>(node: Node<'a, 'input>) -> Result<Vec<Node<'a, 'input>>, ParseError> {
    let mut out = Vec::new();
    for child in node.children() {
        if child.is_element() {
            out.push(child);
        } else if child.is_text() {
            if child.text().is_some_and(|t| !t.trim().is_empty()) {
                return Err(ParseError::Malformed(format!(
                    "unexpected text inside <{}>",
                    node.tag_name().name()
                )));
            }
        }
    }
    Ok(out)
}

/// Text content of a leaf element; `<a></a>` yields an empty string.
fn leaf_text(node: Node<'_, '_>) -> Result<String, ParseError> {
    let mut text = String::new();
    for child in node.children() {
        if child.is_element() {
            return Err(ParseError::UnknownElement(child.tag_name().name().to_string()));
        }
        if child.is_text() {
            text.push_str(child.text().unwrap_or_default());
        }
    }
    Ok(text)
}

fn plain_leaf(node: Node<'_, '_>) -> Result<String, ParseError> {
    check_attributes(node, &[])?;
    leaf_text(node)
}

fn set_once<T>(slot: &mut Option<T>, value: T, tag: &str) -> Result<(), ParseError> {
    if slot.is_some() {
        return Err(ParseError::Malformed(format!("duplicate <{}>", tag)));
    }
    *slot = Some(value);
    Ok(())
}

/// Decode an XML probe.
pub fn decode_probe(text: &str) -> Result<Probe, ParseError> {
    let doc = parse_document(text)?;
    let root = expect_root(&doc, PROBE)?;
    check_attributes(root, &[ATTR_VERSION, ATTR_ID, ATTR_CLIENT, ATTR_HOP_LIMIT])?;
    check_version(root)?;

    let probe_id = required_attr(root, ATTR_ID)?;
    let client_id = root.attribute(ATTR_CLIENT).map(str::to_string);
    let hop_limit = match root.attribute(ATTR_HOP_LIMIT) {
        Some(value) => value
            .trim()
            .parse::<u8>()
            .map_err(|_| ParseError::InvalidValue {
                field: ATTR_HOP_LIMIT,
                value: value.to_string(),
            })?,
        None => crate::types::DEFAULT_HOP_LIMIT,
    };

    let mut respond_to = None;
    let mut scids = None;
    let mut siids = None;
    let mut payload_type = None;

    for child in child_elements(root)? {
        match child.tag_name().name() {
            RA => set_once(&mut respond_to, decode_respond_to_list(child)?, RA)?,
            SCIDS => set_once(&mut scids, decode_id_list(child, SCID)?, SCIDS)?,
            SIIDS => set_once(&mut siids, decode_id_list(child, SIID)?, SIIDS)?,
            PAYLOAD_TYPE => {
                let value = plain_leaf(child)?;
                let parsed = value
                    .parse::<PayloadType>()
                    .map_err(|_| ParseError::InvalidValue {
                        field: PAYLOAD_TYPE,
                        value,
                    })?;
                set_once(&mut payload_type, parsed, PAYLOAD_TYPE)?;
            }
            other => return Err(ParseError::UnknownElement(other.to_string())),
        }
    }

    let respond_to = respond_to.ok_or(ParseError::MissingField(RA))?;
    if respond_to.is_empty() {
        return Err(ParseError::MissingField(RESPOND_TO));
    }

    let mut probe = Probe {
        probe_id,
        client_id,
        hop_limit,
        respond_to,
        payload_type: payload_type.ok_or(ParseError::MissingField(PAYLOAD_TYPE))?,
        service_contract_ids: Vec::new(),
        service_instance_ids: Vec::new(),
    };
    for id in scids.unwrap_or_default() {
        probe.add_service_contract_id(id);
    }
    for id in siids.unwrap_or_default() {
        probe.add_service_instance_id(id);
    }
    Ok(probe)
}

fn decode_respond_to_list(node: Node<'_, '_>) -> Result<Vec<RespondTo>, ParseError> {
    check_attributes(node, &[])?;
    child_elements(node)?
        .into_iter()
        .map(|child| {
            if child.tag_name().name() != RESPOND_TO {
                return Err(ParseError::UnknownElement(
                    child.tag_name().name().to_string(),
                ));
            }
            check_attributes(child, &[ATTR_LABEL])?;
            Ok(RespondTo {
                label: required_attr(child, ATTR_LABEL)?,
                url: leaf_text(child)?,
            })
        })
        .collect()
}

fn decode_id_list(node: Node<'_, '_>, item: &str) -> Result<Vec<String>, ParseError> {
    check_attributes(node, &[])?;
    child_elements(node)?
        .into_iter()
        .map(|child| {
            if child.tag_name().name() != item {
                return Err(ParseError::UnknownElement(
                    child.tag_name().name().to_string(),
                ));
            }
            plain_leaf(child)
        })
        .collect()
}

/// Decode an XML response.
pub fn decode_response(text: &str) -> Result<Response, ParseError> {
    let doc = parse_document(text)?;
    let root = expect_root(&doc, PROBE_RESPONSE)?;
    check_attributes(root, &[ATTR_VERSION, ATTR_RESPONSE_ID, ATTR_PROBE_ID])?;
    check_version(root)?;

    let mut response = Response {
        response_id: required_attr(root, ATTR_RESPONSE_ID)?,
        probe_id: required_attr(root, ATTR_PROBE_ID)?,
        services: Vec::new(),
    };

    let mut seen_services = false;
    for child in child_elements(root)? {
        if child.tag_name().name() != SERVICES {
            return Err(ParseError::UnknownElement(
                child.tag_name().name().to_string(),
            ));
        }
        if seen_services {
            return Err(ParseError::Malformed(format!("duplicate <{}>", SERVICES)));
        }
        seen_services = true;
        check_attributes(child, &[])?;
        for service in child_elements(child)? {
            if service.tag_name().name() != SERVICE {
                return Err(ParseError::UnknownElement(
                    service.tag_name().name().to_string(),
                ));
            }
            response.add_service(decode_service(service)?);
        }
    }
    if !seen_services {
        return Err(ParseError::MissingField(SERVICES));
    }
    Ok(response)
}

fn decode_service(node: Node<'_, '_>) -> Result<Service, ParseError> {
    check_attributes(node, &[ATTR_ID])?;
    let id = required_attr(node, ATTR_ID)?;

    let mut contract_id = None;
    let mut name = None;
    let mut description = None;
    let mut contract_description = None;
    let mut consumability = None;
    let mut ttl = None;
    let mut access_points = None;

    for child in child_elements(node)? {
        let tag = child.tag_name().name();
        match tag {
            SCID => set_once(&mut contract_id, plain_leaf(child)?, tag)?,
            SERVICE_NAME => set_once(&mut name, plain_leaf(child)?, tag)?,
            DESCRIPTION => set_once(&mut description, plain_leaf(child)?, tag)?,
            CONTRACT_DESCRIPTION => set_once(&mut contract_description, plain_leaf(child)?, tag)?,
            CONSUMABILITY => {
                let value = plain_leaf(child)?;
                let parsed = value
                    .trim()
                    .parse::<Consumability>()
                    .map_err(|value| ParseError::InvalidValue {
                        field: CONSUMABILITY,
                        value,
                    })?;
                set_once(&mut consumability, parsed, tag)?;
            }
            TTL => {
                let value = plain_leaf(child)?;
                let parsed = value
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| ParseError::InvalidValue { field: TTL, value })?;
                set_once(&mut ttl, parsed, tag)?;
            }
            ACCESS_POINTS => {
                check_attributes(child, &[])?;
                let points = child_elements(child)?
                    .into_iter()
                    .map(decode_access_point)
                    .collect::<Result<Vec<_>, _>>()?;
                set_once(&mut access_points, points, tag)?;
            }
            other => return Err(ParseError::UnknownElement(other.to_string())),
        }
    }

    Ok(Service {
        id,
        service_contract_id: contract_id.ok_or(ParseError::MissingField(SCID))?,
        service_name: name.ok_or(ParseError::MissingField(SERVICE_NAME))?,
        description,
        contract_description,
        consumability: consumability.ok_or(ParseError::MissingField(CONSUMABILITY))?,
        ttl: ttl.ok_or(ParseError::MissingField(TTL))?,
        access_points: access_points.unwrap_or_default(),
    })
}

fn decode_access_point(node: Node<'_, '_>) -> Result<AccessPoint, ParseError> {
    if node.tag_name().name() != ACCESS_POINT {
        return Err(ParseError::UnknownElement(node.tag_name().name().to_string()));
    }
    check_attributes(node, &[ATTR_LABEL])?;
    let label = required_attr(node, ATTR_LABEL)?;

    let mut url = None;
    let mut ip_address = None;
    let mut port = None;
    let mut data_type = None;
    let mut data = None;

    for child in child_elements(node)? {
        let tag = child.tag_name().name();
        match tag {
            URL => set_once(&mut url, plain_leaf(child)?, tag)?,
            IP_ADDRESS => set_once(&mut ip_address, plain_leaf(child)?, tag)?,
            PORT => {
                let value = plain_leaf(child)?;
                let parsed = value
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| ParseError::InvalidValue { field: PORT, value })?;
                set_once(&mut port, parsed, tag)?;
            }
            DATA_TYPE => set_once(&mut data_type, plain_leaf(child)?, tag)?,
            DATA => {
                let value = plain_leaf(child)?;
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(value.trim())
                    .map_err(|_| ParseError::InvalidValue { field: DATA, value })?;
                set_once(&mut data, bytes, tag)?;
            }
            other => return Err(ParseError::UnknownElement(other.to_string())),
        }
    }

    Ok(AccessPoint {
        label,
        url: url.ok_or(ParseError::MissingField(URL))?,
        ip_address,
        port,
        data_type,
        data,
    })
}
