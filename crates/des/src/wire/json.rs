// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! JSON encoding.
//!
//! Object keys mirror the XML element and attribute names. Wire DTOs are
//! kept private and converted to the domain types, so the model itself
//! stays free of serde attributes.

use super::DES_VERSION;
use crate::error::ParseError;
use crate::types::{AccessPoint, Consumability, PayloadType, Probe, RespondTo, Response, Service};
use base64::Engine;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProbeEnvelope {
    probe: ProbeDto,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct ProbeDto {
    #[serde(rename = "DESVersion")]
    des_version: String,
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client: Option<String>,
    #[serde(default = "default_hop_limit")]
    hop_limit: u8,
    ra: Vec<RespondToDto>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    scids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    siids: Vec<String>,
    respond_to_payload_type: String,
}

fn default_hop_limit() -> u8 {
    crate::types::DEFAULT_HOP_LIMIT
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RespondToDto {
    label: String,
    url: String,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResponseEnvelope {
    #[serde(rename = "probeResponse")]
    probe_response: ResponseDto,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResponseDto {
    #[serde(rename = "DESVersion")]
    des_version: String,
    #[serde(rename = "responseID")]
    response_id: String,
    #[serde(rename = "probeID")]
    probe_id: String,
    services: Vec<ServiceDto>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServiceDto {
    id: String,
    #[serde(rename = "serviceContractID")]
    service_contract_id: String,
    #[serde(rename = "serviceName")]
    service_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(
        rename = "contractDescription",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    contract_description: Option<String>,
    consumability: String,
    ttl: u32,
    #[serde(rename = "accessPoints", default)]
    access_points: Vec<AccessPointDto>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct AccessPointDto {
    label: String,
    url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
}

impl From<&Service> for ServiceDto {
    fn from(s: &Service) -> Self {
        Self {
            id: s.id.clone(),
            service_contract_id: s.service_contract_id.clone(),
            service_name: s.service_name.clone(),
            description: s.description.clone(),
            contract_description: s.contract_description.clone(),
            consumability: s.consumability.as_str().to_string(),
            ttl: s.ttl,
            access_points: s
                .access_points
                .iter()
                .map(|ap| AccessPointDto {
                    label: ap.label.clone(),
                    url: ap.url.clone(),
                    ip_address: ap.ip_address.clone(),
                    port: ap.port,
                    data_type: ap.data_type.clone(),
                    data: ap
                        .data
                        .as_ref()
                        .map(|d| base64::engine::general_purpose::STANDARD.encode(d)),
                })
                .collect(),
        }
    }
}

impl TryFrom<ServiceDto> for Service {
    type Error = ParseError;

    fn try_from(dto: ServiceDto) -> Result<Self, Self::Error> {
        let consumability =
            dto.consumability
                .parse::<Consumability>()
                .map_err(|value| ParseError::InvalidValue {
                    field: "consumability",
                    value,
                })?;
        let access_points = dto
            .access_points
            .into_iter()
            .map(|ap| {
                let data = match ap.data {
                    Some(encoded) => Some(
                        base64::engine::general_purpose::STANDARD
                            .decode(encoded.as_bytes())
                            .map_err(|_| ParseError::InvalidValue {
                                field: "data",
                                value: encoded,
                            })?,
                    ),
                    None => None,
                };
                Ok(AccessPoint {
                    label: ap.label,
                    url: ap.url,
                    ip_address: ap.ip_address,
                    port: ap.port,
                    data_type: ap.data_type,
                    data,
                })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;

        Ok(Service {
            id: dto.id,
            service_contract_id: dto.service_contract_id,
            service_name: dto.service_name,
            description: dto.description,
            contract_description: dto.contract_description,
            consumability,
            ttl: dto.ttl,
            access_points,
        })
    }
}

fn malformed(err: serde_json::Error) -> ParseError {
    ParseError::Malformed(err.to_string())
}

fn check_characters(found: Option<(&'static str, char)>) -> Result<(), ParseError> {
    match found {
        Some((field, c)) => Err(ParseError::InvalidCharacter {
            field,
            code: u32::from(c),
        }),
        None => Ok(()),
    }
}

fn check_version(version: &str) -> Result<(), ParseError> {
    if version == DES_VERSION {
        Ok(())
    } else {
        Err(ParseError::VersionMismatch(version.to_string()))
    }
}

fn to_vec<T: Serialize>(value: &T) -> Vec<u8> {
    // Plain structs of strings and integers cannot fail to serialize.
    serde_json::to_vec(value).unwrap_or_default()
}

/// Encode a probe as JSON.
pub fn encode_probe(probe: &Probe) -> Vec<u8> {
    to_vec(&ProbeEnvelope {
        probe: ProbeDto {
            des_version: DES_VERSION.to_string(),
            id: probe.probe_id.clone(),
            client: probe.client_id.clone(),
            hop_limit: probe.hop_limit,
            ra: probe
                .respond_to
                .iter()
                .map(|rt| RespondToDto {
                    label: rt.label.clone(),
                    url: rt.url.clone(),
                })
                .collect(),
            scids: probe.service_contract_ids.clone(),
            siids: probe.service_instance_ids.clone(),
            respond_to_payload_type: probe.payload_type.as_str().to_string(),
        },
    })
}

/// Decode a JSON probe.
pub fn decode_probe(bytes: &[u8]) -> Result<Probe, ParseError> {
    let ProbeEnvelope { probe: dto } = serde_json::from_slice(bytes).map_err(malformed)?;
    check_version(&dto.des_version)?;
    if dto.ra.is_empty() {
        return Err(ParseError::MissingField("respondTo"));
    }
    let payload_type = dto
        .respond_to_payload_type
        .parse::<PayloadType>()
        .map_err(|_| ParseError::InvalidValue {
            field: "respondToPayloadType",
            value: dto.respond_to_payload_type.clone(),
        })?;

    let mut probe = Probe {
        probe_id: dto.id,
        client_id: dto.client,
        hop_limit: dto.hop_limit,
        respond_to: dto
            .ra
            .into_iter()
            .map(|rt| RespondTo::new(rt.label, rt.url))
            .collect(),
        payload_type,
        service_contract_ids: Vec::new(),
        service_instance_ids: Vec::new(),
    };
    for id in dto.scids {
        probe.add_service_contract_id(id);
    }
    for id in dto.siids {
        probe.add_service_instance_id(id);
    }
    check_characters(probe.find_non_xml_char())?;
    Ok(probe)
}

/// Encode a response as JSON.
pub fn encode_response(response: &Response) -> Vec<u8> {
    to_vec(&ResponseEnvelope {
        probe_response: ResponseDto {
            des_version: DES_VERSION.to_string(),
            response_id: response.response_id.clone(),
            probe_id: response.probe_id.clone(),
            services: response.services.iter().map(ServiceDto::from).collect(),
        },
    })
}

/// Decode a JSON response.
pub fn decode_response(bytes: &[u8]) -> Result<Response, ParseError> {
    let ResponseEnvelope { probe_response: dto } =
        serde_json::from_slice(bytes).map_err(malformed)?;
    check_version(&dto.des_version)?;
    let mut response = Response {
        response_id: dto.response_id,
        probe_id: dto.probe_id,
        services: Vec::new(),
    };
    check_characters(crate::types::find_non_xml([
        ("responseID", response.response_id.as_str()),
        ("probeID", response.probe_id.as_str()),
    ]))?;
    for service in dto.services {
        let service = Service::try_from(service)?;
        check_characters(service.find_non_xml_char())?;
        response.add_service(service);
    }
    Ok(response)
}

/// Encode a bare list of services (registry files, listener snapshots).
pub fn services_to_json(services: &[Service]) -> serde_json::Value {
    let dtos: Vec<ServiceDto> = services.iter().map(ServiceDto::from).collect();
    serde_json::to_value(dtos).unwrap_or(serde_json::Value::Array(Vec::new()))
}

/// Decode a bare JSON list of services.
pub fn services_from_json(bytes: &[u8]) -> Result<Vec<Service>, ParseError> {
    let dtos: Vec<ServiceDto> = serde_json::from_slice(bytes).map_err(malformed)?;
    dtos.into_iter()
        .map(|dto| {
            let service = Service::try_from(dto)?;
            check_characters(service.find_non_xml_char())?;
            Ok(service)
        })
        .collect()
}
