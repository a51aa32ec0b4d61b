// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Probe splitting.
//!
//! An oversized probe is fragmented into several probes, each carrying the
//! full respondTo list and a disjoint slice of the query identifiers:
//!
//! ```text
//! probe{ra, scids[a..z], siids[1..9]}   (too big)
//!     -> frame{ra}  + a, b, c ...        (sealed when the next id would not fit)
//!     -> frame{ra}  + ... , 1, 2 ...
//!     -> frame{ra}  + ... 9              (always emitted)
//! ```
//!
//! Every piece is an independently answerable probe, so responders never
//! reassemble. Pieces get fresh probe ids; sharing one would make
//! responders deduplicate all but the first piece away.
//!
//! Identifiers are packed in one queue: every contract id in input order,
//! then every instance id. A piece may therefore mix the last contracts
//! with the first instances.

use crate::error::SplitError;
use crate::types::Probe;
use crate::wire::{self, xml};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdKind {
    Contract,
    Instance,
}

impl IdKind {
    fn container(self) -> &'static str {
        match self {
            Self::Contract => xml::SCIDS,
            Self::Instance => xml::SIIDS,
        }
    }

    fn item(self) -> &'static str {
        match self {
            Self::Contract => xml::SCID,
            Self::Instance => xml::SIID,
        }
    }

    fn list(self, probe: &Probe) -> &[String] {
        match self {
            Self::Contract => &probe.service_contract_ids,
            Self::Instance => &probe.service_instance_ids,
        }
    }

    fn push(self, probe: &mut Probe, id: &str) {
        match self {
            Self::Contract => probe.service_contract_ids.push(id.to_string()),
            Self::Instance => probe.service_instance_ids.push(id.to_string()),
        }
    }
}

/// Bytes added to `probe`'s encoding by appending `id` of `kind`.
fn append_cost(probe: &Probe, kind: IdKind, id: &str) -> usize {
    let container = if kind.list(probe).is_empty() {
        xml::container_len(kind.container())
    } else {
        0
    };
    container + xml::text_element_len(kind.item(), id)
}

/// Fragment `probe` so every piece encodes to at most `max_payload_size`
/// bytes.
///
/// A probe that already fits is returned unchanged (same id) as a single
/// element.
pub fn split_probe(probe: &Probe, max_payload_size: usize) -> Result<Vec<Probe>, SplitError> {
    if wire::probe_encoded_len(probe) <= max_payload_size {
        return Ok(vec![probe.clone()]);
    }

    let queue: Vec<(IdKind, &str)> = probe
        .service_contract_ids
        .iter()
        .map(|id| (IdKind::Contract, id.as_str()))
        .chain(
            probe
                .service_instance_ids
                .iter()
                .map(|id| (IdKind::Instance, id.as_str())),
        )
        .collect();

    // Frames are minted with fresh fixed-length ids, so every frame copy
    // encodes to the same size.
    let mut current = probe.frame();
    let frame_size = wire::probe_encoded_len(&current);
    let worst_single = queue
        .iter()
        .map(|&(kind, id)| append_cost(&current, kind, id))
        .max()
        .unwrap_or(0);
    if frame_size + worst_single > max_payload_size {
        log::warn!(
            "[SPLIT] frame of {} bytes cannot carry an identifier under limit {}",
            frame_size,
            max_payload_size
        );
        return Err(SplitError::RespondToTooLarge {
            frame_size,
            limit: max_payload_size,
        });
    }

    let mut pieces = Vec::new();
    let mut current_size = frame_size;

    for (kind, id) in queue {
        let mut cost = append_cost(&current, kind, id);
        if current.identifier_count() > 0 && current_size + cost > max_payload_size {
            debug_assert_eq!(wire::probe_encoded_len(&current), current_size);
            pieces.push(std::mem::replace(&mut current, probe.frame()));
            current_size = frame_size;
            cost = append_cost(&current, kind, id);
        }
        kind.push(&mut current, id);
        current_size += cost;
    }
    debug_assert_eq!(wire::probe_encoded_len(&current), current_size);
    pieces.push(current);

    log::debug!(
        "[SPLIT] probe {} ({} ids) split into {} pieces (limit {})",
        probe.probe_id,
        probe.identifier_count(),
        pieces.len(),
        max_payload_size
    );
    Ok(pieces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProbeBuilder;
    use std::collections::HashSet;

    fn probe_with_ids(contracts: usize, instances: usize) -> Probe {
        ProbeBuilder::new()
            .client_id("splitter")
            .hop_limit(3)
            .respond_to("a", "http://10.1.1.1:8080/listener/probeResponse")
            .respond_to("b", "http://10.1.1.2:8080/listener/probeResponse")
            .service_contract_ids((0..contracts).map(|i| format!("contract-{:04}", i)))
            .service_instance_ids((0..instances).map(|i| format!("instance-{:04}", i)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_small_probe_is_returned_unchanged() {
        let probe = probe_with_ids(3, 2);
        let pieces = split_probe(&probe, 65_000).unwrap();
        assert_eq!(pieces, vec![probe]);
    }

    #[test]
    fn test_split_partitions_identifiers() {
        let probe = probe_with_ids(40, 25);
        let limit = 900;
        assert!(wire::probe_encoded_len(&probe) > limit);

        let pieces = split_probe(&probe, limit).unwrap();
        assert!(pieces.len() > 1);

        let mut contracts = Vec::new();
        let mut instances = Vec::new();
        let mut ids = HashSet::new();
        for piece in &pieces {
            assert!(wire::probe_encoded_len(piece) <= limit);
            assert_eq!(piece.respond_to, probe.respond_to);
            assert_eq!(piece.client_id, probe.client_id);
            assert_eq!(piece.hop_limit, probe.hop_limit);
            assert_eq!(piece.payload_type, probe.payload_type);
            assert!(!piece.is_naked());
            assert!(ids.insert(piece.probe_id.clone()), "piece ids must be unique");
            contracts.extend(piece.service_contract_ids.iter().cloned());
            instances.extend(piece.service_instance_ids.iter().cloned());
        }
        assert!(!ids.contains(&probe.probe_id));
        assert_eq!(contracts, probe.service_contract_ids);
        assert_eq!(instances, probe.service_instance_ids);
    }

    #[test]
    fn test_contracts_are_packed_before_instances() {
        let probe = probe_with_ids(12, 12);
        let pieces = split_probe(&probe, 900).unwrap();
        assert!(pieces.len() > 1);

        let first_with_instances = pieces
            .iter()
            .position(|p| !p.service_instance_ids.is_empty())
            .unwrap();
        for piece in &pieces[..first_with_instances] {
            assert!(!piece.service_contract_ids.is_empty());
        }
        for piece in &pieces[first_with_instances + 1..] {
            assert!(piece.service_contract_ids.is_empty());
        }
        let last_contract = probe.service_contract_ids.last().unwrap();
        assert!(pieces[..=first_with_instances]
            .iter()
            .any(|p| p.service_contract_ids.contains(last_contract)));
    }

    #[test]
    fn test_equal_sized_ids_give_ceil_n_over_k() {
        let probe = probe_with_ids(50, 0);
        let limit = 1000;
        let pieces = split_probe(&probe, limit).unwrap();
        let k = pieces[0].identifier_count();
        assert!(k >= 1);
        assert_eq!(pieces.len(), 50usize.div_ceil(k));
        for piece in &pieces[..pieces.len() - 1] {
            assert_eq!(piece.identifier_count(), k);
        }
    }

    #[test]
    fn test_respond_to_list_too_large() {
        let mut builder = ProbeBuilder::new().service_contract_id("X");
        for i in 0..30 {
            builder = builder.respond_to(
                format!("alt-{}", i),
                format!("http://host-{}.example.org:8080/listener/probeResponse", i),
            );
        }
        let probe = builder.build().unwrap();
        let err = split_probe(&probe, 1024).unwrap_err();
        assert!(matches!(
            err,
            SplitError::RespondToTooLarge { limit: 1024, .. }
        ));
    }

    #[test]
    fn test_oversized_naked_probe_fails() {
        let mut builder = ProbeBuilder::new();
        for i in 0..30 {
            builder = builder.respond_to(format!("l{}", i), format!("http://h{}.example/", i));
        }
        let probe = builder.build().unwrap();
        assert!(split_probe(&probe, 256).is_err());
    }
}
