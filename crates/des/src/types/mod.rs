// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Protocol data model: probes, responses and the service records they carry.

mod probe;
mod response;
mod service;

pub use probe::{PayloadType, Probe, RespondTo, DEFAULT_HOP_LIMIT};
pub use response::Response;
pub use service::{AccessPoint, Consumability, Service};

/// Mint a fresh `urn:uuid:` token for probe and response ids.
pub fn new_urn() -> String {
    format!("urn:uuid:{}", uuid::Uuid::new_v4())
}

/// Characters an XML 1.0 document may carry, escaped or not.
pub fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}'
            | '\u{10000}'..='\u{10FFFF}'
    )
}

/// First `(field, char)` pair whose text XML cannot carry.
pub(crate) fn find_non_xml<'a, I>(fields: I) -> Option<(&'static str, char)>
where
    I: IntoIterator<Item = (&'static str, &'a str)>,
{
    fields
        .into_iter()
        .find_map(|(field, text)| text.chars().find(|c| !is_xml_char(*c)).map(|c| (field, c)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_urn_is_unique() {
        let a = new_urn();
        let b = new_urn();
        assert!(a.starts_with("urn:uuid:"));
        assert_eq!(a.len(), "urn:uuid:".len() + 36);
        assert_ne!(a, b);
    }

    #[test]
    fn test_xml_char_ranges() {
        for c in ['\t', '\n', '\r', ' ', 'é', '\u{D7FF}', '\u{E000}', '\u{FFFD}', '\u{1F600}'] {
            assert!(is_xml_char(c), "{:?} should be allowed", c);
        }
        let forbidden = (0u32..0x20)
            .filter(|c| ![0x09, 0x0A, 0x0D].contains(c))
            .chain([0xFFFE, 0xFFFF])
            .filter_map(char::from_u32);
        for c in forbidden {
            assert!(!is_xml_char(c), "{:?} should be rejected", c);
        }
    }

    #[test]
    fn test_find_non_xml_reports_first_field() {
        let fields = [("a", "plain"), ("b", "x\u{1}y"), ("c", "\u{B}")];
        assert_eq!(find_non_xml(fields), Some(("b", '\u{1}')));
        assert_eq!(find_non_xml([("a", "tab\tok")]), None);
    }
}
