// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OXM (OpenFlow Extensible Match) TLV matches.
//!
//! A `Match` is the ordered list of OXM TLVs that identify a flow. Its
//! equality and hash are defined over the *serialized* byte form so that
//! two matches built in different field order but with the same effective
//! constraint set never collide — `FlowVerifier`'s shadow table keys on
//! this.

use crate::cursor::{Cursor, CursorMut};
use crate::error::{WireError, WireResult};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// `OXM_CLASS_OPENFLOW_BASIC`, the only OXM class this controller builds
/// or inspects matches against.
pub const OXM_CLASS_OPENFLOW_BASIC: u16 = 0x8000;
/// `OFPXMT_OFB_IN_PORT`, the ingress port field link discovery reads off
/// an inbound `PacketIn`'s match.
pub const OFB_IN_PORT: u8 = 0;

/// A single OXM TLV: class/field/hasmask packed into the 32-bit OXM
/// header, followed by `value` (and `mask` when `hasmask` is set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OxmField {
    pub oxm_class: u16,
    pub oxm_field: u8,
    pub hasmask: bool,
    pub value: Vec<u8>,
    pub mask: Option<Vec<u8>>,
}

impl OxmField {
    pub fn header(&self) -> u32 {
        let length = self.value.len() as u8 + self.mask.as_ref().map_or(0, |m| m.len() as u8);
        ((self.oxm_class as u32) << 16)
            | ((self.oxm_field as u32) << 9)
            | ((self.hasmask as u32) << 8)
            | (length as u32)
    }
}

/// Ordered OXM match. Matches carrying the same fields in a different
/// order are NOT considered equal by this type; `FlowVerifier` always
/// canonicalizes before inserting so that equivalent switch/controller
/// representations converge (see `Match::canonicalize`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Match {
    pub fields: Vec<OxmField>,
}

impl Match {
    pub fn new() -> Self {
        Match::default()
    }

    pub fn with_field(mut self, field: OxmField) -> Self {
        self.fields.push(field);
        self
    }

    /// Sort fields by (class, field) so that two logically identical
    /// matches serialize identically regardless of construction order.
    pub fn canonicalize(mut self) -> Self {
        self.fields
            .sort_by_key(|f| (f.oxm_class, f.oxm_field, f.hasmask));
        self
    }

    /// Serialize the OXM TLV list with stable byte ordering, used both on
    /// the wire and as the hash/equality key for the shadow flow table.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for field in &self.fields {
            out.extend_from_slice(&field.header().to_be_bytes());
            out.extend_from_slice(&field.value);
            if let Some(mask) = &field.mask {
                out.extend_from_slice(mask);
            }
        }
        out
    }

    /// The ingress port carried by `OFPXMT_OFB_IN_PORT`, if present.
    pub fn in_port(&self) -> Option<u32> {
        self.fields
            .iter()
            .find(|f| f.oxm_class == OXM_CLASS_OPENFLOW_BASIC && f.oxm_field == OFB_IN_PORT)
            .and_then(|f| f.value.as_slice().try_into().ok())
            .map(u32::from_be_bytes)
    }

    pub fn encode(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        let body = self.to_bytes();
        // OFPMT_OXM match type = 1, length = 4 (type+length) + body, padded to 8.
        let match_len = 4 + body.len();
        cursor.write_u16(1)?;
        cursor.write_u16(match_len as u16)?;
        cursor.write_bytes(&body)?;
        let padded = crate::codec::pad_to(match_len, 8);
        cursor.skip(padded - match_len)?;
        Ok(())
    }

    /// Decodes a match whose TLV payload occupies exactly `body_len` bytes
    /// (the caller has already read and validated the type/length header).
    pub fn decode(cursor: &mut Cursor<'_>, body_len: usize) -> WireResult<Self> {
        let raw = cursor.read_bytes(body_len)?;
        let mut fields = Vec::new();
        let mut pos = 0usize;
        while pos + 4 <= raw.len() {
            let header = u32::from_be_bytes([raw[pos], raw[pos + 1], raw[pos + 2], raw[pos + 3]]);
            let oxm_class = (header >> 16) as u16;
            let oxm_field = ((header >> 9) & 0x7f) as u8;
            let hasmask = (header >> 8) & 0x1 != 0;
            let length = (header & 0xff) as usize;
            pos += 4;
            if pos + length > raw.len() {
                return Err(WireError::InvalidData {
                    reason: "oxm field length exceeds match body".into(),
                });
            }
            let payload = raw[pos..pos + length].to_vec();
            pos += length;
            let (value, mask) = if hasmask {
                let half = payload.len() / 2;
                (payload[..half].to_vec(), Some(payload[half..].to_vec()))
            } else {
                (payload, None)
            };
            fields.push(OxmField {
                oxm_class,
                oxm_field,
                hasmask,
                value,
                mask,
            });
        }
        Ok(Match { fields })
    }

    /// True if `self` (as the installed entry's match) is a non-strict
    /// superset of `narrower` — every field fixed by `narrower` is implied
    /// by a field in `self`. Used by flow-mod `modify`/`delete` to select
    /// affected entries.
    pub fn is_superset_of(&self, narrower: &Match) -> bool {
        narrower.fields.iter().all(|want| {
            self.fields
                .iter()
                .any(|have| have.oxm_class == want.oxm_class && have.oxm_field == want.oxm_field && have.value == want.value)
        })
    }
}

impl PartialEq for Match {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}
impl Eq for Match {}

impl Hash for Match {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_bytes().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth_type_field(value: u16) -> OxmField {
        OxmField {
            oxm_class: 0x8000,
            oxm_field: 5,
            hasmask: false,
            value: value.to_be_bytes().to_vec(),
            mask: None,
        }
    }

    #[test]
    fn matches_with_same_fields_different_order_compare_equal_after_canonicalize() {
        let a = Match::new()
            .with_field(eth_type_field(0x0800))
            .with_field(eth_type_field(0x86dd))
            .canonicalize();
        let b = Match::new()
            .with_field(eth_type_field(0x86dd))
            .with_field(eth_type_field(0x0800))
            .canonicalize();
        assert_eq!(a, b);
    }

    #[test]
    fn in_port_reads_back_the_ingress_port_field() {
        let m = Match::new().with_field(OxmField {
            oxm_class: OXM_CLASS_OPENFLOW_BASIC,
            oxm_field: OFB_IN_PORT,
            hasmask: false,
            value: 7u32.to_be_bytes().to_vec(),
            mask: None,
        });
        assert_eq!(m.in_port(), Some(7));
        assert_eq!(Match::new().in_port(), None);
    }

    #[test]
    fn superset_matches_narrower_match() {
        let wide = Match::new();
        let narrow = Match::new().with_field(eth_type_field(0x0800));
        assert!(wide.is_superset_of(&narrow));
        assert!(!narrow.is_superset_of(&Match::new().with_field(eth_type_field(0x86dd))));
    }

    #[test]
    fn roundtrip_through_bytes() {
        let m = Match::new().with_field(eth_type_field(0x0800)).canonicalize();
        let mut buf = [0u8; 64];
        {
            let mut w = CursorMut::new(&mut buf);
            m.encode(&mut w).unwrap();
        }
        let mut r = Cursor::new(&buf);
        assert_eq!(r.read_u16().unwrap(), 1); // match type
        let len = r.read_u16().unwrap() as usize;
        let decoded = Match::decode(&mut r, len - 4).unwrap();
        assert_eq!(decoded, m);
    }
}
