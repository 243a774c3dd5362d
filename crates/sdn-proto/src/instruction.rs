// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Instruction and action sets attached to a flow entry.
//!
//! The verifier only ever compares `(table, priority, match)` identity
//! (spec §4.6); instructions are carried opaquely end to end so the codec
//! does not need to understand every action's semantics, only its wire
//! shape, to preserve them faithfully across the shadow table.

use crate::cursor::{Cursor, CursorMut};
use crate::error::WireResult;
use serde::{Deserialize, Serialize};

/// `OFPIT_*` instruction type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionType {
    GotoTable = 1,
    WriteMetadata = 2,
    WriteActions = 3,
    ApplyActions = 4,
    ClearActions = 5,
    Meter = 6,
    Experimenter = 0xffff,
}

impl InstructionType {
    pub fn from_u16(code: u16) -> Option<Self> {
        use InstructionType::*;
        Some(match code {
            1 => GotoTable,
            2 => WriteMetadata,
            3 => WriteActions,
            4 => ApplyActions,
            5 => ClearActions,
            6 => Meter,
            0xffff => Experimenter,
            _ => return None,
        })
    }
}

/// An instruction carried by a flow entry. Action lists are preserved as
/// raw action-set bytes (`OFPAT_*` structures) since the controller never
/// needs to interpret them, only round-trip and compare entry identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub instruction_type: InstructionType,
    /// For `GotoTable`: single byte table id. For `WriteMetadata`: 8+8
    /// byte metadata/mask. For action-bearing instructions: raw
    /// concatenated `ofp_action_header`-prefixed action structures.
    pub payload: Vec<u8>,
}

impl Instruction {
    pub fn goto_table(table_id: u8) -> Self {
        Instruction {
            instruction_type: InstructionType::GotoTable,
            payload: vec![table_id, 0, 0, 0],
        }
    }

    pub fn apply_actions(actions: Vec<u8>) -> Self {
        Instruction {
            instruction_type: InstructionType::ApplyActions,
            payload: actions,
        }
    }

    pub fn encode(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        let len = 4 + self.payload.len();
        let padded = crate::codec::pad_to(len, 8);
        cursor.write_u16(self.instruction_type as u16)?;
        cursor.write_u16(padded as u16)?;
        cursor.write_bytes(&self.payload)?;
        cursor.skip(padded - len)?;
        Ok(())
    }

    pub fn decode(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        let raw_type = cursor.read_u16()?;
        let length = cursor.read_u16()? as usize;
        let instruction_type = InstructionType::from_u16(raw_type).unwrap_or(InstructionType::Experimenter);
        let payload = cursor.read_bytes(length.saturating_sub(4))?.to_vec();
        let padded = crate::codec::pad_to(length, 8);
        cursor.skip(padded - length)?;
        Ok(Instruction {
            instruction_type,
            payload,
        })
    }
}

/// Encodes a single `OFPAT_OUTPUT` action: the one action this workspace's
/// own callers build rather than merely round-trip (beacon `PacketOut`s,
/// spec §4.4).
pub fn output_action(port: u32, max_len: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(16);
    out.extend_from_slice(&0u16.to_be_bytes()); // OFPAT_OUTPUT
    out.extend_from_slice(&16u16.to_be_bytes());
    out.extend_from_slice(&port.to_be_bytes());
    out.extend_from_slice(&max_len.to_be_bytes());
    out.extend_from_slice(&[0u8; 6]);
    out
}

pub fn encode_instructions(cursor: &mut CursorMut<'_>, instructions: &[Instruction]) -> WireResult<()> {
    for ins in instructions {
        ins.encode(cursor)?;
    }
    Ok(())
}

pub fn decode_instructions(cursor: &mut Cursor<'_>, total_len: usize) -> WireResult<Vec<Instruction>> {
    let start = cursor.offset();
    let mut out = Vec::new();
    while cursor.offset() - start < total_len {
        out.push(Instruction::decode(cursor)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goto_table_roundtrips() {
        let ins = Instruction::goto_table(3);
        let mut buf = [0u8; 32];
        {
            let mut w = CursorMut::new(&mut buf);
            ins.encode(&mut w).unwrap();
        }
        let mut r = Cursor::new(&buf);
        let decoded = Instruction::decode(&mut r).unwrap();
        assert_eq!(decoded.instruction_type, InstructionType::GotoTable);
        assert_eq!(decoded.payload[0], 3);
    }

    #[test]
    fn output_action_encodes_port_and_max_len() {
        let bytes = output_action(7, 128);
        assert_eq!(bytes.len(), 16);
        assert_eq!(u16::from_be_bytes([bytes[0], bytes[1]]), 0);
        assert_eq!(u32::from_be_bytes(bytes[4..8].try_into().unwrap()), 7);
        assert_eq!(u16::from_be_bytes([bytes[8], bytes[9]]), 128);
    }
}
