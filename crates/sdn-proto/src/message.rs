// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed OpenFlow 1.3 message bodies.
//!
//! [`Message`] is the tagged sum Design Note 9 ("Dynamic dispatch of
//! decoded messages") calls for: one variant per `OFPT_*` type plus
//! `Unknown` for anything the codec cannot classify. Dispatchers are
//! plain `match` over this tag; multipart bodies recursively dispatch on
//! `OfpMultipartType`.

use crate::constants::{FlowModCommand, FlowRemovedReason, OfpControllerRole, OfpMultipartType, OfpType};
use crate::cursor::{Cursor, CursorMut};
use crate::error::{WireError, WireResult};
use crate::instruction::{decode_instructions, encode_instructions, Instruction};
use crate::oxm::Match;
use serde::{Deserialize, Serialize};

fn read_fixed_string(cursor: &mut Cursor<'_>, len: usize) -> WireResult<String> {
    let raw = cursor.read_bytes(len)?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
}

fn write_fixed_string(cursor: &mut CursorMut<'_>, value: &str, len: usize) -> WireResult<()> {
    let mut buf = vec![0u8; len];
    let bytes = value.as_bytes();
    let n = bytes.len().min(len.saturating_sub(1));
    buf[..n].copy_from_slice(&bytes[..n]);
    cursor.write_bytes(&buf)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDesc {
    pub port_no: u32,
    pub hw_addr: [u8; 6],
    pub name: String,
    pub config: u32,
    pub state: u32,
    pub curr: u32,
    pub advertised: u32,
    pub supported: u32,
    pub peer: u32,
    pub curr_speed: u32,
    pub max_speed: u32,
}

impl PortDesc {
    pub const WIRE_LEN: usize = 64;

    pub fn encode(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        cursor.write_u32(self.port_no)?;
        cursor.skip(4)?; // pad
        cursor.write_bytes(&self.hw_addr)?;
        cursor.skip(2)?; // pad
        write_fixed_string(cursor, &self.name, 16)?;
        cursor.write_u32(self.config)?;
        cursor.write_u32(self.state)?;
        cursor.write_u32(self.curr)?;
        cursor.write_u32(self.advertised)?;
        cursor.write_u32(self.supported)?;
        cursor.write_u32(self.peer)?;
        cursor.write_u32(self.curr_speed)?;
        cursor.write_u32(self.max_speed)
    }

    pub fn decode(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        let port_no = cursor.read_u32()?;
        cursor.skip(4)?;
        let hw_addr = {
            let raw = cursor.read_bytes(6)?;
            let mut arr = [0u8; 6];
            arr.copy_from_slice(raw);
            arr
        };
        cursor.skip(2)?;
        let name = read_fixed_string(cursor, 16)?;
        let config = cursor.read_u32()?;
        let state = cursor.read_u32()?;
        let curr = cursor.read_u32()?;
        let advertised = cursor.read_u32()?;
        let supported = cursor.read_u32()?;
        let peer = cursor.read_u32()?;
        let curr_speed = cursor.read_u32()?;
        let max_speed = cursor.read_u32()?;
        Ok(PortDesc {
            port_no,
            hw_addr,
            name,
            config,
            state,
            curr,
            advertised,
            supported,
            peer,
            curr_speed,
            max_speed,
        })
    }

    /// Link-down bit of the state bitmap (`OFPPS_LINK_DOWN` = bit 0).
    pub fn link_down(&self) -> bool {
        self.state & 0x1 != 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchFeatures {
    pub datapath_id: u64,
    pub n_buffers: u32,
    pub n_tables: u8,
    pub auxiliary_id: u8,
    pub capabilities: u32,
}

impl SwitchFeatures {
    pub fn encode(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        cursor.write_u64(self.datapath_id)?;
        cursor.write_u32(self.n_buffers)?;
        cursor.write_u8(self.n_tables)?;
        cursor.write_u8(self.auxiliary_id)?;
        cursor.skip(2)?; // pad
        cursor.write_u32(self.capabilities)?;
        cursor.write_u32(0) // reserved
    }

    pub fn decode(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        let datapath_id = cursor.read_u64()?;
        let n_buffers = cursor.read_u32()?;
        let n_tables = cursor.read_u8()?;
        let auxiliary_id = cursor.read_u8()?;
        cursor.skip(2)?;
        let capabilities = cursor.read_u32()?;
        cursor.skip(4)?;
        Ok(SwitchFeatures {
            datapath_id,
            n_buffers,
            n_tables,
            auxiliary_id,
            capabilities,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchDescription {
    pub mfr_desc: String,
    pub hw_desc: String,
    pub sw_desc: String,
    pub serial_num: String,
    pub dp_desc: String,
}

impl SwitchDescription {
    pub fn encode(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        write_fixed_string(cursor, &self.mfr_desc, 256)?;
        write_fixed_string(cursor, &self.hw_desc, 256)?;
        write_fixed_string(cursor, &self.sw_desc, 256)?;
        write_fixed_string(cursor, &self.serial_num, 32)?;
        write_fixed_string(cursor, &self.dp_desc, 256)
    }

    pub fn decode(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        Ok(SwitchDescription {
            mfr_desc: read_fixed_string(cursor, 256)?,
            hw_desc: read_fixed_string(cursor, 256)?,
            sw_desc: read_fixed_string(cursor, 256)?,
            serial_num: read_fixed_string(cursor, 32)?,
            dp_desc: read_fixed_string(cursor, 256)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowMod {
    pub cookie: u64,
    pub cookie_mask: u64,
    pub table_id: u8,
    pub command: FlowModCommand,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub priority: u16,
    pub buffer_id: u32,
    pub out_port: u32,
    pub out_group: u32,
    pub flags: u16,
    #[serde(rename = "match")]
    pub match_: Match,
    pub instructions: Vec<Instruction>,
}

/// `OFPFF_SEND_FLOW_REM` — ask the switch to emit flow-removed on evict.
pub const FLOW_MOD_FLAG_SEND_FLOW_REMOVED: u16 = 0x0001;
/// Wildcard table id meaning "every table" for delete commands.
pub const OFPTT_ALL: u8 = 0xff;

impl FlowMod {
    pub fn encode(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        cursor.write_u64(self.cookie)?;
        cursor.write_u64(self.cookie_mask)?;
        cursor.write_u8(self.table_id)?;
        cursor.write_u8(self.command as u8)?;
        cursor.write_u16(self.idle_timeout)?;
        cursor.write_u16(self.hard_timeout)?;
        cursor.write_u16(self.priority)?;
        cursor.write_u32(self.buffer_id)?;
        cursor.write_u32(self.out_port)?;
        cursor.write_u32(self.out_group)?;
        cursor.write_u16(self.flags)?;
        cursor.skip(2)?; // pad
        self.match_.encode(cursor)?;
        encode_instructions(cursor, &self.instructions)
    }

    pub fn decode(cursor: &mut Cursor<'_>, body_len: usize) -> WireResult<Self> {
        let start = cursor.offset();
        let cookie = cursor.read_u64()?;
        let cookie_mask = cursor.read_u64()?;
        let table_id = cursor.read_u8()?;
        let command_code = cursor.read_u8()?;
        let command = FlowModCommand::from_u8(command_code)
            .ok_or(WireError::InvalidData { reason: format!("unknown flow-mod command {command_code}") })?;
        let idle_timeout = cursor.read_u16()?;
        let hard_timeout = cursor.read_u16()?;
        let priority = cursor.read_u16()?;
        let buffer_id = cursor.read_u32()?;
        let out_port = cursor.read_u32()?;
        let out_group = cursor.read_u32()?;
        let flags = cursor.read_u16()?;
        cursor.skip(2)?;
        cursor.skip(2)?; // match type (already validated by caller pattern elsewhere)
        let match_len = cursor.read_u16()? as usize;
        let match_ = Match::decode(cursor, match_len.saturating_sub(4))?;
        let padded_match = crate::codec::pad_to(match_len, 8);
        cursor.skip(padded_match - match_len)?;
        let consumed = cursor.offset() - start;
        let instructions = decode_instructions(cursor, body_len.saturating_sub(consumed))?;
        Ok(FlowMod {
            cookie,
            cookie_mask,
            table_id,
            command,
            idle_timeout,
            hard_timeout,
            priority,
            buffer_id,
            out_port,
            out_group,
            flags,
            match_,
            instructions,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRemoved {
    pub cookie: u64,
    pub priority: u16,
    pub reason: FlowRemovedReason,
    pub table_id: u8,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub packet_count: u64,
    pub byte_count: u64,
    #[serde(rename = "match")]
    pub match_: Match,
}

impl FlowRemoved {
    pub fn decode(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        let cookie = cursor.read_u64()?;
        let priority = cursor.read_u16()?;
        let reason_code = cursor.read_u8()?;
        let reason = FlowRemovedReason::from_u8(reason_code)
            .ok_or(WireError::InvalidData { reason: format!("unknown flow-removed reason {reason_code}") })?;
        let table_id = cursor.read_u8()?;
        let duration_sec = cursor.read_u32()?;
        let duration_nsec = cursor.read_u32()?;
        let idle_timeout = cursor.read_u16()?;
        let hard_timeout = cursor.read_u16()?;
        cursor.skip(4)?;
        let packet_count = cursor.read_u64()?;
        let byte_count = cursor.read_u64()?;
        cursor.skip(2)?;
        let match_len = cursor.read_u16()? as usize;
        let match_ = Match::decode(cursor, match_len.saturating_sub(4))?;
        let padded = crate::codec::pad_to(match_len, 8);
        cursor.skip(padded - match_len)?;
        Ok(FlowRemoved {
            cookie,
            priority,
            reason,
            table_id,
            duration_sec,
            duration_nsec,
            idle_timeout,
            hard_timeout,
            packet_count,
            byte_count,
            match_,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortStatus {
    pub reason: u8,
    pub desc: PortDesc,
}

impl PortStatus {
    pub fn decode(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        let reason = cursor.read_u8()?;
        cursor.skip(7)?;
        let desc = PortDesc::decode(cursor)?;
        Ok(PortStatus { reason, desc })
    }

    pub fn encode(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        cursor.write_u8(self.reason)?;
        cursor.skip(7)?;
        self.desc.encode(cursor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketIn {
    pub buffer_id: u32,
    pub total_len: u16,
    pub reason: u8,
    pub table_id: u8,
    pub cookie: u64,
    #[serde(rename = "match")]
    pub match_: Match,
    pub data: Vec<u8>,
}

impl PacketIn {
    pub fn decode(cursor: &mut Cursor<'_>, body_len: usize) -> WireResult<Self> {
        let start = cursor.offset();
        let buffer_id = cursor.read_u32()?;
        let total_len = cursor.read_u16()?;
        let reason = cursor.read_u8()?;
        let table_id = cursor.read_u8()?;
        let cookie = cursor.read_u64()?;
        cursor.skip(2)?;
        let match_len = cursor.read_u16()? as usize;
        let match_ = Match::decode(cursor, match_len.saturating_sub(4))?;
        let padded = crate::codec::pad_to(match_len, 8);
        cursor.skip(padded - match_len)?;
        cursor.skip(2)?; // pad
        let consumed = cursor.offset() - start;
        let data = cursor.read_bytes(body_len.saturating_sub(consumed))?.to_vec();
        Ok(PacketIn {
            buffer_id,
            total_len,
            reason,
            table_id,
            cookie,
            match_,
            data,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketOut {
    pub buffer_id: u32,
    pub in_port: u32,
    pub actions: Vec<u8>,
    pub data: Vec<u8>,
}

impl PacketOut {
    pub fn encode(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        cursor.write_u32(self.buffer_id)?;
        cursor.write_u32(self.in_port)?;
        cursor.write_u16(self.actions.len() as u16)?;
        cursor.skip(6)?;
        cursor.write_bytes(&self.actions)?;
        cursor.write_bytes(&self.data)
    }

    pub fn decode(cursor: &mut Cursor<'_>, body_len: usize) -> WireResult<Self> {
        let start = cursor.offset();
        let buffer_id = cursor.read_u32()?;
        let in_port = cursor.read_u32()?;
        let actions_len = cursor.read_u16()? as usize;
        cursor.skip(6)?;
        let actions = cursor.read_bytes(actions_len)?.to_vec();
        let consumed = cursor.offset() - start;
        let data = cursor.read_bytes(body_len.saturating_sub(consumed))?.to_vec();
        Ok(PacketOut {
            buffer_id,
            in_port,
            actions,
            data,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMsg {
    pub error_type: u16,
    pub code: u16,
    pub data: Vec<u8>,
}

impl ErrorMsg {
    pub fn decode(cursor: &mut Cursor<'_>, body_len: usize) -> WireResult<Self> {
        let error_type = cursor.read_u16()?;
        let code = cursor.read_u16()?;
        let data = cursor.read_bytes(body_len.saturating_sub(4))?.to_vec();
        Ok(ErrorMsg { error_type, code, data })
    }

    pub fn encode(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        cursor.write_u16(self.error_type)?;
        cursor.write_u16(self.code)?;
        cursor.write_bytes(&self.data)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleMsg {
    pub role: OfpControllerRole,
    pub generation_id: u64,
}

impl RoleMsg {
    pub fn encode(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        cursor.write_u32(self.role.to_u32())?;
        cursor.skip(4)?;
        cursor.write_u64(self.generation_id)
    }

    pub fn decode(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        let role_code = cursor.read_u32()?;
        let role = OfpControllerRole::from_u32(role_code)
            .ok_or(WireError::InvalidData { reason: format!("unknown role {role_code}") })?;
        cursor.skip(4)?;
        let generation_id = cursor.read_u64()?;
        Ok(RoleMsg { role, generation_id })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchConfig {
    pub flags: u16,
    pub miss_send_len: u16,
}

impl SwitchConfig {
    pub fn encode(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        cursor.write_u16(self.flags)?;
        cursor.write_u16(self.miss_send_len)
    }

    pub fn decode(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        Ok(SwitchConfig {
            flags: cursor.read_u16()?,
            miss_send_len: cursor.read_u16()?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowStatsEntry {
    pub table_id: u8,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub cookie: u64,
    pub packet_count: u64,
    pub byte_count: u64,
    #[serde(rename = "match")]
    pub match_: Match,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateStats {
    pub packet_count: u64,
    pub byte_count: u64,
    pub flow_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortStatsEntry {
    pub port_no: u32,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub duration_sec: u32,
    pub duration_nsec: u32,
}

impl PortStatsEntry {
    pub fn decode(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        let port_no = cursor.read_u32()?;
        cursor.skip(4)?;
        let rx_packets = cursor.read_u64()?;
        let tx_packets = cursor.read_u64()?;
        let rx_bytes = cursor.read_u64()?;
        let tx_bytes = cursor.read_u64()?;
        let rx_dropped = cursor.read_u64()?;
        let tx_dropped = cursor.read_u64()?;
        let rx_errors = cursor.read_u64()?;
        let tx_errors = cursor.read_u64()?;
        cursor.skip(8 * 4)?; // rx_frame/over/crc_err + collisions
        let duration_sec = cursor.read_u32()?;
        let duration_nsec = cursor.read_u32()?;
        Ok(PortStatsEntry {
            port_no,
            rx_packets,
            tx_packets,
            rx_bytes,
            tx_bytes,
            rx_dropped,
            tx_dropped,
            rx_errors,
            tx_errors,
            duration_sec,
            duration_nsec,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatsEntry {
    pub port_no: u32,
    pub queue_id: u32,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    pub duration_sec: u32,
    pub duration_nsec: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableStatsEntry {
    pub table_id: u8,
    pub active_count: u32,
    pub lookup_count: u64,
    pub matched_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupStatsEntry {
    pub group_id: u32,
    pub ref_count: u32,
    pub packet_count: u64,
    pub byte_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDescEntry {
    pub group_type: u8,
    pub group_id: u32,
    pub buckets_raw: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterStatsEntry {
    pub meter_id: u32,
    pub flow_count: u32,
    pub packet_in_count: u64,
    pub byte_in_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterConfigEntry {
    pub meter_id: u32,
    pub flags: u16,
    pub bands_raw: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeterFeatures {
    pub max_meter: u32,
    pub band_types: u32,
    pub capabilities: u32,
    pub max_bands: u8,
    pub max_color: u8,
}

impl FlowStatsEntry {
    pub fn encode(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        let mut body = Vec::new();
        {
            let mut tmp = vec![0u8; 4096];
            let mut w = CursorMut::new(&mut tmp);
            self.match_.encode(&mut w)?;
            encode_instructions(&mut w, &self.instructions)?;
            let n = w.offset();
            body.extend_from_slice(&tmp[..n]);
        }
        let length = 48 + body.len();
        cursor.write_u16(length as u16)?;
        cursor.write_u8(self.table_id)?;
        cursor.skip(1)?;
        cursor.write_u32(self.duration_sec)?;
        cursor.write_u32(self.duration_nsec)?;
        cursor.write_u16(self.priority)?;
        cursor.write_u16(self.idle_timeout)?;
        cursor.write_u16(self.hard_timeout)?;
        cursor.skip(2)?;
        cursor.skip(4)?; // flags
        cursor.skip(4)?; // pad
        cursor.write_u64(self.cookie)?;
        cursor.write_u64(self.packet_count)?;
        cursor.write_u64(self.byte_count)?;
        cursor.write_bytes(&body)
    }

    pub fn decode(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        let length = cursor.read_u16()? as usize;
        let table_id = cursor.read_u8()?;
        cursor.skip(1)?;
        let duration_sec = cursor.read_u32()?;
        let duration_nsec = cursor.read_u32()?;
        let priority = cursor.read_u16()?;
        let idle_timeout = cursor.read_u16()?;
        let hard_timeout = cursor.read_u16()?;
        cursor.skip(2)?;
        cursor.skip(4)?;
        cursor.skip(4)?;
        let cookie = cursor.read_u64()?;
        let packet_count = cursor.read_u64()?;
        let byte_count = cursor.read_u64()?;
        cursor.skip(2)?; // match type
        let match_len = cursor.read_u16()? as usize;
        let match_ = Match::decode(cursor, match_len.saturating_sub(4))?;
        let padded_match = crate::codec::pad_to(match_len, 8);
        cursor.skip(padded_match - match_len)?;
        let consumed = 48 + padded_match;
        let instructions = decode_instructions(cursor, length.saturating_sub(consumed))?;
        Ok(FlowStatsEntry {
            table_id,
            duration_sec,
            duration_nsec,
            priority,
            idle_timeout,
            hard_timeout,
            cookie,
            packet_count,
            byte_count,
            match_,
            instructions,
        })
    }
}

impl QueueStatsEntry {
    pub fn decode(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        let port_no = cursor.read_u32()?;
        let queue_id = cursor.read_u32()?;
        let tx_bytes = cursor.read_u64()?;
        let tx_packets = cursor.read_u64()?;
        let tx_errors = cursor.read_u64()?;
        let duration_sec = cursor.read_u32()?;
        let duration_nsec = cursor.read_u32()?;
        Ok(QueueStatsEntry { port_no, queue_id, tx_bytes, tx_packets, tx_errors, duration_sec, duration_nsec })
    }

    pub fn encode(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        cursor.write_u32(self.port_no)?;
        cursor.write_u32(self.queue_id)?;
        cursor.write_u64(self.tx_bytes)?;
        cursor.write_u64(self.tx_packets)?;
        cursor.write_u64(self.tx_errors)?;
        cursor.write_u32(self.duration_sec)?;
        cursor.write_u32(self.duration_nsec)
    }
}

impl TableStatsEntry {
    pub fn decode(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        let table_id = cursor.read_u8()?;
        cursor.skip(3)?;
        let active_count = cursor.read_u32()?;
        let lookup_count = cursor.read_u64()?;
        let matched_count = cursor.read_u64()?;
        Ok(TableStatsEntry { table_id, active_count, lookup_count, matched_count })
    }

    pub fn encode(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        cursor.write_u8(self.table_id)?;
        cursor.skip(3)?;
        cursor.write_u32(self.active_count)?;
        cursor.write_u64(self.lookup_count)?;
        cursor.write_u64(self.matched_count)
    }
}

impl GroupStatsEntry {
    pub fn decode(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        cursor.skip(2)?; // length
        cursor.skip(2)?; // pad
        let group_id = cursor.read_u32()?;
        let ref_count = cursor.read_u32()?;
        cursor.skip(4)?;
        let packet_count = cursor.read_u64()?;
        let byte_count = cursor.read_u64()?;
        Ok(GroupStatsEntry { group_id, ref_count, packet_count, byte_count })
    }

    pub fn encode(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        cursor.write_u16(40)?;
        cursor.skip(2)?;
        cursor.write_u32(self.group_id)?;
        cursor.write_u32(self.ref_count)?;
        cursor.skip(4)?;
        cursor.write_u64(self.packet_count)?;
        cursor.write_u64(self.byte_count)
    }
}

impl GroupDescEntry {
    pub fn decode(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        let length = cursor.read_u16()? as usize;
        let group_type = cursor.read_u8()?;
        cursor.skip(1)?;
        let group_id = cursor.read_u32()?;
        let buckets_raw = cursor.read_bytes(length.saturating_sub(8))?.to_vec();
        Ok(GroupDescEntry { group_type, group_id, buckets_raw })
    }

    pub fn encode(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        cursor.write_u16((8 + self.buckets_raw.len()) as u16)?;
        cursor.write_u8(self.group_type)?;
        cursor.skip(1)?;
        cursor.write_u32(self.group_id)?;
        cursor.write_bytes(&self.buckets_raw)
    }
}

impl MeterStatsEntry {
    pub fn decode(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        let meter_id = cursor.read_u32()?;
        let length = cursor.read_u16()? as usize;
        cursor.skip(6)?;
        let flow_count = cursor.read_u32()?;
        let packet_in_count = cursor.read_u64()?;
        let byte_in_count = cursor.read_u64()?;
        cursor.skip(length.saturating_sub(40))?; // band stats, not modeled
        Ok(MeterStatsEntry { meter_id, flow_count, packet_in_count, byte_in_count })
    }

    pub fn encode(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        cursor.write_u32(self.meter_id)?;
        cursor.write_u16(40)?;
        cursor.skip(6)?;
        cursor.write_u32(self.flow_count)?;
        cursor.write_u64(self.packet_in_count)?;
        cursor.write_u64(self.byte_in_count)
    }
}

impl MeterConfigEntry {
    pub fn decode(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        let length = cursor.read_u16()? as usize;
        let flags = cursor.read_u16()?;
        let meter_id = cursor.read_u32()?;
        let bands_raw = cursor.read_bytes(length.saturating_sub(8))?.to_vec();
        Ok(MeterConfigEntry { meter_id, flags, bands_raw })
    }

    pub fn encode(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        cursor.write_u16((8 + self.bands_raw.len()) as u16)?;
        cursor.write_u16(self.flags)?;
        cursor.write_u32(self.meter_id)?;
        cursor.write_bytes(&self.bands_raw)
    }
}

impl MeterFeatures {
    pub fn decode(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        let max_meter = cursor.read_u32()?;
        let band_types = cursor.read_u32()?;
        let capabilities = cursor.read_u32()?;
        let max_bands = cursor.read_u8()?;
        let max_color = cursor.read_u8()?;
        cursor.skip(2)?;
        Ok(MeterFeatures { max_meter, band_types, capabilities, max_bands, max_color })
    }

    pub fn encode(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        cursor.write_u32(self.max_meter)?;
        cursor.write_u32(self.band_types)?;
        cursor.write_u32(self.capabilities)?;
        cursor.write_u8(self.max_bands)?;
        cursor.write_u8(self.max_color)?;
        cursor.skip(2)
    }
}

/// A multipart request body, tagged by `OfpMultipartType`. Request bodies
/// that need filtering carry their filter `Match`/ids; reply bodies carry
/// aggregated entries (after all continuation frames have been merged by
/// the codec's multipart reassembler, see `codec::MultipartReassembler`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MultipartBody {
    DescRequest,
    DescReply(SwitchDescription),
    FlowRequest { table_id: u8, out_port: u32, out_group: u32, cookie: u64, cookie_mask: u64, match_: Match },
    FlowReply(Vec<FlowStatsEntry>),
    AggregateRequest { table_id: u8, out_port: u32, out_group: u32, cookie: u64, cookie_mask: u64, match_: Match },
    AggregateReply(AggregateStats),
    TableRequest,
    TableReply(Vec<TableStatsEntry>),
    PortStatsRequest { port_no: u32 },
    PortStatsReply(Vec<PortStatsEntry>),
    QueueRequest { port_no: u32, queue_id: u32 },
    QueueReply(Vec<QueueStatsEntry>),
    GroupRequest { group_id: u32 },
    GroupReply(Vec<GroupStatsEntry>),
    GroupDescRequest,
    GroupDescReply(Vec<GroupDescEntry>),
    MeterRequest { meter_id: u32 },
    MeterReply(Vec<MeterStatsEntry>),
    MeterConfigRequest { meter_id: u32 },
    MeterConfigReply(Vec<MeterConfigEntry>),
    MeterFeaturesRequest,
    MeterFeaturesReply(MeterFeatures),
    PortDescRequest,
    PortDescReply(Vec<PortDesc>),
    Raw { mpart_type: u16, payload: Vec<u8> },
}

impl MultipartBody {
    pub fn mpart_type(&self) -> u16 {
        use MultipartBody::*;
        match self {
            DescRequest | DescReply(_) => OfpMultipartType::Desc.to_u16(),
            FlowRequest { .. } | FlowReply(_) => OfpMultipartType::Flow.to_u16(),
            AggregateRequest { .. } | AggregateReply(_) => OfpMultipartType::Aggregate.to_u16(),
            TableRequest | TableReply(_) => OfpMultipartType::Table.to_u16(),
            PortStatsRequest { .. } | PortStatsReply(_) => OfpMultipartType::PortStats.to_u16(),
            QueueRequest { .. } | QueueReply(_) => OfpMultipartType::Queue.to_u16(),
            GroupRequest { .. } | GroupReply(_) => OfpMultipartType::Group.to_u16(),
            GroupDescRequest | GroupDescReply(_) => OfpMultipartType::GroupDesc.to_u16(),
            MeterRequest { .. } | MeterReply(_) => OfpMultipartType::Meter.to_u16(),
            MeterConfigRequest { .. } | MeterConfigReply(_) => OfpMultipartType::MeterConfig.to_u16(),
            MeterFeaturesRequest | MeterFeaturesReply(_) => OfpMultipartType::MeterFeatures.to_u16(),
            PortDescRequest | PortDescReply(_) => OfpMultipartType::PortDesc.to_u16(),
            Raw { mpart_type, .. } => *mpart_type,
        }
    }
}

/// Common multipart header flag: more continuation frames follow.
pub const OFPMPF_REPLY_MORE: u16 = 0x0001;

/// The tagged sum of every OpenFlow 1.3 message this controller exchanges,
/// plus `Unknown` for anything the codec could frame but not classify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    Hello,
    Error(ErrorMsg),
    EchoRequest(Vec<u8>),
    EchoReply(Vec<u8>),
    FeaturesRequest,
    FeaturesReply(SwitchFeatures),
    GetConfigRequest,
    GetConfigReply(SwitchConfig),
    SetConfig(SwitchConfig),
    PacketIn(PacketIn),
    FlowRemoved(FlowRemoved),
    PortStatus(PortStatus),
    PacketOut(PacketOut),
    FlowMod(FlowMod),
    PortMod { port_no: u32, hw_addr: [u8; 6], config: u32, mask: u32, advertise: u32 },
    TableMod { table_id: u8, config: u32 },
    MultipartRequest { flags: u16, body: MultipartBody },
    MultipartReply { flags: u16, body: MultipartBody },
    BarrierRequest,
    BarrierReply,
    RoleRequest(RoleMsg),
    RoleReply(RoleMsg),
    Unknown { type_code: u8, payload: Vec<u8> },
}

impl Message {
    pub fn ofp_type(&self) -> OfpType {
        use Message::*;
        match self {
            Hello => OfpType::Hello,
            Error(_) => OfpType::Error,
            EchoRequest(_) => OfpType::EchoRequest,
            EchoReply(_) => OfpType::EchoReply,
            FeaturesRequest => OfpType::FeaturesRequest,
            FeaturesReply(_) => OfpType::FeaturesReply,
            GetConfigRequest => OfpType::GetConfigRequest,
            GetConfigReply(_) => OfpType::GetConfigReply,
            SetConfig(_) => OfpType::SetConfig,
            PacketIn(_) => OfpType::PacketIn,
            FlowRemoved(_) => OfpType::FlowRemoved,
            PortStatus(_) => OfpType::PortStatus,
            PacketOut(_) => OfpType::PacketOut,
            FlowMod(_) => OfpType::FlowMod,
            PortMod { .. } => OfpType::PortMod,
            TableMod { .. } => OfpType::TableMod,
            MultipartRequest { .. } => OfpType::MultipartRequest,
            MultipartReply { .. } => OfpType::MultipartReply,
            BarrierRequest => OfpType::BarrierRequest,
            BarrierReply => OfpType::BarrierReply,
            RoleRequest(_) => OfpType::RoleRequest,
            RoleReply(_) => OfpType::RoleReply,
            Unknown { .. } => OfpType::Experimenter,
        }
    }
}
