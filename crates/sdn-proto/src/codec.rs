// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message framing and the top-level `encode`/`decode` entry points.
//!
//! OpenFlow already carries its own length in the common header, so
//! framing a stream is simply: read 8 bytes, look at `length`, read
//! `length - 8` more. [`FrameReader`] implements exactly that against an
//! in-memory accumulation buffer so callers (the session's read loop) can
//! feed it arbitrarily chunked socket reads.

use crate::constants::{OfpMultipartType, OfpType, OFP_HEADER_LEN, OFP_VERSION};
use crate::error::{WireError, WireResult};
use crate::cursor::{Cursor, CursorMut};
use crate::message::*;

/// Largest message this codec accepts. OpenFlow's own length field is a
/// 16-bit quantity, so this is also the protocol ceiling.
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

pub fn pad_to(len: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        return len;
    }
    (len + alignment - 1) / alignment * alignment
}

/// Encodes `message` with transaction id `xid` into a freshly allocated,
/// length-prefixed buffer ready to write to the wire.
pub fn encode_message(xid: u32, message: &Message) -> WireResult<Vec<u8>> {
    let mut body = vec![0u8; MAX_MESSAGE_SIZE];
    let body_len = {
        let mut cursor = CursorMut::new(&mut body);
        encode_body(&mut cursor, message)?;
        cursor.offset()
    };
    body.truncate(body_len);

    let total_len = OFP_HEADER_LEN + body.len();
    if total_len > MAX_MESSAGE_SIZE {
        return Err(WireError::MessageTooLarge { length: total_len, max: MAX_MESSAGE_SIZE });
    }
    let mut out = vec![0u8; total_len];
    {
        let mut cursor = CursorMut::new(&mut out);
        cursor.write_u8(OFP_VERSION)?;
        cursor.write_u8(message.ofp_type().to_u8())?;
        cursor.write_u16(total_len as u16)?;
        cursor.write_u32(xid)?;
        cursor.write_bytes(&body)?;
    }
    Ok(out)
}

fn encode_body(cursor: &mut CursorMut<'_>, message: &Message) -> WireResult<()> {
    match message {
        Message::Hello => Ok(()),
        Message::Error(e) => e.encode(cursor),
        Message::EchoRequest(data) | Message::EchoReply(data) => cursor.write_bytes(data),
        Message::FeaturesRequest => Ok(()),
        Message::FeaturesReply(f) => f.encode(cursor),
        Message::GetConfigRequest => Ok(()),
        Message::GetConfigReply(c) | Message::SetConfig(c) => c.encode(cursor),
        Message::PacketIn(_) => Err(WireError::InvalidData { reason: "controller does not send packet-in".into() }),
        Message::FlowRemoved(_) => Err(WireError::InvalidData { reason: "controller does not send flow-removed".into() }),
        Message::PortStatus(p) => p.encode(cursor),
        Message::PacketOut(p) => p.encode(cursor),
        Message::FlowMod(f) => f.encode(cursor),
        Message::PortMod { port_no, hw_addr, config, mask, advertise } => {
            cursor.write_u32(*port_no)?;
            cursor.skip(4)?;
            cursor.write_bytes(hw_addr)?;
            cursor.skip(2)?;
            cursor.write_u32(*config)?;
            cursor.write_u32(*mask)?;
            cursor.write_u32(*advertise)?;
            cursor.skip(4)
        }
        Message::TableMod { table_id, config } => {
            cursor.write_u8(*table_id)?;
            cursor.skip(3)?;
            cursor.write_u32(*config)
        }
        Message::MultipartRequest { flags, body } | Message::MultipartReply { flags, body } => {
            cursor.write_u16(body.mpart_type())?;
            cursor.write_u16(*flags)?;
            cursor.skip(4)?;
            encode_multipart_body(cursor, body)
        }
        Message::BarrierRequest | Message::BarrierReply => Ok(()),
        Message::RoleRequest(r) | Message::RoleReply(r) => r.encode(cursor),
        Message::Unknown { payload, .. } => cursor.write_bytes(payload),
    }
}

fn encode_multipart_body(cursor: &mut CursorMut<'_>, body: &MultipartBody) -> WireResult<()> {
    use MultipartBody::*;
    match body {
        DescRequest | TableRequest | GroupDescRequest | MeterFeaturesRequest | PortDescRequest => Ok(()),
        DescReply(d) => d.encode(cursor),
        FlowRequest { table_id, out_port, out_group, cookie, cookie_mask, match_ } => {
            cursor.write_u8(*table_id)?;
            cursor.skip(3)?;
            cursor.write_u32(*out_port)?;
            cursor.write_u32(*out_group)?;
            cursor.skip(4)?;
            cursor.write_u64(*cookie)?;
            cursor.write_u64(*cookie_mask)?;
            match_.encode(cursor)
        }
        FlowReply(entries) => {
            for e in entries {
                e.encode(cursor)?;
            }
            Ok(())
        }
        AggregateRequest { table_id, out_port, out_group, cookie, cookie_mask, match_ } => {
            cursor.write_u8(*table_id)?;
            cursor.skip(3)?;
            cursor.write_u32(*out_port)?;
            cursor.write_u32(*out_group)?;
            cursor.skip(4)?;
            cursor.write_u64(*cookie)?;
            cursor.write_u64(*cookie_mask)?;
            match_.encode(cursor)
        }
        AggregateReply(a) => {
            cursor.write_u64(a.packet_count)?;
            cursor.write_u64(a.byte_count)?;
            cursor.write_u32(a.flow_count)?;
            cursor.skip(4)
        }
        TableReply(entries) => {
            for e in entries {
                e.encode(cursor)?;
            }
            Ok(())
        }
        PortStatsRequest { port_no } => {
            cursor.write_u32(*port_no)?;
            cursor.skip(4)
        }
        PortStatsReply(entries) => {
            for e in entries {
                cursor.write_u32(e.port_no)?;
                cursor.skip(4)?;
                cursor.write_u64(e.rx_packets)?;
                cursor.write_u64(e.tx_packets)?;
                cursor.write_u64(e.rx_bytes)?;
                cursor.write_u64(e.tx_bytes)?;
                cursor.write_u64(e.rx_dropped)?;
                cursor.write_u64(e.tx_dropped)?;
                cursor.write_u64(e.rx_errors)?;
                cursor.write_u64(e.tx_errors)?;
                cursor.skip(8 * 4)?;
                cursor.write_u32(e.duration_sec)?;
                cursor.write_u32(e.duration_nsec)?;
            }
            Ok(())
        }
        QueueRequest { port_no, queue_id } => {
            cursor.write_u32(*port_no)?;
            cursor.write_u32(*queue_id)
        }
        QueueReply(entries) => {
            for e in entries {
                e.encode(cursor)?;
            }
            Ok(())
        }
        GroupRequest { group_id } => {
            cursor.write_u32(*group_id)?;
            cursor.skip(4)
        }
        GroupReply(entries) => {
            for e in entries {
                e.encode(cursor)?;
            }
            Ok(())
        }
        GroupDescReply(entries) => {
            for e in entries {
                e.encode(cursor)?;
            }
            Ok(())
        }
        MeterRequest { meter_id } => {
            cursor.write_u32(*meter_id)?;
            cursor.skip(4)
        }
        MeterReply(entries) => {
            for e in entries {
                e.encode(cursor)?;
            }
            Ok(())
        }
        MeterConfigRequest { meter_id } => {
            cursor.write_u32(*meter_id)?;
            cursor.skip(4)
        }
        MeterConfigReply(entries) => {
            for e in entries {
                e.encode(cursor)?;
            }
            Ok(())
        }
        MeterFeaturesReply(f) => f.encode(cursor),
        PortDescReply(ports) => {
            for p in ports {
                p.encode(cursor)?;
            }
            Ok(())
        }
        Raw { payload, .. } => cursor.write_bytes(payload),
    }
}

/// Decodes a single, already length-delimited frame (the 8-byte header
/// plus exactly `header.length - 8` body bytes).
pub fn decode_message(frame: &[u8]) -> WireResult<(u32, Message)> {
    let mut cursor = Cursor::new(frame);
    let version = cursor.read_u8()?;
    if version != OFP_VERSION {
        return Err(WireError::UnsupportedVersion { version });
    }
    let type_code = cursor.read_u8()?;
    let length = cursor.read_u16()? as usize;
    if length != frame.len() {
        return Err(WireError::InvalidData {
            reason: format!("frame length mismatch: header says {length}, buffer has {}", frame.len()),
        });
    }
    let xid = cursor.read_u32()?;
    let body_len = length - OFP_HEADER_LEN;

    let ofp_type = match OfpType::from_u8(type_code) {
        Some(t) => t,
        None => {
            let payload = cursor.read_bytes(body_len)?.to_vec();
            return Ok((xid, Message::Unknown { type_code, payload }));
        }
    };

    let message = decode_body(&mut cursor, ofp_type, body_len)?;
    Ok((xid, message))
}

fn decode_body(cursor: &mut Cursor<'_>, ofp_type: OfpType, body_len: usize) -> WireResult<Message> {
    use OfpType::*;
    Ok(match ofp_type {
        Hello => Message::Hello,
        Error => Message::Error(ErrorMsg::decode(cursor, body_len)?),
        EchoRequest => Message::EchoRequest(cursor.read_bytes(body_len)?.to_vec()),
        EchoReply => Message::EchoReply(cursor.read_bytes(body_len)?.to_vec()),
        Experimenter => Message::Unknown { type_code: OfpType::Experimenter.to_u8(), payload: cursor.read_bytes(body_len)?.to_vec() },
        FeaturesRequest => Message::FeaturesRequest,
        FeaturesReply => Message::FeaturesReply(SwitchFeatures::decode(cursor)?),
        GetConfigRequest => Message::GetConfigRequest,
        GetConfigReply => Message::GetConfigReply(SwitchConfig::decode(cursor)?),
        SetConfig => Message::SetConfig(SwitchConfig::decode(cursor)?),
        PacketIn => Message::PacketIn(self::PacketIn::decode(cursor, body_len)?),
        FlowRemoved => Message::FlowRemoved(self::FlowRemoved::decode(cursor)?),
        PortStatus => Message::PortStatus(self::PortStatus::decode(cursor)?),
        PacketOut => Message::PacketOut(self::PacketOut::decode(cursor, body_len)?),
        FlowMod => Message::FlowMod(self::FlowMod::decode(cursor, body_len)?),
        GroupMod => Message::Unknown { type_code: OfpType::GroupMod.to_u8(), payload: cursor.read_bytes(body_len)?.to_vec() },
        PortMod => {
            let port_no = cursor.read_u32()?;
            cursor.skip(4)?;
            let hw_addr = {
                let raw = cursor.read_bytes(6)?;
                let mut a = [0u8; 6];
                a.copy_from_slice(raw);
                a
            };
            cursor.skip(2)?;
            let config = cursor.read_u32()?;
            let mask = cursor.read_u32()?;
            let advertise = cursor.read_u32()?;
            cursor.skip(4)?;
            Message::PortMod { port_no, hw_addr, config, mask, advertise }
        }
        TableMod => {
            let table_id = cursor.read_u8()?;
            cursor.skip(3)?;
            let config = cursor.read_u32()?;
            Message::TableMod { table_id, config }
        }
        MultipartRequest => {
            let (flags, body) = decode_multipart(cursor, body_len, true)?;
            Message::MultipartRequest { flags, body }
        }
        MultipartReply => {
            let (flags, body) = decode_multipart(cursor, body_len, false)?;
            Message::MultipartReply { flags, body }
        }
        BarrierRequest => Message::BarrierRequest,
        BarrierReply => Message::BarrierReply,
        QueueGetConfigRequest | QueueGetConfigReply => {
            Message::Unknown { type_code: ofp_type.to_u8(), payload: cursor.read_bytes(body_len)?.to_vec() }
        }
        RoleRequest => Message::RoleRequest(RoleMsg::decode(cursor)?),
        RoleReply => Message::RoleReply(RoleMsg::decode(cursor)?),
        GetAsyncRequest | GetAsyncReply | SetAsync | MeterMod => {
            Message::Unknown { type_code: ofp_type.to_u8(), payload: cursor.read_bytes(body_len)?.to_vec() }
        }
    })
}

fn decode_multipart(cursor: &mut Cursor<'_>, body_len: usize, is_request: bool) -> WireResult<(u16, MultipartBody)> {
    let mpart_code = cursor.read_u16()?;
    let flags = cursor.read_u16()?;
    cursor.skip(4)?;
    let payload_len = body_len - 8;
    let mpart_type = OfpMultipartType::from_u16(mpart_code);

    let body = match mpart_type {
        Some(OfpMultipartType::Desc) => {
            if is_request {
                cursor.skip(payload_len)?;
                MultipartBody::DescRequest
            } else {
                MultipartBody::DescReply(SwitchDescription::decode(cursor)?)
            }
        }
        Some(OfpMultipartType::Flow) => {
            if is_request {
                let table_id = cursor.read_u8()?;
                cursor.skip(3)?;
                let out_port = cursor.read_u32()?;
                let out_group = cursor.read_u32()?;
                cursor.skip(4)?;
                let cookie = cursor.read_u64()?;
                let cookie_mask = cursor.read_u64()?;
                cursor.skip(2)?;
                let match_len = cursor.read_u16()? as usize;
                let match_ = crate::oxm::Match::decode(cursor, match_len.saturating_sub(4))?;
                let padded = pad_to(match_len, 8);
                cursor.skip(padded - match_len)?;
                MultipartBody::FlowRequest { table_id, out_port, out_group, cookie, cookie_mask, match_ }
            } else {
                let start = cursor.offset();
                let mut entries = Vec::new();
                while cursor.offset() - start < payload_len {
                    entries.push(FlowStatsEntry::decode(cursor)?);
                }
                MultipartBody::FlowReply(entries)
            }
        }
        Some(OfpMultipartType::Aggregate) => {
            if is_request {
                let table_id = cursor.read_u8()?;
                cursor.skip(3)?;
                let out_port = cursor.read_u32()?;
                let out_group = cursor.read_u32()?;
                cursor.skip(4)?;
                let cookie = cursor.read_u64()?;
                let cookie_mask = cursor.read_u64()?;
                cursor.skip(2)?;
                let match_len = cursor.read_u16()? as usize;
                let match_ = crate::oxm::Match::decode(cursor, match_len.saturating_sub(4))?;
                let padded = pad_to(match_len, 8);
                cursor.skip(padded - match_len)?;
                MultipartBody::AggregateRequest { table_id, out_port, out_group, cookie, cookie_mask, match_ }
            } else {
                let packet_count = cursor.read_u64()?;
                let byte_count = cursor.read_u64()?;
                let flow_count = cursor.read_u32()?;
                cursor.skip(4)?;
                MultipartBody::AggregateReply(AggregateStats { packet_count, byte_count, flow_count })
            }
        }
        Some(OfpMultipartType::Table) => {
            if is_request {
                cursor.skip(payload_len)?;
                MultipartBody::TableRequest
            } else {
                let start = cursor.offset();
                let mut entries = Vec::new();
                while cursor.offset() - start < payload_len {
                    entries.push(TableStatsEntry::decode(cursor)?);
                }
                MultipartBody::TableReply(entries)
            }
        }
        Some(OfpMultipartType::PortStats) => {
            if is_request {
                let port_no = cursor.read_u32()?;
                cursor.skip(4)?;
                MultipartBody::PortStatsRequest { port_no }
            } else {
                let start = cursor.offset();
                let mut entries = Vec::new();
                while cursor.offset() - start < payload_len {
                    entries.push(PortStatsEntry::decode(cursor)?);
                }
                MultipartBody::PortStatsReply(entries)
            }
        }
        Some(OfpMultipartType::Queue) => {
            if is_request {
                let port_no = cursor.read_u32()?;
                let queue_id = cursor.read_u32()?;
                MultipartBody::QueueRequest { port_no, queue_id }
            } else {
                let start = cursor.offset();
                let mut entries = Vec::new();
                while cursor.offset() - start < payload_len {
                    entries.push(QueueStatsEntry::decode(cursor)?);
                }
                MultipartBody::QueueReply(entries)
            }
        }
        Some(OfpMultipartType::Group) => {
            if is_request {
                let group_id = cursor.read_u32()?;
                cursor.skip(4)?;
                MultipartBody::GroupRequest { group_id }
            } else {
                let start = cursor.offset();
                let mut entries = Vec::new();
                while cursor.offset() - start < payload_len {
                    entries.push(GroupStatsEntry::decode(cursor)?);
                }
                MultipartBody::GroupReply(entries)
            }
        }
        Some(OfpMultipartType::GroupDesc) => {
            if is_request {
                cursor.skip(payload_len)?;
                MultipartBody::GroupDescRequest
            } else {
                let start = cursor.offset();
                let mut entries = Vec::new();
                while cursor.offset() - start < payload_len {
                    entries.push(GroupDescEntry::decode(cursor)?);
                }
                MultipartBody::GroupDescReply(entries)
            }
        }
        Some(OfpMultipartType::Meter) => {
            if is_request {
                let meter_id = cursor.read_u32()?;
                cursor.skip(4)?;
                MultipartBody::MeterRequest { meter_id }
            } else {
                let start = cursor.offset();
                let mut entries = Vec::new();
                while cursor.offset() - start < payload_len {
                    entries.push(MeterStatsEntry::decode(cursor)?);
                }
                MultipartBody::MeterReply(entries)
            }
        }
        Some(OfpMultipartType::MeterConfig) => {
            if is_request {
                let meter_id = cursor.read_u32()?;
                cursor.skip(4)?;
                MultipartBody::MeterConfigRequest { meter_id }
            } else {
                let start = cursor.offset();
                let mut entries = Vec::new();
                while cursor.offset() - start < payload_len {
                    entries.push(MeterConfigEntry::decode(cursor)?);
                }
                MultipartBody::MeterConfigReply(entries)
            }
        }
        Some(OfpMultipartType::MeterFeatures) => {
            if is_request {
                cursor.skip(payload_len)?;
                MultipartBody::MeterFeaturesRequest
            } else {
                MultipartBody::MeterFeaturesReply(MeterFeatures::decode(cursor)?)
            }
        }
        Some(OfpMultipartType::PortDesc) => {
            if is_request {
                cursor.skip(payload_len)?;
                MultipartBody::PortDescRequest
            } else {
                let start = cursor.offset();
                let mut ports = Vec::new();
                while cursor.offset() - start < payload_len {
                    ports.push(PortDesc::decode(cursor)?);
                }
                MultipartBody::PortDescReply(ports)
            }
        }
        Some(OfpMultipartType::Experimenter) | None => {
            MultipartBody::Raw { mpart_type: mpart_code, payload: cursor.read_bytes(payload_len)?.to_vec() }
        }
    };
    Ok((flags, body))
}

/// Accumulates chunked socket reads into whole, length-delimited frames.
#[derive(Default)]
pub struct FrameReader {
    buf: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        FrameReader::default()
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pops and returns the next complete frame's raw bytes, if one has
    /// fully arrived. Validates the declared length against
    /// `MAX_MESSAGE_SIZE` so a corrupt peer cannot force unbounded
    /// buffering.
    pub fn next_frame(&mut self) -> WireResult<Option<Vec<u8>>> {
        if self.buf.len() < OFP_HEADER_LEN {
            return Ok(None);
        }
        let length = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
        if length < OFP_HEADER_LEN {
            return Err(WireError::InvalidData { reason: format!("declared length {length} shorter than header") });
        }
        if length > MAX_MESSAGE_SIZE {
            return Err(WireError::MessageTooLarge { length, max: MAX_MESSAGE_SIZE });
        }
        if self.buf.len() < length {
            return Ok(None);
        }
        let frame = self.buf.drain(..length).collect();
        Ok(Some(frame))
    }
}

/// Aggregates `OFPMPF_REPLY_MORE`-chained multipart reply frames into one
/// logical reply before the agent resolves the pending request (spec
/// §4.1: "Multipart replies are aggregated across continuation frames").
#[derive(Default)]
pub struct MultipartReassembler {
    parts: Vec<MultipartBody>,
}

impl MultipartReassembler {
    pub fn new() -> Self {
        MultipartReassembler::default()
    }

    /// Feeds one decoded continuation frame. Returns `Some(merged)` once
    /// the frame without `OFPMPF_REPLY_MORE` has arrived.
    pub fn feed(&mut self, flags: u16, body: MultipartBody) -> Option<MultipartBody> {
        self.parts.push(body);
        if flags & OFPMPF_REPLY_MORE != 0 {
            return None;
        }
        Some(merge_parts(std::mem::take(&mut self.parts)))
    }
}

fn merge_parts(mut parts: Vec<MultipartBody>) -> MultipartBody {
    if parts.len() == 1 {
        return parts.pop().unwrap();
    }
    let mut flow = Vec::new();
    let mut port_stats = Vec::new();
    let mut queue = Vec::new();
    let mut table = Vec::new();
    let mut group = Vec::new();
    let mut group_desc = Vec::new();
    let mut meter = Vec::new();
    let mut meter_config = Vec::new();
    let mut port_desc = Vec::new();
    let mut first = None;
    for part in parts {
        match part {
            MultipartBody::FlowReply(mut e) => flow.append(&mut e),
            MultipartBody::PortStatsReply(mut e) => port_stats.append(&mut e),
            MultipartBody::QueueReply(mut e) => queue.append(&mut e),
            MultipartBody::TableReply(mut e) => table.append(&mut e),
            MultipartBody::GroupReply(mut e) => group.append(&mut e),
            MultipartBody::GroupDescReply(mut e) => group_desc.append(&mut e),
            MultipartBody::MeterReply(mut e) => meter.append(&mut e),
            MultipartBody::MeterConfigReply(mut e) => meter_config.append(&mut e),
            MultipartBody::PortDescReply(mut e) => port_desc.append(&mut e),
            other => first.get_or_insert(other),
        };
    }
    if !flow.is_empty() {
        return MultipartBody::FlowReply(flow);
    }
    if !port_stats.is_empty() {
        return MultipartBody::PortStatsReply(port_stats);
    }
    if !queue.is_empty() {
        return MultipartBody::QueueReply(queue);
    }
    if !table.is_empty() {
        return MultipartBody::TableReply(table);
    }
    if !group.is_empty() {
        return MultipartBody::GroupReply(group);
    }
    if !group_desc.is_empty() {
        return MultipartBody::GroupDescReply(group_desc);
    }
    if !meter.is_empty() {
        return MultipartBody::MeterReply(meter);
    }
    if !meter_config.is_empty() {
        return MultipartBody::MeterConfigReply(meter_config);
    }
    if !port_desc.is_empty() {
        return MultipartBody::PortDescReply(port_desc);
    }
    first.unwrap_or(MultipartBody::Raw { mpart_type: 0, payload: Vec::new() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_roundtrips() {
        let bytes = encode_message(1, &Message::Hello).unwrap();
        let (xid, msg) = decode_message(&bytes).unwrap();
        assert_eq!(xid, 1);
        assert!(matches!(msg, Message::Hello));
    }

    #[test]
    fn echo_request_roundtrips() {
        let bytes = encode_message(42, &Message::EchoRequest(vec![1, 2, 3])).unwrap();
        let (xid, msg) = decode_message(&bytes).unwrap();
        assert_eq!(xid, 42);
        match msg {
            Message::EchoRequest(data) => assert_eq!(data, vec![1, 2, 3]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn features_reply_roundtrips() {
        let feats = SwitchFeatures {
            datapath_id: 0x0102030405060708,
            n_buffers: 256,
            n_tables: 4,
            auxiliary_id: 0,
            capabilities: 0,
        };
        let bytes = encode_message(7, &Message::FeaturesReply(feats.clone())).unwrap();
        let (_, msg) = decode_message(&bytes).unwrap();
        match msg {
            Message::FeaturesReply(f) => assert_eq!(f.datapath_id, feats.datapath_id),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unsupported_version_rejected() {
        let mut bytes = encode_message(1, &Message::Hello).unwrap();
        bytes[0] = 0x01; // OpenFlow 1.0
        assert!(decode_message(&bytes).is_err());
    }

    #[test]
    fn frame_reader_handles_partial_reads() {
        let bytes = encode_message(1, &Message::BarrierRequest).unwrap();
        let mut reader = FrameReader::new();
        reader.feed(&bytes[..4]);
        assert!(reader.next_frame().unwrap().is_none());
        reader.feed(&bytes[4..]);
        let frame = reader.next_frame().unwrap().expect("frame complete");
        assert_eq!(frame, bytes);
    }

    #[test]
    fn frame_reader_rejects_oversized_declared_length() {
        let mut reader = FrameReader::new();
        let mut bogus = vec![4u8, 20, 0xff, 0xff, 0, 0, 0, 1];
        bogus.extend_from_slice(&[0u8; 8]);
        reader.feed(&bogus);
        assert!(reader.next_frame().is_err());
    }

    #[test]
    fn multipart_reassembler_merges_continuation_frames() {
        let mut reassembler = MultipartReassembler::new();
        let e1 = FlowStatsEntry {
            table_id: 0,
            duration_sec: 0,
            duration_nsec: 0,
            priority: 1,
            idle_timeout: 0,
            hard_timeout: 0,
            cookie: 0,
            packet_count: 0,
            byte_count: 0,
            match_: crate::oxm::Match::new(),
            instructions: vec![],
        };
        assert!(reassembler.feed(OFPMPF_REPLY_MORE, MultipartBody::FlowReply(vec![e1.clone()])).is_none());
        let merged = reassembler.feed(0, MultipartBody::FlowReply(vec![e1])).expect("final frame");
        match merged {
            MultipartBody::FlowReply(entries) => assert_eq!(entries.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn flow_mod_roundtrips_with_match_and_instructions() {
        let flow_mod = FlowMod {
            cookie: 1,
            cookie_mask: 0,
            table_id: 0,
            command: crate::constants::FlowModCommand::Add,
            idle_timeout: 0,
            hard_timeout: 0,
            priority: 100,
            buffer_id: 0xffff_ffff,
            out_port: 0,
            out_group: 0,
            flags: FLOW_MOD_FLAG_SEND_FLOW_REMOVED,
            match_: crate::oxm::Match::new(),
            instructions: vec![Instruction::goto_table(1)],
        };
        let bytes = encode_message(10, &Message::FlowMod(flow_mod)).unwrap();
        let (_, msg) = decode_message(&bytes).unwrap();
        match msg {
            Message::FlowMod(f) => {
                assert_eq!(f.priority, 100);
                assert_eq!(f.instructions.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
