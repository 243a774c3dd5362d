// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OpenFlow 1.3.x wire constants (`OFPT_*`, `OFPMP_*`, and friends).

/// The only wire version this codec accepts.
pub const OFP_VERSION: u8 = 0x04;

/// Length of the common OpenFlow header (version, type, length, xid).
pub const OFP_HEADER_LEN: usize = 8;

/// Transaction IDs below this floor are reserved for OFAgent-issued
/// requests; passthrough send paths may reuse ids above it.
pub const XID_RESERVED_FLOOR: u32 = 0x1000_0000;

/// Reserved port meaning "sent from the controller" on a `PacketOut`.
pub const OFPP_CONTROLLER: u32 = 0xffff_fffd;
/// Marks a `PacketOut`/`PacketIn` as not referencing a switch-side buffer.
pub const OFP_NO_BUFFER: u32 = 0xffff_ffff;

/// `OFPT_*` message type codes.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OfpType {
    Hello = 0,
    Error = 1,
    EchoRequest = 2,
    EchoReply = 3,
    Experimenter = 4,
    FeaturesRequest = 5,
    FeaturesReply = 6,
    GetConfigRequest = 7,
    GetConfigReply = 8,
    SetConfig = 9,
    PacketIn = 10,
    FlowRemoved = 11,
    PortStatus = 12,
    PacketOut = 13,
    FlowMod = 14,
    GroupMod = 15,
    PortMod = 16,
    TableMod = 17,
    MultipartRequest = 18,
    MultipartReply = 19,
    BarrierRequest = 20,
    BarrierReply = 21,
    QueueGetConfigRequest = 22,
    QueueGetConfigReply = 23,
    RoleRequest = 24,
    RoleReply = 25,
    GetAsyncRequest = 26,
    GetAsyncReply = 27,
    SetAsync = 28,
    MeterMod = 29,
}

impl OfpType {
    pub fn from_u8(code: u8) -> Option<Self> {
        use OfpType::*;
        Some(match code {
            0 => Hello,
            1 => Error,
            2 => EchoRequest,
            3 => EchoReply,
            4 => Experimenter,
            5 => FeaturesRequest,
            6 => FeaturesReply,
            7 => GetConfigRequest,
            8 => GetConfigReply,
            9 => SetConfig,
            10 => PacketIn,
            11 => FlowRemoved,
            12 => PortStatus,
            13 => PacketOut,
            14 => FlowMod,
            15 => GroupMod,
            16 => PortMod,
            17 => TableMod,
            18 => MultipartRequest,
            19 => MultipartReply,
            20 => BarrierRequest,
            21 => BarrierReply,
            22 => QueueGetConfigRequest,
            23 => QueueGetConfigReply,
            24 => RoleRequest,
            25 => RoleReply,
            26 => GetAsyncRequest,
            27 => GetAsyncReply,
            28 => SetAsync,
            29 => MeterMod,
            _ => return None,
        })
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// `OFPMP_*` multipart subclassification, carried as a 16-bit field
/// immediately after the 8-byte common header in multipart frames.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OfpMultipartType {
    Desc = 0,
    Flow = 1,
    Aggregate = 2,
    Table = 3,
    PortStats = 4,
    Queue = 5,
    Group = 6,
    GroupDesc = 7,
    GroupFeatures = 8,
    Meter = 9,
    MeterConfig = 10,
    MeterFeatures = 11,
    TableFeatures = 12,
    PortDesc = 13,
    Experimenter = 0xffff,
}

impl OfpMultipartType {
    pub fn from_u16(code: u16) -> Option<Self> {
        use OfpMultipartType::*;
        Some(match code {
            0 => Desc,
            1 => Flow,
            2 => Aggregate,
            3 => Table,
            4 => PortStats,
            5 => Queue,
            6 => Group,
            7 => GroupDesc,
            8 => GroupFeatures,
            9 => Meter,
            10 => MeterConfig,
            11 => MeterFeatures,
            12 => TableFeatures,
            13 => PortDesc,
            0xffff => Experimenter,
            _ => return None,
        })
    }

    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// `OFPFC_*` flow-mod command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowModCommand {
    Add = 0,
    Modify = 1,
    ModifyStrict = 2,
    Delete = 3,
    DeleteStrict = 4,
}

impl FlowModCommand {
    pub fn from_u8(code: u8) -> Option<Self> {
        use FlowModCommand::*;
        Some(match code {
            0 => Add,
            1 => Modify,
            2 => ModifyStrict,
            3 => Delete,
            4 => DeleteStrict,
            _ => return None,
        })
    }
}

/// `OFPRR_*` flow-removed reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowRemovedReason {
    IdleTimeout = 0,
    HardTimeout = 1,
    Delete = 2,
    GroupDelete = 3,
    MeterDelete = 4,
}

impl FlowRemovedReason {
    pub fn from_u8(code: u8) -> Option<Self> {
        use FlowRemovedReason::*;
        Some(match code {
            0 => IdleTimeout,
            1 => HardTimeout,
            2 => Delete,
            3 => GroupDelete,
            4 => MeterDelete,
            _ => return None,
        })
    }

    /// True for reasons the controller should treat as self-inflicted and
    /// therefore not re-install against.
    pub fn is_expected_retirement(self) -> bool {
        matches!(
            self,
            FlowRemovedReason::IdleTimeout
                | FlowRemovedReason::HardTimeout
                | FlowRemovedReason::GroupDelete
                | FlowRemovedReason::MeterDelete
        )
    }
}

/// `OFPCR_ROLE_*` role codes used by role-request/reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OfpControllerRole {
    NoChange = 0,
    Equal = 1,
    Master = 2,
    Slave = 3,
}

impl OfpControllerRole {
    pub fn from_u32(code: u32) -> Option<Self> {
        use OfpControllerRole::*;
        Some(match code {
            0 => NoChange,
            1 => Equal,
            2 => Master,
            3 => Slave,
            _ => return None,
        })
    }

    pub fn to_u32(self) -> u32 {
        self as u32
    }
}
