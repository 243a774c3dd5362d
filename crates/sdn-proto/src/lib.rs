// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # sdn-proto
//!
//! OpenFlow 1.3 wire codec. Decodes a length-prefixed byte buffer into a
//! tagged-variant [`message::Message`] and re-encodes it; no behavior
//! beyond framing and byte layout lives here.
//!
//! ## Modules
//!
//! - [`constants`] - `OFPT_*`/`OFPMP_*` identifiers and small enums
//! - [`cursor`] - bounds-checked big-endian read/write cursors
//! - [`oxm`] - OXM TLV match encoding, canonicalization and hashing
//! - [`instruction`] - flow-mod instruction/action set encoding
//! - [`message`] - typed message bodies and the `Message` tagged sum
//! - [`codec`] - top-level encode/decode, stream framing, multipart reassembly

pub mod codec;
pub mod constants;
pub mod cursor;
pub mod error;
pub mod instruction;
pub mod message;
pub mod oxm;

pub use codec::{decode_message, encode_message, FrameReader, MultipartReassembler, MAX_MESSAGE_SIZE};
pub use constants::{
    FlowModCommand, FlowRemovedReason, OfpControllerRole, OfpMultipartType, OfpType, OFPP_CONTROLLER, OFP_NO_BUFFER,
    OFP_VERSION, XID_RESERVED_FLOOR,
};
pub use error::{WireError, WireResult};
pub use message::Message;
pub use oxm::{Match, OxmField};
