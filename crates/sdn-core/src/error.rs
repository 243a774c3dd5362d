// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cross-component error types. Callers match on these, so they derive
//! `thiserror` rather than hand-rolling `Display`/`Error` — the same split
//! this workspace's wire layer draws in the other direction.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("wire error: {0}")]
    Wire(#[from] sdn_proto::WireError),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("topology error: {0}")]
    Topology(#[from] crate::topology::TopologyError),
    #[error("unknown switch {dpid:#x}")]
    UnknownSwitch { dpid: u64 },
    #[error("session for switch {dpid:#x} is not established")]
    SessionNotEstablished { dpid: u64 },
    #[error("request timed out")]
    RequestTimeout,
    #[error("session closed before request completed")]
    RequestSessionClosed,
    #[error("switch returned an openflow error: type={error_type} code={code}")]
    OpenflowError { error_type: u16, code: u16 },
    #[error("reply class did not match the request")]
    BadReply,
    #[error("not primary: refusing write")]
    NotPrimary,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
