// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OFAgent: the typed request/reply layer over a single session's wire
//! traffic.
//!
//! Every outbound request is assigned an xid above
//! [`sdn_proto::XID_RESERVED_FLOOR`] and a completion handle is stashed in
//! `pending` before the frame is written. When the session's read loop
//! sees a reply whose xid matches, it calls [`OFAgent::complete`] to
//! resolve the waiter; an `Error` reply resolves it as
//! [`CoreError::OpenflowError`] instead. If the session dies with requests
//! still outstanding, [`OFAgent::fail_all_pending`] resolves every one of
//! them as [`CoreError::RequestSessionClosed`] so callers never block
//! forever on a dead peer.

use crate::error::{CoreError, CoreResult};
use crate::session::OutboundSender;
use parking_lot::Mutex;
use sdn_proto::constants::FlowModCommand;
use sdn_proto::message::{FlowMod, Message, MultipartBody, RoleMsg, SwitchConfig};
use sdn_proto::oxm::Match;
use sdn_proto::{encode_message, OfpControllerRole, XID_RESERVED_FLOOR};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

struct PendingRequest {
    reassembler: sdn_proto::codec::MultipartReassembler,
    completion: oneshot::Sender<CoreResult<Message>>,
}

/// Per-session request/reply correlation. Cheap to clone — shares its
/// pending-transaction table and outbound sender with every clone.
#[derive(Clone)]
pub struct OFAgent {
    dpid: Arc<AtomicU64>,
    outbound: OutboundSender,
    next_xid: Arc<AtomicU32>,
    pending: Arc<Mutex<HashMap<u32, PendingRequest>>>,
    default_timeout: Duration,
}

impl OFAgent {
    pub fn new(dpid: u64, outbound: OutboundSender, default_timeout: Duration) -> Self {
        OFAgent {
            dpid: Arc::new(AtomicU64::new(dpid)),
            outbound,
            next_xid: Arc::new(AtomicU32::new(XID_RESERVED_FLOOR)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            default_timeout,
        }
    }

    pub fn dpid(&self) -> u64 {
        self.dpid.load(Ordering::Relaxed)
    }

    /// Set once the owning session's features-reply has been accepted.
    pub fn set_dpid(&self, dpid: u64) {
        self.dpid.store(dpid, Ordering::Relaxed);
    }

    fn next_xid(&self) -> u32 {
        self.next_xid.fetch_add(1, Ordering::Relaxed)
    }

    async fn request(&self, message: Message) -> CoreResult<Message> {
        let xid = self.next_xid();
        let bytes = encode_message(xid, &message)?;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            xid,
            PendingRequest {
                reassembler: sdn_proto::codec::MultipartReassembler::new(),
                completion: tx,
            },
        );
        if self.outbound.send(bytes).await.is_err() {
            self.pending.lock().remove(&xid);
            return Err(CoreError::RequestSessionClosed);
        }
        match tokio::time::timeout(self.default_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CoreError::RequestSessionClosed),
            Err(_) => {
                self.pending.lock().remove(&xid);
                Err(CoreError::RequestTimeout)
            }
        }
    }

    /// Fire-and-forget send: no reply is expected (e.g. a one-way
    /// flow-mod sent without `OFPFF_SEND_FLOW_REM`-driven bookkeeping).
    pub async fn send(&self, xid: u32, message: &Message) -> CoreResult<()> {
        let bytes = encode_message(xid, message)?;
        self.outbound.send(bytes).await.map_err(|_| CoreError::RequestSessionClosed)
    }

    pub async fn send_with_fresh_xid(&self, message: &Message) -> CoreResult<u32> {
        let xid = self.next_xid();
        self.send(xid, message).await?;
        Ok(xid)
    }

    /// Resolves a reply frame against its pending request, if any is
    /// tracked. Multipart replies are aggregated through the per-xid
    /// reassembler before the waiter is resolved; `Error` replies resolve
    /// the waiter as [`CoreError::OpenflowError`]. Returns `true` if the
    /// xid was recognized (so the caller can skip further handling).
    pub fn complete(&self, xid: u32, message: Message) -> bool {
        let mut pending = self.pending.lock();
        let Some(entry) = pending.get_mut(&xid) else {
            return false;
        };

        match message {
            Message::Error(e) => {
                if let Some(entry) = pending.remove(&xid) {
                    let _ = entry.completion.send(Err(CoreError::OpenflowError {
                        error_type: e.error_type,
                        code: e.code,
                    }));
                }
            }
            Message::MultipartReply { flags, body } => {
                if let Some(merged) = entry.reassembler.feed(flags, body) {
                    if let Some(entry) = pending.remove(&xid) {
                        let _ = entry
                            .completion
                            .send(Ok(Message::MultipartReply { flags: 0, body: merged }));
                    }
                }
            }
            other => {
                if let Some(entry) = pending.remove(&xid) {
                    let _ = entry.completion.send(Ok(other));
                }
            }
        }
        true
    }

    /// Checks whether `xid` belongs to this agent without consuming it;
    /// used by the session loop to decide routing before calling
    /// `complete`.
    pub fn is_pending(&self, xid: u32) -> bool {
        self.pending.lock().contains_key(&xid)
    }

    /// Resolves every outstanding request as session-closed. Called once
    /// by the owning session when its liveness state transitions away
    /// from `Established`.
    pub fn fail_all_pending(&self) {
        let mut pending = self.pending.lock();
        for (_, entry) in pending.drain() {
            let _ = entry.completion.send(Err(CoreError::RequestSessionClosed));
        }
    }

    pub async fn barrier(&self) -> CoreResult<()> {
        self.request(Message::BarrierRequest).await.map(|_| ())
    }

    pub async fn get_config(&self) -> CoreResult<SwitchConfig> {
        match self.request(Message::GetConfigRequest).await? {
            Message::GetConfigReply(c) => Ok(c),
            _ => Err(CoreError::BadReply),
        }
    }

    pub async fn set_config(&self, config: SwitchConfig) -> CoreResult<()> {
        self.send_with_fresh_xid(&Message::SetConfig(config)).await.map(|_| ())
    }

    pub async fn get_desc(&self) -> CoreResult<sdn_proto::message::SwitchDescription> {
        match self
            .request(Message::MultipartRequest { flags: 0, body: MultipartBody::DescRequest })
            .await?
        {
            Message::MultipartReply { body: MultipartBody::DescReply(d), .. } => Ok(d),
            _ => Err(CoreError::BadReply),
        }
    }

    pub async fn get_port_desc(&self) -> CoreResult<Vec<sdn_proto::message::PortDesc>> {
        match self
            .request(Message::MultipartRequest { flags: 0, body: MultipartBody::PortDescRequest })
            .await?
        {
            Message::MultipartReply { body: MultipartBody::PortDescReply(ports), .. } => Ok(ports),
            _ => Err(CoreError::BadReply),
        }
    }

    pub async fn get_port_stats(&self, port_no: u32) -> CoreResult<Vec<sdn_proto::message::PortStatsEntry>> {
        match self
            .request(Message::MultipartRequest { flags: 0, body: MultipartBody::PortStatsRequest { port_no } })
            .await?
        {
            Message::MultipartReply { body: MultipartBody::PortStatsReply(entries), .. } => Ok(entries),
            _ => Err(CoreError::BadReply),
        }
    }

    pub async fn get_queue_stats(&self, port_no: u32, queue_id: u32) -> CoreResult<Vec<sdn_proto::message::QueueStatsEntry>> {
        match self
            .request(Message::MultipartRequest { flags: 0, body: MultipartBody::QueueRequest { port_no, queue_id } })
            .await?
        {
            Message::MultipartReply { body: MultipartBody::QueueReply(entries), .. } => Ok(entries),
            _ => Err(CoreError::BadReply),
        }
    }

    pub async fn get_flow_stats(&self, table_id: u8, match_: Match) -> CoreResult<Vec<sdn_proto::message::FlowStatsEntry>> {
        let body = MultipartBody::FlowRequest {
            table_id,
            out_port: 0xffff_ffff,
            out_group: 0xffff_ffff,
            cookie: 0,
            cookie_mask: 0,
            match_,
        };
        match self.request(Message::MultipartRequest { flags: 0, body }).await? {
            Message::MultipartReply { body: MultipartBody::FlowReply(entries), .. } => Ok(entries),
            _ => Err(CoreError::BadReply),
        }
    }

    pub async fn get_aggregate_stats(&self, table_id: u8, match_: Match) -> CoreResult<sdn_proto::message::AggregateStats> {
        let body = MultipartBody::AggregateRequest {
            table_id,
            out_port: 0xffff_ffff,
            out_group: 0xffff_ffff,
            cookie: 0,
            cookie_mask: 0,
            match_,
        };
        match self.request(Message::MultipartRequest { flags: 0, body }).await? {
            Message::MultipartReply { body: MultipartBody::AggregateReply(a), .. } => Ok(a),
            _ => Err(CoreError::BadReply),
        }
    }

    pub async fn role_request(&self, role: OfpControllerRole, generation_id: u64) -> CoreResult<RoleMsg> {
        match self
            .request(Message::RoleRequest(RoleMsg { role, generation_id }))
            .await?
        {
            Message::RoleReply(r) => Ok(r),
            _ => Err(CoreError::BadReply),
        }
    }

    /// Sends a flow-mod. Per spec, a barrier issued right after must
    /// complete before an inactivity timer would otherwise fire — callers
    /// needing that guarantee should follow up with `barrier()`.
    pub async fn flow_mod(&self, flow_mod: FlowMod) -> CoreResult<()> {
        self.send_with_fresh_xid(&Message::FlowMod(flow_mod)).await.map(|_| ())
    }

    pub fn delete_all_flow_mod(table_id: u8, match_: Match) -> FlowMod {
        FlowMod {
            cookie: 0,
            cookie_mask: 0,
            table_id,
            command: FlowModCommand::Delete,
            idle_timeout: 0,
            hard_timeout: 0,
            priority: 0,
            buffer_id: 0xffff_ffff,
            out_port: 0xffff_ffff,
            out_group: 0xffff_ffff,
            flags: 0,
            match_,
            instructions: vec![],
        }
    }

    /// Group-mod/meter-mod bodies are opaque to this controller (no
    /// higher app decodes their bucket/band lists); sent as a raw payload
    /// tagged with the right `OFPT_*` code so they still frame correctly.
    pub async fn group_mod(&self, raw_body: Vec<u8>) -> CoreResult<()> {
        self.send_with_fresh_xid(&Message::Unknown { type_code: 15, payload: raw_body }).await.map(|_| ())
    }

    pub async fn meter_mod(&self, raw_body: Vec<u8>) -> CoreResult<()> {
        self.send_with_fresh_xid(&Message::Unknown { type_code: 29, payload: raw_body }).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdn_proto::message::ErrorMsg;

    fn make_agent() -> (OFAgent, tokio::sync::mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = tokio::sync::mpsc::channel(8);
        (OFAgent::new(1, tx, Duration::from_millis(200)), rx)
    }

    #[tokio::test]
    async fn barrier_resolves_on_matching_reply() {
        let (agent, mut rx) = make_agent();
        let agent2 = agent.clone();
        let handle = tokio::spawn(async move { agent2.barrier().await });
        let frame = rx.recv().await.unwrap();
        let (xid, _) = sdn_proto::decode_message(&frame).unwrap();
        assert!(agent.complete(xid, Message::BarrierReply));
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn error_reply_resolves_as_openflow_error() {
        let (agent, mut rx) = make_agent();
        let agent2 = agent.clone();
        let handle = tokio::spawn(async move { agent2.barrier().await });
        let frame = rx.recv().await.unwrap();
        let (xid, _) = sdn_proto::decode_message(&frame).unwrap();
        agent.complete(xid, Message::Error(ErrorMsg { error_type: 2, code: 3, data: vec![] }));
        match handle.await.unwrap() {
            Err(CoreError::OpenflowError { error_type, code }) => {
                assert_eq!(error_type, 2);
                assert_eq!(code, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn session_death_resolves_pending_as_session_closed() {
        let (agent, mut rx) = make_agent();
        let agent2 = agent.clone();
        let handle = tokio::spawn(async move { agent2.barrier().await });
        let _frame = rx.recv().await.unwrap();
        agent.fail_all_pending();
        assert!(matches!(handle.await.unwrap(), Err(CoreError::RequestSessionClosed)));
    }

    #[tokio::test]
    async fn request_times_out_when_no_reply_arrives() {
        let (agent, _rx) = make_agent();
        let result = agent.barrier().await;
        assert!(matches!(result, Err(CoreError::RequestTimeout)));
    }

    #[tokio::test]
    async fn unrecognized_xid_is_not_consumed() {
        let (agent, _rx) = make_agent();
        assert!(!agent.complete(999, Message::BarrierReply));
    }
}
