// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-connection session state.
//!
//! `ConnectionSession` never owns its `Switch`; it references one by DPID
//! (an arena-style handle per Design Note 9's "cyclic ownership"
//! resolution) so sessions and switches can be torn down independently of
//! each other.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;

/// Monotonically increasing session identifier, issued by `ConnectionServer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

impl SessionId {
    pub fn next() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Lifecycle state of a control-channel session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    /// TCP accepted, version/Hello exchange not yet complete.
    Starting,
    /// Hello negotiated and features-reply received; normal operation.
    Established,
    /// Hello exchange could not agree on a version; session will close.
    NegotiationFailed,
    /// Closed by either side through the normal shutdown path.
    Closed,
    /// Missed `echo_attempts` consecutive keepalives; considered dead.
    Dead,
}

/// Outbound half of a session: raw, already-framed bytes queued to the
/// socket's write task.
pub type OutboundSender = mpsc::Sender<Vec<u8>>;

/// Per-session bookkeeping the `ConnectionServer` owns. Cheap to clone the
/// handle (`Arc<parking_lot::RwLock<ConnectionSession>>` at the call site);
/// the struct itself holds no lock.
#[derive(Debug)]
pub struct ConnectionSession {
    pub id: SessionId,
    pub remote_addr: SocketAddr,
    pub version: u8,
    pub dpid: Option<u64>,
    pub state: LivenessState,
    pub echo_missed: u32,
    pub last_echo_sent: Option<Instant>,
    pub messages_received: u64,
    pub messages_sent: u64,
    #[allow(dead_code)]
    outbound: OutboundSender,
}

impl ConnectionSession {
    pub fn new(id: SessionId, remote_addr: SocketAddr, outbound: OutboundSender) -> Self {
        ConnectionSession {
            id,
            remote_addr,
            version: 0,
            dpid: None,
            state: LivenessState::Starting,
            echo_missed: 0,
            last_echo_sent: None,
            messages_received: 0,
            messages_sent: 0,
            outbound,
        }
    }

    pub fn outbound(&self) -> OutboundSender {
        self.outbound.clone()
    }

    pub fn is_alive(&self) -> bool {
        matches!(self.state, LivenessState::Starting | LivenessState::Established)
    }

    /// Records an echo-reply arrival, resetting the missed-keepalive counter.
    pub fn note_echo_reply(&mut self) {
        self.echo_missed = 0;
    }

    /// Records an echo-request send without a reply yet observed; returns
    /// true once `max_attempts` consecutive misses have accumulated.
    pub fn note_echo_sent_and_check_dead(&mut self, max_attempts: u32) -> bool {
        self.echo_missed += 1;
        self.last_echo_sent = Some(Instant::now());
        self.echo_missed >= max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_session() -> ConnectionSession {
        let (tx, _rx) = mpsc::channel(8);
        ConnectionSession::new(
            SessionId::next(),
            "127.0.0.1:6633".parse().unwrap(),
            tx,
        )
    }

    #[test]
    fn starting_session_is_alive() {
        let session = make_session();
        assert!(session.is_alive());
    }

    #[test]
    fn dies_after_max_missed_echoes() {
        let mut session = make_session();
        assert!(!session.note_echo_sent_and_check_dead(3));
        assert!(!session.note_echo_sent_and_check_dead(3));
        assert!(session.note_echo_sent_and_check_dead(3));
    }

    #[test]
    fn echo_reply_resets_miss_counter() {
        let mut session = make_session();
        session.note_echo_sent_and_check_dead(3);
        session.note_echo_reply();
        assert_eq!(session.echo_missed, 0);
    }
}
