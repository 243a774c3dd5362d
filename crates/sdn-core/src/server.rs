// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ConnectionServer: the TCP control-channel accept loop.
//!
//! Shape is lifted straight from `DiscoveryServer::run`/`handle_connection`
//! (`Arc<RwLock<_>>` registry, `Arc<AtomicBool>` running flag,
//! `Arc<Notify>` shutdown, per-connection `tokio::spawn` with a
//! `tokio::select!` between read and shutdown) and `ClientConnection`'s
//! length-prefixed read/write pair, generalized here to OpenFlow framing
//! (`FrameReader`/`encode_message`) and version negotiation instead of a
//! fixed JSON protocol.

use crate::agent::OFAgent;
use crate::config::OfServerConfig;
use crate::dpid_guard::DpidGuard;
use crate::session::{ConnectionSession, LivenessState, SessionId};
use parking_lot::Mutex as SyncMutex;
use sdn_proto::message::Message;
use sdn_proto::{decode_message, encode_message, FrameReader, OFP_VERSION};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify, RwLock};
use tracing::{debug, info, warn};

/// Registration-order fanout target. Exceptions (panics aside) must be
/// logged, never allowed to take the whole dispatch loop down — matching
/// spec §4.2's "receive fanout... exceptions logged not fatal."
pub trait SessionHandler: Send + Sync {
    fn on_message(&self, dpid: u64, agent: &OFAgent, message: &Message);
    fn on_session_down(&self, dpid: u64) {
        let _ = dpid;
    }
}

struct Entry {
    session: Arc<SyncMutex<ConnectionSession>>,
    agent: OFAgent,
    kill: Arc<Notify>,
}

/// Sliding 1-second inbound packet-rate limiter, opt-in per
/// `of-server.limiter`. A fixed window recomputed on the second boundary
/// is enough for a coarse pps ceiling; unlike AIMD pacing this never backs
/// off, it just drops.
struct RateLimiter {
    max_pps: u32,
    window_start: SyncMutex<Instant>,
    count: AtomicU32,
}

impl RateLimiter {
    fn new(max_pps: u32) -> Self {
        RateLimiter {
            max_pps,
            window_start: SyncMutex::new(Instant::now()),
            count: AtomicU32::new(0),
        }
    }

    /// Returns `true` if the frame should be accepted.
    fn allow(&self) -> bool {
        let mut start = self.window_start.lock();
        if start.elapsed() >= Duration::from_secs(1) {
            *start = Instant::now();
            self.count.store(0, Ordering::Relaxed);
        }
        self.count.fetch_add(1, Ordering::Relaxed) < self.max_pps
    }
}

/// Coalesces repeated "unknown DPID" warnings behind one log line per
/// window instead of one per rejected connection attempt.
struct CoalescedLog {
    window: Duration,
    last_logged: SyncMutex<Instant>,
    suppressed: AtomicU32,
}

impl CoalescedLog {
    fn new(window: Duration) -> Self {
        CoalescedLog {
            window,
            last_logged: SyncMutex::new(Instant::now() - window),
            suppressed: AtomicU32::new(0),
        }
    }

    fn note(&self, dpid: u64, addr: SocketAddr) {
        let mut last = self.last_logged.lock();
        if last.elapsed() >= self.window {
            let suppressed = self.suppressed.swap(0, Ordering::Relaxed);
            warn!(
                "rejected connection from {} for unknown dpid {:#x} ({} more suppressed in last {:?})",
                addr, dpid, suppressed, self.window
            );
            *last = Instant::now();
        } else {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[derive(Clone)]
pub struct ConnectionServer {
    config: Arc<OfServerConfig>,
    dpid_guard: Arc<DpidGuard>,
    by_session: Arc<RwLock<HashMap<SessionId, Entry>>>,
    by_dpid: Arc<RwLock<HashMap<u64, SessionId>>>,
    handlers: Arc<RwLock<Vec<Arc<dyn SessionHandler>>>>,
    limiter: Option<Arc<RateLimiter>>,
    unknown_dpid_log: Arc<CoalescedLog>,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
}

impl ConnectionServer {
    pub fn new(config: OfServerConfig, dpid_guard: Arc<DpidGuard>) -> Self {
        let limiter = config.limiter.then(|| Arc::new(RateLimiter::new(config.max_pps)));
        ConnectionServer {
            config: Arc::new(config),
            dpid_guard,
            by_session: Arc::new(RwLock::new(HashMap::new())),
            by_dpid: Arc::new(RwLock::new(HashMap::new())),
            handlers: Arc::new(RwLock::new(Vec::new())),
            limiter,
            unknown_dpid_log: Arc::new(CoalescedLog::new(Duration::from_secs(5))),
            shutdown: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn register_handler(&self, handler: Arc<dyn SessionHandler>) {
        self.handlers.write().await.push(handler);
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    pub async fn agent_for(&self, dpid: u64) -> Option<OFAgent> {
        let by_dpid = self.by_dpid.read().await;
        let id = by_dpid.get(&dpid)?;
        let by_session = self.by_session.read().await;
        by_session.get(id).map(|e| e.agent.clone())
    }

    pub async fn connected_dpids(&self) -> Vec<u64> {
        self.by_dpid.read().await.keys().copied().collect()
    }

    /// Tears down an established session out-of-band, e.g. `MastershipController`
    /// disconnecting a switch `DpidGuard` just de-allowlisted. A no-op if the
    /// dpid is not currently connected.
    pub async fn disconnect(&self, dpid: u64) {
        let by_dpid = self.by_dpid.read().await;
        let Some(id) = by_dpid.get(&dpid) else { return };
        let by_session = self.by_session.read().await;
        if let Some(entry) = by_session.get(id) {
            entry.kill.notify_waiters();
        }
    }

    pub async fn run(self) -> std::io::Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let addr = format!("{}:{}", self.config.address, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("openflow control channel listening on {}", addr);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            let server = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    warn!("session from {} ended: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => warn!("accept error: {}", e),
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("connection server shutting down");
                    break;
                }
            }
        }
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn handle_connection(&self, mut stream: TcpStream, peer_addr: SocketAddr) -> std::io::Result<()> {
        // Version negotiation: this controller speaks 1.3 only.
        let hello = encode_message(0, &Message::Hello).unwrap();
        stream.write_all(&hello).await?;

        let mut reader = FrameReader::new();
        let mut buf = [0u8; 4096];
        let peer_version = loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }
            reader.feed(&buf[..n]);
            match reader.next_frame() {
                Ok(Some(frame)) => match decode_message(&frame) {
                    Ok((_, Message::Hello)) => break frame[0],
                    _ => {
                        debug!("{} sent non-hello before negotiation completed", peer_addr);
                        return Ok(());
                    }
                },
                Ok(None) => continue,
                Err(e) => {
                    debug!("{} sent malformed hello frame: {}", peer_addr, e);
                    return Ok(());
                }
            }
        };
        if peer_version != OFP_VERSION {
            warn!("{} negotiation failed, peer version {:#x}", peer_addr, peer_version);
            return Ok(());
        }

        let session_id = SessionId::next();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Vec<u8>>(256);
        let session = Arc::new(SyncMutex::new(ConnectionSession::new(session_id, peer_addr, outbound_tx.clone())));
        session.lock().state = LivenessState::Established;

        let (read_half, mut write_half) = stream.into_split();
        let writer_task = tokio::spawn(async move {
            while let Some(bytes) = outbound_rx.recv().await {
                if write_half.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        });

        let agent = OFAgent::new(0, outbound_tx.clone(), Duration::from_secs(5));
        let kill = Arc::new(Notify::new());
        self.by_session.write().await.insert(session_id, Entry { session: session.clone(), agent: agent.clone(), kill: kill.clone() });

        let result = self.session_read_loop(read_half, reader, session.clone(), agent.clone(), peer_addr, kill).await;

        let dpid = session.lock().dpid;
        session.lock().state = LivenessState::Closed;
        agent.fail_all_pending();
        self.by_session.write().await.remove(&session_id);
        if let Some(dpid) = dpid {
            // Only evict the dpid->session mapping if it still points at
            // this session: a losing duplicate-dpid connection's cleanup
            // runs after the replacement has already taken the slot, and
            // must not tear down the live session's mapping out from
            // under it.
            let still_current = {
                let mut by_dpid = self.by_dpid.write().await;
                if by_dpid.get(&dpid) == Some(&session_id) {
                    by_dpid.remove(&dpid);
                    true
                } else {
                    false
                }
            };
            if still_current {
                let handlers = self.handlers.read().await;
                for handler in handlers.iter() {
                    handler.on_session_down(dpid);
                }
            }
        }
        drop(outbound_tx);
        writer_task.abort();
        result
    }

    async fn session_read_loop(
        &self,
        mut read_half: tokio::net::tcp::OwnedReadHalf,
        mut reader: FrameReader,
        session: Arc<SyncMutex<ConnectionSession>>,
        agent: OFAgent,
        peer_addr: SocketAddr,
        kill: Arc<Notify>,
    ) -> std::io::Result<()> {
        let mut buf = [0u8; 4096];
        let echo_interval = self.config.echo_interval();
        let mut echo_tick = tokio::time::interval(echo_interval);

        loop {
            tokio::select! {
                _ = kill.notified() => {
                    debug!("{} session killed out-of-band", peer_addr);
                    return Ok(());
                }
                n = read_half.read(&mut buf) => {
                    let n = n?;
                    if n == 0 {
                        return Ok(());
                    }
                    reader.feed(&buf[..n]);
                    loop {
                        match reader.next_frame() {
                            Ok(Some(frame)) => {
                                if let Some(limiter) = &self.limiter {
                                    if !limiter.allow() {
                                        continue;
                                    }
                                }
                                match decode_message(&frame) {
                                    Ok((xid, message)) => {
                                        self.dispatch(&session, &agent, peer_addr, xid, message).await;
                                        if session.lock().state == LivenessState::Closed {
                                            debug!("{} session closed by dispatch, tearing down", peer_addr);
                                            return Ok(());
                                        }
                                    }
                                    Err(e) => debug!("{} sent undecodable frame: {}", peer_addr, e),
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                debug!("{} framing error: {}", peer_addr, e);
                                return Ok(());
                            }
                        }
                    }
                }
                _ = echo_tick.tick() => {
                    let dead = {
                        let mut s = session.lock();
                        s.note_echo_sent_and_check_dead(self.config.echo_attempts)
                    };
                    if dead {
                        session.lock().state = LivenessState::Dead;
                        return Ok(());
                    }
                    let bytes = encode_message(0, &Message::EchoRequest(vec![]))?;
                    let outbound = session.lock().outbound();
                    let _ = outbound.send(bytes).await;
                }
            }
        }
    }

    async fn dispatch(
        &self,
        session: &Arc<SyncMutex<ConnectionSession>>,
        agent: &OFAgent,
        peer_addr: SocketAddr,
        xid: u32,
        message: Message,
    ) {
        {
            let mut s = session.lock();
            s.messages_received += 1;
        }

        match &message {
            Message::EchoRequest(payload) => {
                let reply = encode_message(xid, &Message::EchoReply(payload.clone())).unwrap();
                let outbound = session.lock().outbound();
                let _ = outbound.send(reply).await;
                return;
            }
            Message::EchoReply(_) => {
                session.lock().note_echo_reply();
                return;
            }
            Message::FeaturesReply(features) => {
                if session.lock().dpid.is_none() {
                    if !self.dpid_guard.is_allowed(features.datapath_id) {
                        self.unknown_dpid_log.note(features.datapath_id, peer_addr);
                        session.lock().state = LivenessState::Closed;
                        return;
                    }
                    let mut by_dpid = self.by_dpid.write().await;
                    if let Some(existing) = by_dpid.get(&features.datapath_id) {
                        let by_session = self.by_session.read().await;
                        if let Some(existing_entry) = by_session.get(existing) {
                            if existing_entry.session.lock().is_alive() {
                                warn!("duplicate dpid {:#x}, closing new connection", features.datapath_id);
                                session.lock().state = LivenessState::Closed;
                                return;
                            }
                        }
                    }
                    by_dpid.insert(features.datapath_id, session.lock().id);
                    session.lock().dpid = Some(features.datapath_id);
                    agent.set_dpid(features.datapath_id);
                }
            }
            _ => {}
        }

        if agent.is_pending(xid) {
            agent.complete(xid, message);
            return;
        }

        let dpid = match session.lock().dpid {
            Some(d) => d,
            None => return,
        };
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.on_message(dpid, agent, &message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_drops_above_ceiling() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }

    #[tokio::test]
    async fn agent_for_unknown_dpid_is_none() {
        let server = ConnectionServer::new(OfServerConfig::default(), Arc::new(DpidGuard::new(&Default::default())));
        assert!(server.agent_for(0x1234).await.is_none());
    }
}
