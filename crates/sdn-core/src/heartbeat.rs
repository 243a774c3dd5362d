// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HeartbeatService: the UDP wire protocol and timing loop the cluster
//! mastership state machine uses to tell whether its peer node is alive.
//!
//! No teacher file speaks this protocol directly — DDS discovery rides
//! RTPS-over-UDP at a completely different layer — so the three-opcode
//! frame shape (`ECHO_REQUEST`/`ECHO_REPLY`/`PARAMETERS_UPDATE`, all
//! big-endian) is built straight from spec §4.7/§6. The accept-loop shape
//! (`tokio::select!` between a socket read, an interval tick, and a
//! shutdown `Notify`) reuses `server.rs::ConnectionServer::run`'s idiom,
//! and the registration-order event fanout reuses
//! `inventory.rs::InventoryObserver`'s single `on_event` shape rather than
//! `server.rs::SessionHandler`'s multi-method one, since every heartbeat
//! event here is equally shaped.

use crate::config::{HeartbeatMode, NodeStatus, RecoveryManagerConfig};
use crate::error::CoreResult;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Notify, RwLock};
use tracing::{debug, error, warn};

const OPCODE_ECHO_REQUEST: u16 = 1;
const OPCODE_ECHO_REPLY: u16 = 2;
const OPCODE_PARAMETERS_UPDATE: u16 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatMessage {
    EchoRequest { node_id: String, node_start_time: u64, counter: u64 },
    EchoReply { node_id: String, node_start_time: u64, counter: u64 },
    ParametersUpdate {
        node_id: String,
        heartbeat_endpoint: String,
        openflow_endpoint: String,
        datastore_endpoint: String,
    },
}

impl HeartbeatMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            HeartbeatMessage::EchoRequest { node_id, node_start_time, counter } => {
                out.extend_from_slice(&OPCODE_ECHO_REQUEST.to_be_bytes());
                write_string(&mut out, node_id);
                out.extend_from_slice(&node_start_time.to_be_bytes());
                out.extend_from_slice(&counter.to_be_bytes());
            }
            HeartbeatMessage::EchoReply { node_id, node_start_time, counter } => {
                out.extend_from_slice(&OPCODE_ECHO_REPLY.to_be_bytes());
                write_string(&mut out, node_id);
                out.extend_from_slice(&node_start_time.to_be_bytes());
                out.extend_from_slice(&counter.to_be_bytes());
            }
            HeartbeatMessage::ParametersUpdate {
                node_id,
                heartbeat_endpoint,
                openflow_endpoint,
                datastore_endpoint,
            } => {
                out.extend_from_slice(&OPCODE_PARAMETERS_UPDATE.to_be_bytes());
                write_string(&mut out, node_id);
                write_string(&mut out, heartbeat_endpoint);
                write_string(&mut out, openflow_endpoint);
                write_string(&mut out, datastore_endpoint);
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 2 {
            return None;
        }
        let opcode = u16::from_be_bytes([bytes[0], bytes[1]]);
        let mut cursor = &bytes[2..];
        match opcode {
            OPCODE_ECHO_REQUEST | OPCODE_ECHO_REPLY => {
                let node_id = read_string(&mut cursor)?;
                if cursor.len() < 16 {
                    return None;
                }
                let node_start_time = u64::from_be_bytes(cursor[0..8].try_into().ok()?);
                let counter = u64::from_be_bytes(cursor[8..16].try_into().ok()?);
                Some(if opcode == OPCODE_ECHO_REQUEST {
                    HeartbeatMessage::EchoRequest { node_id, node_start_time, counter }
                } else {
                    HeartbeatMessage::EchoReply { node_id, node_start_time, counter }
                })
            }
            OPCODE_PARAMETERS_UPDATE => {
                let node_id = read_string(&mut cursor)?;
                let heartbeat_endpoint = read_string(&mut cursor)?;
                let openflow_endpoint = read_string(&mut cursor)?;
                let datastore_endpoint = read_string(&mut cursor)?;
                Some(HeartbeatMessage::ParametersUpdate {
                    node_id,
                    heartbeat_endpoint,
                    openflow_endpoint,
                    datastore_endpoint,
                })
            }
            _ => None,
        }
    }

    fn node_id(&self) -> &str {
        match self {
            HeartbeatMessage::EchoRequest { node_id, .. }
            | HeartbeatMessage::EchoReply { node_id, .. }
            | HeartbeatMessage::ParametersUpdate { node_id, .. } => node_id,
        }
    }
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn read_string(cursor: &mut &[u8]) -> Option<String> {
    if cursor.len() < 2 {
        return None;
    }
    let len = u16::from_be_bytes([cursor[0], cursor[1]]) as usize;
    *cursor = &cursor[2..];
    if cursor.len() < len {
        return None;
    }
    let s = std::str::from_utf8(&cursor[..len]).ok()?.to_string();
    *cursor = &cursor[len..];
    Some(s)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    /// A heartbeat from the primary arrived; the primary-dead timer
    /// should restart.
    PrimaryHeartbeat,
    /// No primary heartbeat arrived within `hb-primaryWaitingInterval`.
    PrimaryMissing,
    /// The backup answered our echo request.
    BackupReply,
    /// No backup reply arrived within `hb-backupDeadInterval`.
    BackupMissing,
    ParametersUpdate { heartbeat_endpoint: String, openflow_endpoint: String, datastore_endpoint: String },
}

/// Registration-order fanout target, the same shape
/// `inventory.rs::InventoryObserver` uses for its own single-method event
/// stream.
pub trait ClusterEventHandler: Send + Sync {
    fn on_event(&self, event: ClusterEvent);
}

/// UDP heartbeat exchange plus the timers that turn missed exchanges into
/// `ClusterEvent`s for the mastership state machine to react to.
pub struct HeartbeatService {
    config: RecoveryManagerConfig,
    handlers: Arc<RwLock<Vec<Arc<dyn ClusterEventHandler>>>>,
    shutdown: Arc<Notify>,
    counter: AtomicU64,
    node_start_time: u64,
    outbound_rx: mpsc::Receiver<HeartbeatMessage>,
}

impl HeartbeatService {
    /// Returns the service plus the sender side of its outbound channel —
    /// used to push an ad hoc `ParametersUpdate` (e.g. after a config
    /// reload changes an advertised endpoint) without waiting for the
    /// next heartbeat tick.
    pub fn new(config: RecoveryManagerConfig) -> (Self, mpsc::Sender<HeartbeatMessage>) {
        let (tx, rx) = mpsc::channel(16);
        let node_start_time =
            SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        (
            HeartbeatService {
                config,
                handlers: Arc::new(RwLock::new(Vec::new())),
                shutdown: Arc::new(Notify::new()),
                counter: AtomicU64::new(0),
                node_start_time,
                outbound_rx: rx,
            },
            tx,
        )
    }

    pub async fn register_handler(&self, handler: Arc<dyn ClusterEventHandler>) {
        self.handlers.write().await.push(handler);
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    async fn dispatch(&self, event: ClusterEvent) {
        for handler in self.handlers.read().await.iter() {
            handler.on_event(event.clone());
        }
    }

    /// Binds the configured local endpoint and runs the exchange until
    /// shut down. `role` is read on every tick so a concurrent mastership
    /// transition changes this service's behavior on the next cycle
    /// without a restart.
    pub async fn run(mut self, role: Arc<RwLock<NodeStatus>>) -> CoreResult<()> {
        let local_addr = SocketAddr::new(self.config.hb_address_local, self.config.hb_port_local);
        let socket = UdpSocket::bind(local_addr).await?;
        if matches!(self.config.hb_mode, HeartbeatMode::Broadcast) {
            socket.set_broadcast(true)?;
        }
        let remote_addr = SocketAddr::new(self.config.hb_address_remote, self.config.hb_port_remote);

        let mut hb_tick = tokio::time::interval(self.config.hb_interval());
        let mut last_primary_seen = Instant::now();
        let mut last_backup_seen = Instant::now();
        let mut primary_missing_notified = false;
        let mut backup_missing_notified = false;
        let mut buf = [0u8; 512];

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => return Ok(()),
                Some(message) = self.outbound_rx.recv() => {
                    let _ = socket.send_to(&message.encode(), remote_addr).await;
                }
                _ = hb_tick.tick() => {
                    match *role.read().await {
                        NodeStatus::Primary => {
                            let counter = self.counter.fetch_add(1, Ordering::Relaxed);
                            let msg = HeartbeatMessage::EchoRequest {
                                node_id: self.config.id.clone(),
                                node_start_time: self.node_start_time,
                                counter,
                            };
                            let _ = socket.send_to(&msg.encode(), remote_addr).await;
                            if last_backup_seen.elapsed() >= self.config.backup_dead_interval() {
                                if !backup_missing_notified {
                                    warn!("backup {} has not replied within backup-dead interval", self.config.id);
                                    self.dispatch(ClusterEvent::BackupMissing).await;
                                    backup_missing_notified = true;
                                }
                            } else {
                                backup_missing_notified = false;
                            }
                        }
                        NodeStatus::Backup => {
                            if last_primary_seen.elapsed() >= self.config.primary_waiting_interval() {
                                if !primary_missing_notified {
                                    warn!("no primary heartbeat within primary-waiting interval");
                                    self.dispatch(ClusterEvent::PrimaryMissing).await;
                                    primary_missing_notified = true;
                                }
                            } else {
                                primary_missing_notified = false;
                            }
                        }
                        NodeStatus::Recovery => {}
                    }
                }
                received = socket.recv_from(&mut buf) => {
                    let Ok((n, _peer)) = received else { continue };
                    let Some(message) = HeartbeatMessage::decode(&buf[..n]) else {
                        debug!("dropping undecodable heartbeat frame ({} bytes)", n);
                        continue;
                    };
                    if message.node_id() == self.config.id {
                        if let HeartbeatMessage::EchoRequest { node_start_time, .. }
                            | HeartbeatMessage::EchoReply { node_start_time, .. } = &message
                        {
                            if *node_start_time != self.node_start_time {
                                error!(
                                    "duplicate heartbeat node id {} with conflicting start time, aborting",
                                    self.config.id
                                );
                                return Err(std::io::Error::new(
                                    std::io::ErrorKind::AddrInUse,
                                    "duplicate heartbeat node id",
                                ).into());
                            }
                        }
                        continue; // a node does not act on its own heartbeats
                    }
                    match message {
                        HeartbeatMessage::EchoRequest { node_start_time, counter, .. } => {
                            last_primary_seen = Instant::now();
                            self.dispatch(ClusterEvent::PrimaryHeartbeat).await;
                            let reply = HeartbeatMessage::EchoReply {
                                node_id: self.config.id.clone(),
                                node_start_time,
                                counter,
                            };
                            let _ = socket.send_to(&reply.encode(), remote_addr).await;
                        }
                        HeartbeatMessage::EchoReply { .. } => {
                            last_backup_seen = Instant::now();
                            self.dispatch(ClusterEvent::BackupReply).await;
                        }
                        HeartbeatMessage::ParametersUpdate {
                            heartbeat_endpoint, openflow_endpoint, datastore_endpoint, ..
                        } => {
                            self.dispatch(ClusterEvent::ParametersUpdate {
                                heartbeat_endpoint,
                                openflow_endpoint,
                                datastore_endpoint,
                            }).await;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_request_roundtrips_through_bytes() {
        let msg = HeartbeatMessage::EchoRequest { node_id: "node-1".into(), node_start_time: 1_700_000_000, counter: 42 };
        let bytes = msg.encode();
        assert_eq!(HeartbeatMessage::decode(&bytes), Some(msg));
    }

    #[test]
    fn parameters_update_roundtrips_through_bytes() {
        let msg = HeartbeatMessage::ParametersUpdate {
            node_id: "node-2".into(),
            heartbeat_endpoint: "10.0.0.2:30303".into(),
            openflow_endpoint: "10.0.0.2:6633".into(),
            datastore_endpoint: "10.0.0.2:6379".into(),
        };
        let bytes = msg.encode();
        assert_eq!(HeartbeatMessage::decode(&bytes), Some(msg));
    }

    #[test]
    fn truncated_frame_fails_to_decode() {
        let msg = HeartbeatMessage::EchoReply { node_id: "x".into(), node_start_time: 1, counter: 1 };
        let mut bytes = msg.encode();
        bytes.truncate(bytes.len() - 2);
        assert_eq!(HeartbeatMessage::decode(&bytes), None);
    }
}
