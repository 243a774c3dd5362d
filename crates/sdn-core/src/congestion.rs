// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OfMsgSender: per-switch AIMD congestion pacing for outbound message
//! bursts (flow-mod floods during topology reconvergence, full-table
//! reconciliation, and the like).
//!
//! Grounded on `hdds/src/congestion/rate_controller.rs`'s window-based
//! AIMD shape (additive-increase-on-success, multiplicative-decrease-on-
//! timeout, floored window), generalized from a single shared send window
//! to one window per switch DPID and from a fixed ack signal to an
//! OpenFlow barrier round-trip.

use crate::agent::OFAgent;
use crate::config::OfMsgSenderConfig;
use crate::error::CoreResult;
use sdn_proto::message::Message;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

struct PacerState {
    window: AtomicU32,
    inflight: AtomicU32,
}

/// One switch's AIMD send window. `send` blocks until a slot opens, sends
/// the message, then races a barrier against `wait_interval_ms` to decide
/// whether the window grows or shrinks.
pub struct Pacer {
    config: OfMsgSenderConfig,
    state: Arc<PacerState>,
}

impl Pacer {
    fn new(config: OfMsgSenderConfig) -> Self {
        let initial = config.window_floor.max(1);
        Pacer { config, state: Arc::new(PacerState { window: AtomicU32::new(initial), inflight: AtomicU32::new(0) }) }
    }

    pub fn window(&self) -> u32 {
        self.state.window.load(Ordering::Relaxed)
    }

    pub fn inflight(&self) -> u32 {
        self.state.inflight.load(Ordering::Relaxed)
    }

    async fn reserve_slot(&self) {
        loop {
            let window = self.state.window.load(Ordering::Relaxed);
            let inflight = self.state.inflight.fetch_add(1, Ordering::AcqRel);
            if inflight < window {
                return;
            }
            self.state.inflight.fetch_sub(1, Ordering::AcqRel);
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    /// Sends `message` through `agent` once a window slot is free, then
    /// follows up with a barrier to drive the AIMD feedback loop. Returns
    /// once the message itself has been written to the wire; the barrier
    /// round-trip and window adjustment continue in the background.
    pub async fn send(&self, agent: &OFAgent, message: Message) -> CoreResult<()> {
        self.reserve_slot().await;
        let result = agent.send_with_fresh_xid(&message).await;
        if result.is_err() {
            self.state.inflight.fetch_sub(1, Ordering::AcqRel);
            return result.map(|_| ());
        }

        let state = self.state.clone();
        let additive = self.config.additive_ratio;
        let multiplicative = self.config.multiplicative_ratio.max(1);
        let floor = self.config.window_floor.max(1);
        let deadline = self.config.wait_interval();
        let agent = agent.clone();
        tokio::spawn(async move {
            let acked = tokio::time::timeout(deadline, agent.barrier()).await;
            state.inflight.fetch_sub(1, Ordering::AcqRel);
            match acked {
                Ok(Ok(())) => {
                    state.window.fetch_add(additive, Ordering::AcqRel);
                }
                _ => {
                    let current = state.window.load(Ordering::Relaxed);
                    let shrunk = (current / multiplicative).max(floor);
                    state.window.store(shrunk, Ordering::Relaxed);
                    debug!("congestion window shrunk to {shrunk} after missed barrier ack");
                }
            }
        });
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct OfMsgSender {
    pacers: Arc<RwLock<HashMap<u64, Arc<Pacer>>>>,
    config: OfMsgSenderConfig,
}

impl OfMsgSender {
    pub fn new(config: OfMsgSenderConfig) -> Self {
        OfMsgSender { pacers: Arc::new(RwLock::new(HashMap::new())), config }
    }

    pub async fn pacer_for(&self, dpid: u64) -> Arc<Pacer> {
        if let Some(pacer) = self.pacers.read().await.get(&dpid) {
            return pacer.clone();
        }
        let mut pacers = self.pacers.write().await;
        pacers
            .entry(dpid)
            .or_insert_with(|| Arc::new(Pacer::new(self.config.clone())))
            .clone()
    }

    pub async fn drop_switch(&self, dpid: u64) {
        self.pacers.write().await.remove(&dpid);
    }

    pub async fn send(&self, dpid: u64, agent: &OFAgent, message: Message) -> CoreResult<()> {
        self.pacer_for(dpid).await.send(agent, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdn_proto::message::Message as OfMessage;
    use std::time::Duration;

    fn test_config() -> OfMsgSenderConfig {
        OfMsgSenderConfig { poll_interval_ms: 5, wait_interval_ms: 50, window_floor: 2, additive_ratio: 3, multiplicative_ratio: 2 }
    }

    fn make_agent() -> (OFAgent, tokio::sync::mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = tokio::sync::mpsc::channel(32);
        (OFAgent::new(1, tx, Duration::from_millis(200)), rx)
    }

    #[tokio::test]
    async fn window_grows_additively_on_timely_barrier_ack() {
        let pacer = Pacer::new(test_config());
        let (agent, mut rx) = make_agent();
        let initial_window = pacer.window();

        pacer.send(&agent, OfMessage::EchoRequest(vec![])).await.unwrap();
        let _echo_frame = rx.recv().await.unwrap();
        let barrier_frame = rx.recv().await.unwrap();
        let (xid, _) = sdn_proto::decode_message(&barrier_frame).unwrap();
        agent.complete(xid, OfMessage::BarrierReply);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pacer.window(), initial_window + 3);
        assert_eq!(pacer.inflight(), 0);
    }

    #[tokio::test]
    async fn window_shrinks_multiplicatively_when_barrier_times_out() {
        let pacer = Pacer::new(test_config());
        let (agent, _rx) = make_agent();
        let initial_window = pacer.window();

        pacer.send(&agent, OfMessage::EchoRequest(vec![])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(pacer.window() <= initial_window);
        assert!(pacer.window() >= 2); // never below configured floor
    }

    #[tokio::test]
    async fn per_switch_pacers_are_independent() {
        let sender = OfMsgSender::new(test_config());
        let a = sender.pacer_for(1).await;
        let b = sender.pacer_for(2).await;
        assert!(!Arc::ptr_eq(&a, &b));
        let a_again = sender.pacer_for(1).await;
        assert!(Arc::ptr_eq(&a, &a_again));
    }
}
