// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The `SessionHandler` this daemon registers on its `ConnectionServer`.
//!
//! `server.rs::SessionHandler` dispatches every decoded message to each
//! registered handler in turn, same as `InventoryObserver`'s fanout; this
//! type is the one handler this binary needs, routing each message kind
//! to whichever core component owns it (features replies to the
//! inventory, packet-ins carrying beacons to link discovery, flow-removed
//! notifications to the verifier).

use parking_lot::Mutex as SyncMutex;
use sdn_core::link_discovery::decode_beacon_frame;
use sdn_core::{FlowVerifier, LinkDiscoverer, OFAgent, OfMsgSender, SessionHandler, SwitchInventory, TopologyEngine};
use sdn_proto::message::Message;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub struct CoreHandler {
    pub inventory: SwitchInventory,
    pub link_discovery: Arc<SyncMutex<LinkDiscoverer>>,
    pub flow_verifier: FlowVerifier,
    pub topology: TopologyEngine,
    pub sender: OfMsgSender,
}

impl SessionHandler for CoreHandler {
    fn on_message(&self, dpid: u64, agent: &OFAgent, message: &Message) {
        match message {
            Message::FeaturesReply(_) => {
                let inventory = self.inventory.clone();
                let agent = agent.clone();
                tokio::spawn(async move {
                    if let Err(e) = inventory.on_features_reply(dpid, &agent).await {
                        warn!("switch {:#x} features fetch failed: {}", dpid, e);
                    }
                });
            }
            Message::PortStatus(status) => {
                let inventory = self.inventory.clone();
                let port_no = status.desc.port_no;
                let down = status.desc.link_down();
                let status = status.clone();
                tokio::spawn(async move {
                    inventory.on_port_status(dpid, status).await;
                });
                if down {
                    let events = self.link_discovery.lock().on_port_down((dpid, port_no));
                    let topology = self.topology.clone();
                    tokio::spawn(async move {
                        for event in events {
                            debug!("link event from port-down on {:#x}/{}: {:?}", dpid, port_no, event);
                            topology.apply_link_event(event).await;
                        }
                    });
                }
            }
            Message::PacketIn(packet_in) => {
                let Some(in_port) = packet_in.match_.in_port() else { return };
                let Some(beacon) = decode_beacon_frame(&packet_in.data) else { return };
                let inventory = self.inventory.clone();
                let link_discovery = self.link_discovery.clone();
                let topology = self.topology.clone();
                tokio::spawn(async move {
                    let sender_known = inventory.is_up(beacon.dpid).await;
                    let event = link_discovery.lock().on_beacon((dpid, in_port), &beacon, Instant::now(), sender_known);
                    if let Some(event) = event {
                        debug!("link discovery event: {:?}", event);
                        topology.apply_link_event(event).await;
                    }
                });
            }
            Message::FlowRemoved(removed) => {
                let verifier = self.flow_verifier.clone();
                let sender = self.sender.clone();
                let agent = agent.clone();
                let removed = removed.clone();
                tokio::spawn(async move {
                    verifier.on_flow_removed(dpid, &agent, &sender, &removed).await;
                });
            }
            _ => {}
        }
    }

    fn on_session_down(&self, dpid: u64) {
        let inventory = self.inventory.clone();
        let sender = self.sender.clone();
        tokio::spawn(async move {
            inventory.on_switch_down(dpid).await;
            sender.drop_switch(dpid).await;
        });
    }
}
