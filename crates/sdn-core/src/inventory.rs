// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SwitchInventory: the Switch/Port arena and its ~2s stats poller.
//!
//! Switches and ports are stored by value in DPID/`(dpid, port_no)`-keyed
//! maps rather than referencing each other through owned pointers (Design
//! Note 9's arena resolution); everything downstream names a switch or
//! port by its key, never by a borrowed reference into this table.

use crate::agent::OFAgent;
use sdn_proto::message::{PortDesc, PortStatus, SwitchConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Registration-order fanout for inventory changes — the same observer
/// shape `server::SessionHandler` uses, applied to a different event set.
pub trait InventoryObserver: Send + Sync {
    fn on_event(&self, event: InventoryEvent);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryEvent {
    SwitchUp { dpid: u64 },
    SwitchDown { dpid: u64 },
    PortAdded { dpid: u64, port_no: u32 },
    PortDeleted { dpid: u64, port_no: u32 },
    LinkUp { dpid: u64, port_no: u32 },
    LinkDown { dpid: u64, port_no: u32 },
}

/// Device-database defaults keyed by the (dpid, vendor, hw, sw, serial)
/// tuple spec §4.3 describes; this controller carries only the key and
/// leaves whatever property lookup a deployment wants to attach to it out
/// of scope (no REST/app-loader surface per the Non-goals).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceKey {
    pub dpid: u64,
    pub vendor: String,
    pub hw: String,
    pub sw: String,
    pub serial: String,
}

#[derive(Debug, Clone, Default)]
struct RollingSample {
    at: std::time::Instant,
    rx_bytes: u64,
    tx_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct PortRecord {
    pub port_no: u32,
    pub name: String,
    pub hw_addr: [u8; 6],
    pub link_up: bool,
    pub current_speed_mbps: u64,
    pub max_speed_mbps: u64,
    last_sample: Option<RollingSample>,
}

impl PortRecord {
    fn from_desc(desc: &PortDesc) -> Self {
        PortRecord {
            port_no: desc.port_no,
            name: desc.name.clone(),
            hw_addr: desc.hw_addr,
            link_up: !desc.link_down(),
            current_speed_mbps: 0,
            max_speed_mbps: (desc.max_speed as u64).max(desc.curr_speed as u64),
            last_sample: None,
        }
    }

    /// Folds one port-stats sample into the rolling speed estimate.
    /// Samples at or before the last recorded time are a clock regression
    /// (switch reboot, counter wrap) and reset the window while preserving
    /// the lifetime max, per spec §4.3's "monotonic sample-time
    /// enforcement."
    fn observe(&mut self, at: std::time::Instant, rx_bytes: u64, tx_bytes: u64) {
        if let Some(prev) = &self.last_sample {
            if at <= prev.at {
                self.last_sample = None;
                return;
            }
            let elapsed = (at - prev.at).as_secs_f64();
            if elapsed > 0.0 {
                let delta_bytes = rx_bytes.saturating_sub(prev.rx_bytes) + tx_bytes.saturating_sub(prev.tx_bytes);
                let mbps = ((delta_bytes as f64 * 8.0) / elapsed / 1_000_000.0) as u64;
                self.current_speed_mbps = mbps;
                self.max_speed_mbps = self.max_speed_mbps.max(mbps);
            }
        }
        self.last_sample = Some(RollingSample { at, rx_bytes, tx_bytes });
    }
}

#[derive(Debug, Clone)]
pub struct Switch {
    pub dpid: u64,
    pub mfr_desc: String,
    pub hw_desc: String,
    pub sw_desc: String,
    pub serial_num: String,
    pub ports: HashMap<u32, PortRecord>,
    pub up: bool,
    pub config: Option<SwitchConfig>,
}

impl Switch {
    pub fn device_key(&self) -> DeviceKey {
        DeviceKey {
            dpid: self.dpid,
            vendor: self.mfr_desc.clone(),
            hw: self.hw_desc.clone(),
            sw: self.sw_desc.clone(),
            serial: self.serial_num.clone(),
        }
    }
}

#[derive(Clone)]
pub struct SwitchInventory {
    switches: Arc<RwLock<HashMap<u64, Switch>>>,
    observers: Arc<RwLock<Vec<Arc<dyn InventoryObserver>>>>,
}

impl Default for SwitchInventory {
    fn default() -> Self {
        SwitchInventory {
            switches: Arc::new(RwLock::new(HashMap::new())),
            observers: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl SwitchInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_observer(&self, observer: Arc<dyn InventoryObserver>) {
        self.observers.write().await.push(observer);
    }

    async fn emit(&self, event: InventoryEvent) {
        for observer in self.observers.read().await.iter() {
            observer.on_event(event.clone());
        }
    }

    /// Constructs the `Switch` record on first features-reply: fetches
    /// desc/port-desc/config via the agent, attaches it, and announces "up".
    pub async fn on_features_reply(&self, dpid: u64, agent: &OFAgent) -> crate::error::CoreResult<()> {
        let desc = agent.get_desc().await?;
        let port_descs = agent.get_port_desc().await?;
        let config = agent.get_config().await?;

        let mut ports = HashMap::new();
        for pd in &port_descs {
            ports.insert(pd.port_no, PortRecord::from_desc(pd));
        }

        let switch = Switch {
            dpid,
            mfr_desc: desc.mfr_desc,
            hw_desc: desc.hw_desc,
            sw_desc: desc.sw_desc,
            serial_num: desc.serial_num,
            ports,
            up: true,
            config: Some(config),
        };
        self.switches.write().await.insert(dpid, switch);
        info!("switch {:#x} up with {} ports", dpid, port_descs.len());
        self.emit(InventoryEvent::SwitchUp { dpid }).await;
        for pd in &port_descs {
            self.emit(InventoryEvent::PortAdded { dpid, port_no: pd.port_no }).await;
            if !pd.link_down() {
                self.emit(InventoryEvent::LinkUp { dpid, port_no: pd.port_no }).await;
            }
        }
        Ok(())
    }

    pub async fn on_switch_down(&self, dpid: u64) {
        if self.switches.write().await.remove(&dpid).is_some() {
            self.emit(InventoryEvent::SwitchDown { dpid }).await;
        }
    }

    /// `OFPPR_ADD` / `OFPPR_DELETE` / `OFPPR_MODIFY` semantics for an
    /// unsolicited `PortStatus` message.
    pub async fn on_port_status(&self, dpid: u64, status: PortStatus) {
        const OFPPR_ADD: u8 = 0;
        const OFPPR_DELETE: u8 = 1;
        const OFPPR_MODIFY: u8 = 2;

        let mut switches = self.switches.write().await;
        let Some(switch) = switches.get_mut(&dpid) else { return };
        let port_no = status.desc.port_no;
        let link_up = !status.desc.link_down();

        match status.reason {
            OFPPR_ADD => {
                switch.ports.insert(port_no, PortRecord::from_desc(&status.desc));
                drop(switches);
                self.emit(InventoryEvent::PortAdded { dpid, port_no }).await;
                if link_up {
                    self.emit(InventoryEvent::LinkUp { dpid, port_no }).await;
                }
            }
            OFPPR_DELETE => {
                switch.ports.remove(&port_no);
                drop(switches);
                self.emit(InventoryEvent::PortDeleted { dpid, port_no }).await;
            }
            OFPPR_MODIFY => {
                let was_up = switch.ports.get(&port_no).map(|p| p.link_up).unwrap_or(false);
                switch.ports.insert(port_no, PortRecord::from_desc(&status.desc));
                drop(switches);
                if was_up && !link_up {
                    self.emit(InventoryEvent::LinkDown { dpid, port_no }).await;
                } else if !was_up && link_up {
                    self.emit(InventoryEvent::LinkUp { dpid, port_no }).await;
                }
            }
            _ => {}
        }
    }

    /// One ~2s poll tick: port-stats always, queue-stats always, flow-stats
    /// only when `poll_flow_stats` is set (spec: "conditional flow-stats").
    pub async fn poll_once(&self, dpid: u64, agent: &OFAgent, poll_flow_stats: bool) -> crate::error::CoreResult<()> {
        let entries = agent.get_port_stats(0xffff_ffff).await?;
        let now = std::time::Instant::now();
        {
            let mut switches = self.switches.write().await;
            if let Some(switch) = switches.get_mut(&dpid) {
                for entry in &entries {
                    if let Some(port) = switch.ports.get_mut(&entry.port_no) {
                        port.observe(now, entry.rx_bytes, entry.tx_bytes);
                    }
                }
            }
        }
        if poll_flow_stats {
            let _ = agent.get_flow_stats(0xff, sdn_proto::oxm::Match::new()).await?;
        }
        Ok(())
    }

    pub async fn switch(&self, dpid: u64) -> Option<Switch> {
        self.switches.read().await.get(&dpid).cloned()
    }

    pub async fn is_up(&self, dpid: u64) -> bool {
        self.switches.read().await.get(&dpid).map(|s| s.up).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(port_no: u32, link_down: bool) -> PortDesc {
        PortDesc {
            port_no,
            hw_addr: [0; 6],
            name: format!("eth{port_no}"),
            config: 0,
            state: if link_down { 1 } else { 0 },
            curr: 0,
            advertised: 0,
            supported: 0,
            peer: 0,
            curr_speed: 1000,
            max_speed: 1000,
        }
    }

    #[test]
    fn speed_resets_on_clock_regression_but_keeps_max() {
        let mut port = PortRecord::from_desc(&desc(1, false));
        let t0 = std::time::Instant::now();
        port.observe(t0, 0, 0);
        port.observe(t0 + std::time::Duration::from_secs(1), 1_250_000, 0);
        assert_eq!(port.current_speed_mbps, 10);
        assert_eq!(port.max_speed_mbps, 1000); // pre-seeded from curr/max speed, larger than observed

        // Regression: an earlier timestamp than the last sample.
        port.observe(t0, 0, 0);
        assert!(port.last_sample.is_none());
    }

    #[tokio::test]
    async fn port_status_add_then_delete_emits_expected_events() {
        struct Collector(tokio::sync::Mutex<Vec<InventoryEvent>>);
        impl InventoryObserver for Collector {
            fn on_event(&self, event: InventoryEvent) {
                self.0.try_lock().unwrap().push(event);
            }
        }
        let collector = Arc::new(Collector(tokio::sync::Mutex::new(Vec::new())));
        let inventory = SwitchInventory::new();
        inventory.register_observer(collector.clone()).await;
        inventory.switches.write().await.insert(
            1,
            Switch { dpid: 1, mfr_desc: "".into(), hw_desc: "".into(), sw_desc: "".into(), serial_num: "".into(), ports: HashMap::new(), up: true, config: None },
        );

        inventory.on_port_status(1, PortStatus { reason: 0, desc: desc(2, false) }).await;
        inventory.on_port_status(1, PortStatus { reason: 1, desc: desc(2, false) }).await;

        let events = collector.0.lock().await;
        assert!(events.contains(&InventoryEvent::PortAdded { dpid: 1, port_no: 2 }));
        assert!(events.contains(&InventoryEvent::LinkUp { dpid: 1, port_no: 2 }));
        assert!(events.contains(&InventoryEvent::PortDeleted { dpid: 1, port_no: 2 }));
    }
}
