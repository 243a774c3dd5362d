// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LinkDiscoverer: beacon-based inter-switch link discovery.
//!
//! Beacon payload endianness was an Open Question in spec.md §9; this
//! module follows the rest of the wire stack and encodes big-endian
//! throughout (documented in `DESIGN.md`, not a silent guess).

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Controller-identifying tag carried in every beacon so a receiver can
/// reject beacons that originated outside this controller's domain
/// (spec §4.4: "reject+log cross-domain").
pub const BEACON_OUI: [u8; 3] = [0x4e, 0x41, 0x53]; // "NAS" — naskel.com

pub type PortKey = (u64, u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beacon {
    pub oui: [u8; 3],
    pub dpid: u64,
    pub port_no: u32,
    pub vlan: Option<u16>,
}

impl Beacon {
    pub fn new(dpid: u64, port_no: u32, vlan: Option<u16>) -> Self {
        Beacon { oui: BEACON_OUI, dpid, port_no, vlan }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        out.extend_from_slice(&self.oui);
        out.push(if self.vlan.is_some() { 1 } else { 0 });
        out.extend_from_slice(&self.dpid.to_be_bytes());
        out.extend_from_slice(&self.port_no.to_be_bytes());
        if let Some(vlan) = self.vlan {
            out.extend_from_slice(&vlan.to_be_bytes());
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 16 {
            return None;
        }
        let oui = [bytes[0], bytes[1], bytes[2]];
        let has_vlan = bytes[3] != 0;
        let dpid = u64::from_be_bytes(bytes[4..12].try_into().ok()?);
        let port_no = u32::from_be_bytes(bytes[12..16].try_into().ok()?);
        let vlan = if has_vlan {
            Some(u16::from_be_bytes(bytes.get(16..18)?.try_into().ok()?))
        } else {
            None
        };
        Some(Beacon { oui, dpid, port_no, vlan })
    }
}

/// Destination MAC beacons go out on, reserved so switches never forward
/// it past the directly-connected neighbor (same role LLDP's nearest-bridge
/// multicast address plays).
pub const BEACON_DST_MAC: [u8; 6] = [0x01, 0x80, 0xc2, 0x4e, 0x41, 0x53];
const BEACON_ETHERTYPE: u16 = 0x88cc;
const ETH_HEADER_LEN: usize = 14;

/// Wraps a beacon in a minimal Ethernet II header so it can be sent as a
/// `PacketOut` payload.
pub fn encode_beacon_frame(src_mac: [u8; 6], beacon: &Beacon) -> Vec<u8> {
    let mut out = Vec::with_capacity(ETH_HEADER_LEN + 18);
    out.extend_from_slice(&BEACON_DST_MAC);
    out.extend_from_slice(&src_mac);
    out.extend_from_slice(&BEACON_ETHERTYPE.to_be_bytes());
    out.extend_from_slice(&beacon.encode());
    out
}

/// Strips the Ethernet header back off and decodes the beacon, rejecting
/// anything not carrying the beacon ethertype.
pub fn decode_beacon_frame(data: &[u8]) -> Option<Beacon> {
    if data.len() < ETH_HEADER_LEN {
        return None;
    }
    let ethertype = u16::from_be_bytes([data[12], data[13]]);
    if ethertype != BEACON_ETHERTYPE {
        return None;
    }
    Beacon::decode(&data[ETH_HEADER_LEN..])
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscoveredLink {
    pub a: PortKey,
    pub b: PortKey,
}

impl DiscoveredLink {
    /// Canonical ordering: `a` lexicographically `<=` `b`, so a link and
    /// its mirror image are always the same key (spec §3: "canonical
    /// endpoint ordering, at-most-one-per-pair").
    fn canonical(x: PortKey, y: PortKey) -> Self {
        if x <= y {
            DiscoveredLink { a: x, b: y }
        } else {
            DiscoveredLink { a: y, b: x }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    LinkDiscovered(DiscoveredLink),
    LinkBroken(DiscoveredLink),
}

struct HalfLink {
    observed_at: PortKey,
    expires: Instant,
}

/// Beacon-exchange discovery state machine. A half-link becomes a full
/// `DiscoveredLink` only once beacons have been observed flowing in both
/// directions across the same pair of ports.
pub struct LinkDiscoverer {
    interval: Duration,
    waiting: HashMap<PortKey, HalfLink>,
    links: HashMap<DiscoveredLink, Instant>,
}

impl LinkDiscoverer {
    pub fn new(interval: Duration) -> Self {
        LinkDiscoverer {
            interval,
            waiting: HashMap::new(),
            links: HashMap::new(),
        }
    }

    fn validity_deadline(&self) -> Instant {
        Instant::now() + self.interval * 2
    }

    /// Processes a beacon received at `receiver`, claiming to have been
    /// sent from `beacon.dpid`/`beacon.port_no`. `now` is passed in so
    /// tests can control time deterministically. `sender_known` must
    /// reflect whether `beacon.dpid` is a switch in this controller's own
    /// `SwitchInventory` — a neighboring domain's beacons carry the same
    /// OUI tag but never correspond to a switch we manage, which is the
    /// actual cross-domain rejection criterion (spec §4.4).
    pub fn on_beacon(&mut self, receiver: PortKey, beacon: &Beacon, now: Instant, sender_known: bool) -> Option<LinkEvent> {
        if beacon.oui != BEACON_OUI {
            tracing::warn!("rejecting beacon with foreign oui {:?}", beacon.oui);
            return None;
        }
        if !sender_known {
            tracing::warn!("rejecting beacon from unknown switch dpid {:#x}", beacon.dpid);
            return None;
        }
        let sender = (beacon.dpid, beacon.port_no);
        self.waiting.insert(sender, HalfLink { observed_at: receiver, expires: now + self.interval * 2 });

        let reverse_seen = self
            .waiting
            .get(&receiver)
            .map(|half| half.observed_at == sender)
            .unwrap_or(false);

        let link = DiscoveredLink::canonical(sender, receiver);
        if reverse_seen {
            let newly_discovered = !self.links.contains_key(&link);
            self.links.insert(link.clone(), self.validity_deadline());
            if newly_discovered {
                return Some(LinkEvent::LinkDiscovered(link));
            }
            return None;
        }

        // Not yet paired. If a full link already exists incident to
        // either endpoint but inconsistent with this observation, it is
        // stale and should be torn down.
        let stale = self
            .links
            .keys()
            .find(|l| (l.a == sender || l.b == sender || l.a == receiver || l.b == receiver) && *l != &link)
            .cloned();
        if let Some(stale) = stale {
            self.links.remove(&stale);
            return Some(LinkEvent::LinkBroken(stale));
        }
        None
    }

    /// Periodic ~interval tick: expires deadline-passed full links
    /// (emitting `LinkBroken`) and silently drops unpaired half-links.
    pub fn tick(&mut self, now: Instant) -> Vec<LinkEvent> {
        self.waiting.retain(|_, half| half.expires > now);
        let expired: Vec<DiscoveredLink> = self
            .links
            .iter()
            .filter(|(_, expiry)| **expiry <= now)
            .map(|(link, _)| link.clone())
            .collect();
        for link in &expired {
            self.links.remove(link);
        }
        expired.into_iter().map(LinkEvent::LinkBroken).collect()
    }

    /// A port going down breaks any link incident to it immediately,
    /// without waiting for the next tick.
    pub fn on_port_down(&mut self, port: PortKey) -> Vec<LinkEvent> {
        self.waiting.remove(&port);
        let affected: Vec<DiscoveredLink> = self
            .links
            .keys()
            .filter(|l| l.a == port || l.b == port)
            .cloned()
            .collect();
        for link in &affected {
            self.links.remove(link);
        }
        affected.into_iter().map(LinkEvent::LinkBroken).collect()
    }

    pub fn links(&self) -> impl Iterator<Item = &DiscoveredLink> {
        self.links.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bidirectional_beacons_promote_to_discovered_link() {
        let mut disco = LinkDiscoverer::new(Duration::from_secs(5));
        let now = Instant::now();
        let s1: PortKey = (1, 1);
        let s2: PortKey = (2, 1);

        assert!(disco.on_beacon(s2, &Beacon::new(s1.0, s1.1, None), now, true).is_none());
        let event = disco.on_beacon(s1, &Beacon::new(s2.0, s2.1, None), now, true).unwrap();
        assert!(matches!(event, LinkEvent::LinkDiscovered(_)));
        assert_eq!(disco.links().count(), 1);
    }

    #[test]
    fn one_sided_beacon_is_not_reported_discovered_within_two_intervals() {
        let mut disco = LinkDiscoverer::new(Duration::from_secs(5));
        let now = Instant::now();
        disco.on_beacon((2, 1), &Beacon::new(1, 1, None), now, true);
        let events = disco.tick(now + Duration::from_secs(9));
        assert!(events.is_empty());
        let events = disco.tick(now + Duration::from_secs(11));
        assert!(events.is_empty()); // half-link silently dropped, no link ever existed
        assert_eq!(disco.links().count(), 0);
    }

    #[test]
    fn foreign_domain_beacon_rejected() {
        let mut disco = LinkDiscoverer::new(Duration::from_secs(5));
        let foreign = Beacon { oui: [1, 2, 3], dpid: 9, port_no: 1, vlan: None };
        assert!(disco.on_beacon((1, 1), &foreign, Instant::now(), true).is_none());
    }

    #[test]
    fn unknown_switch_beacon_rejected() {
        let mut disco = LinkDiscoverer::new(Duration::from_secs(5));
        let beacon = Beacon::new(9, 1, None);
        assert!(disco.on_beacon((1, 1), &beacon, Instant::now(), false).is_none());
        assert_eq!(disco.links().count(), 0);
    }

    #[test]
    fn port_down_breaks_incident_link_immediately() {
        let mut disco = LinkDiscoverer::new(Duration::from_secs(5));
        let now = Instant::now();
        let s1: PortKey = (1, 1);
        let s2: PortKey = (2, 1);
        disco.on_beacon(s2, &Beacon::new(s1.0, s1.1, None), now, true);
        disco.on_beacon(s1, &Beacon::new(s2.0, s2.1, None), now, true);
        assert_eq!(disco.links().count(), 1);

        let events = disco.on_port_down(s1);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], LinkEvent::LinkBroken(_)));
        assert_eq!(disco.links().count(), 0);
    }

    #[test]
    fn beacon_roundtrips_through_bytes() {
        let beacon = Beacon::new(0x1234, 7, Some(42));
        let bytes = beacon.encode();
        let decoded = Beacon::decode(&bytes).unwrap();
        assert_eq!(beacon, decoded);
    }

    #[test]
    fn beacon_frame_roundtrips_through_ethernet_header() {
        let beacon = Beacon::new(0x1234, 7, None);
        let frame = encode_beacon_frame([0xaa; 6], &beacon);
        assert_eq!(decode_beacon_frame(&frame), Some(beacon));
    }

    #[test]
    fn non_beacon_ethertype_is_rejected() {
        let mut frame = encode_beacon_frame([0xaa; 6], &Beacon::new(1, 1, None));
        frame[12] = 0x08; // IPv4 ethertype
        frame[13] = 0x00;
        assert_eq!(decode_beacon_frame(&frame), None);
    }
}
