// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! FlowVerifier: the shadow flow table and its periodic reconciliation
//! pass.
//!
//! Every flow-mod this controller sends is also applied to an in-memory
//! shadow table keyed by `(table_id, priority, match)` — the same key
//! `Match`'s byte-stable hash/equality makes reliable across differently
//! ordered OXM field lists. A poll loop periodically dumps the switch's
//! real flow table via `OFPMP_FLOW` and reconciles: entries the shadow
//! expects but the switch lacks are reinstalled, entries the switch
//! carries but the shadow does not expect are logged and removed.

use crate::agent::OFAgent;
use crate::congestion::OfMsgSender;
use crate::error::CoreResult;
use sdn_persistence::{namespaces, PersistenceStore, PersistenceStoreExt};
use sdn_proto::constants::FlowModCommand;
use sdn_proto::message::{FlowMod, FlowRemoved, Message};
use sdn_proto::oxm::Match;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

pub const OFPTT_ALL: u8 = 0xff;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct ShadowKey {
    table_id: u8,
    priority: u16,
    match_: Match,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ShadowValue {
    cookie: u64,
    instructions: Vec<sdn_proto::instruction::Instruction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ShadowEntry {
    key: ShadowKey,
    value: ShadowValue,
}

#[derive(Clone)]
pub struct FlowVerifier {
    shadow: Arc<RwLock<HashMap<ShadowKey, ShadowValue>>>,
    reconcile_ordinal: Arc<AtomicU64>,
}

impl Default for FlowVerifier {
    fn default() -> Self {
        FlowVerifier { shadow: Arc::new(RwLock::new(HashMap::new())), reconcile_ordinal: Arc::new(AtomicU64::new(0)) }
    }
}

impl FlowVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a flow-mod to the shadow table per `OFPFC_*` command
    /// semantics: `Add`/`ModifyStrict`/`DeleteStrict` address a single
    /// exact `(table,priority,match)` key; `Modify`/`Delete` affect every
    /// shadow entry whose match is a non-strict superset of the command's
    /// match (spec §4.6's command table).
    pub async fn apply(&self, flow_mod: &FlowMod) {
        let mut shadow = self.shadow.write().await;
        match flow_mod.command {
            FlowModCommand::Add => {
                shadow.insert(
                    ShadowKey { table_id: flow_mod.table_id, priority: flow_mod.priority, match_: flow_mod.match_.clone() },
                    ShadowValue { cookie: flow_mod.cookie, instructions: flow_mod.instructions.clone() },
                );
            }
            FlowModCommand::ModifyStrict => {
                let key = ShadowKey { table_id: flow_mod.table_id, priority: flow_mod.priority, match_: flow_mod.match_.clone() };
                if let Some(entry) = shadow.get_mut(&key) {
                    entry.cookie = flow_mod.cookie;
                    entry.instructions = flow_mod.instructions.clone();
                }
            }
            FlowModCommand::Modify => {
                for (key, value) in shadow.iter_mut() {
                    if key.table_id == flow_mod.table_id && key.match_.is_superset_of(&flow_mod.match_) {
                        value.cookie = flow_mod.cookie;
                        value.instructions = flow_mod.instructions.clone();
                    }
                }
            }
            FlowModCommand::DeleteStrict => {
                let key = ShadowKey { table_id: flow_mod.table_id, priority: flow_mod.priority, match_: flow_mod.match_.clone() };
                shadow.remove(&key);
            }
            FlowModCommand::Delete => {
                let doomed: Vec<ShadowKey> = shadow
                    .keys()
                    .filter(|k| {
                        (flow_mod.table_id == OFPTT_ALL || k.table_id == flow_mod.table_id)
                            && k.match_.is_superset_of(&flow_mod.match_)
                    })
                    .cloned()
                    .collect();
                for key in doomed {
                    shadow.remove(&key);
                }
            }
        }
    }

    /// Applies `flow_mod` to the shadow table and sends it through the
    /// per-switch AIMD pacer. This is the single choke point every
    /// controller-issued flow-mod must pass through so the shadow table
    /// tracks controller intent rather than only what reconciliation has
    /// already observed.
    pub async fn send(&self, dpid: u64, agent: &OFAgent, sender: &OfMsgSender, flow_mod: FlowMod) -> CoreResult<()> {
        self.apply(&flow_mod).await;
        sender.send(dpid, agent, Message::FlowMod(flow_mod)).await
    }

    /// A `FlowRemoved` event from the switch retires the shadow entry. If
    /// the eviction reason is not an expected retirement (idle/hard
    /// timeout, group- or meter-delete), the controller did not ask for
    /// this flow to go away, so the original entry is re-sent rather than
    /// just logged — per the same reinstall path `reconcile` uses.
    pub async fn on_flow_removed(&self, dpid: u64, agent: &OFAgent, sender: &OfMsgSender, removed: &FlowRemoved) {
        let key = ShadowKey { table_id: removed.table_id, priority: removed.priority, match_: removed.match_.clone() };
        let removed_entry = self.shadow.write().await.remove(&key);
        let Some(value) = removed_entry else { return };
        if removed.reason.is_expected_retirement() {
            return;
        }
        warn!(
            "switch {:#x} evicted flow table={} priority={} for unexpected reason {:?}, reinstalling",
            dpid, removed.table_id, removed.priority, removed.reason
        );
        let flow_mod = FlowMod {
            cookie: value.cookie,
            cookie_mask: 0,
            table_id: key.table_id,
            command: FlowModCommand::Add,
            idle_timeout: 0,
            hard_timeout: 0,
            priority: key.priority,
            buffer_id: 0xffff_ffff,
            out_port: 0xffff_ffff,
            out_group: 0xffff_ffff,
            flags: 0,
            match_: key.match_,
            instructions: value.instructions,
        };
        if let Err(e) = self.send(dpid, agent, sender, flow_mod).await {
            warn!("switch {:#x} reinstall after unexpected eviction failed: {}", dpid, e);
        }
    }

    /// One reconciliation pass: dumps the switch's live flow table,
    /// reinstalls every shadow entry the switch is missing, removes every
    /// switch entry the shadow does not expect, and persists the
    /// resulting shadow snapshot under this switch's
    /// `flow-entries-verifier:state:<dpid>:<ordinal>` key.
    pub async fn reconcile(&self, dpid: u64, agent: &OFAgent, sender: &OfMsgSender, store: &dyn PersistenceStore) -> CoreResult<ReconcileReport> {
        let live_entries = agent.get_flow_stats(OFPTT_ALL, Match::new()).await?;
        let live: HashMap<ShadowKey, ()> = live_entries
            .iter()
            .map(|e| (ShadowKey { table_id: e.table_id, priority: e.priority, match_: e.match_.clone() }, ()))
            .collect();

        let shadow = self.shadow.read().await.clone();
        let mut reinstalled = 0u32;
        let mut removed_unexpected = 0u32;

        for (key, value) in &shadow {
            if !live.contains_key(key) {
                let flow_mod = FlowMod {
                    cookie: value.cookie,
                    cookie_mask: 0,
                    table_id: key.table_id,
                    command: FlowModCommand::Add,
                    idle_timeout: 0,
                    hard_timeout: 0,
                    priority: key.priority,
                    buffer_id: 0xffff_ffff,
                    out_port: 0xffff_ffff,
                    out_group: 0xffff_ffff,
                    flags: 0,
                    match_: key.match_.clone(),
                    instructions: value.instructions.clone(),
                };
                self.send(dpid, agent, sender, flow_mod).await?;
                reinstalled += 1;
                warn!("switch {:#x} missing shadow-tracked flow table={} priority={}, reinstalling", dpid, key.table_id, key.priority);
            }
        }

        for key in live.keys() {
            if !shadow.contains_key(key) {
                let delete = FlowMod {
                    cookie: 0,
                    cookie_mask: 0,
                    table_id: key.table_id,
                    command: FlowModCommand::DeleteStrict,
                    idle_timeout: 0,
                    hard_timeout: 0,
                    priority: key.priority,
                    buffer_id: 0xffff_ffff,
                    out_port: 0xffff_ffff,
                    out_group: 0xffff_ffff,
                    flags: 0,
                    match_: key.match_.clone(),
                    instructions: vec![],
                };
                sender.send(dpid, agent, Message::FlowMod(delete)).await?;
                removed_unexpected += 1;
                warn!("switch {:#x} carries flow table={} priority={} not tracked by the shadow table, removing", dpid, key.table_id, key.priority);
            }
        }

        self.persist_snapshot(dpid, store).await;

        Ok(ReconcileReport { reinstalled, removed_unexpected })
    }

    /// Writes the current shadow table under this switch's next ordinal
    /// key, then records that ordinal as the latest for `dpid` in the
    /// shared states list so a loader knows which snapshot to read back
    /// per switch without scanning every ordinal.
    async fn persist_snapshot(&self, dpid: u64, store: &dyn PersistenceStore) {
        let ordinal = self.reconcile_ordinal.fetch_add(1, Ordering::Relaxed);
        let snapshot: Vec<ShadowEntry> = self
            .shadow
            .read()
            .await
            .iter()
            .map(|(key, value)| ShadowEntry { key: key.clone(), value: value.clone() })
            .collect();
        if let Err(e) = store.put_json(&namespaces::flow_verifier_state(dpid, ordinal), &snapshot).await {
            warn!("failed to persist flow-verifier shadow snapshot for {:#x}: {}", dpid, e);
            return;
        }

        let mut states_list: Vec<(u64, u64)> =
            store.get_json(namespaces::FLOW_VERIFIER_STATES_LIST).await.ok().flatten().unwrap_or_default();
        match states_list.iter_mut().find(|(d, _)| *d == dpid) {
            Some(entry) => entry.1 = ordinal,
            None => states_list.push((dpid, ordinal)),
        }
        if let Err(e) = store.put_json(namespaces::FLOW_VERIFIER_STATES_LIST, &states_list).await {
            warn!("failed to record flow-verifier snapshot ordinal for {:#x}: {}", dpid, e);
        }
    }

    pub async fn len(&self) -> usize {
        self.shadow.read().await.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub reinstalled: u32,
    pub removed_unexpected: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OfMsgSenderConfig;
    use sdn_proto::oxm::OxmField;
    use std::collections::HashMap as StdHashMap;
    use std::time::Duration;

    /// Local in-memory stand-in so this module's tests don't depend on
    /// `sdn-persistence`'s own `#[cfg(test)]`-gated mock, which is not
    /// compiled when that crate is pulled in as an ordinary dependency.
    #[derive(Default)]
    struct MockStore {
        data: tokio::sync::Mutex<StdHashMap<String, String>>,
    }

    impl MockStore {
        fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait::async_trait]
    impl PersistenceStore for MockStore {
        async fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
            self.data.lock().await.insert(key.to_string(), value.to_string());
            Ok(())
        }
        async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            Ok(self.data.lock().await.get(key).cloned())
        }
        async fn delete(&self, key: &str) -> anyhow::Result<()> {
            self.data.lock().await.remove(key);
            Ok(())
        }
        async fn keys(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
            Ok(self.data.lock().await.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
        }
        async fn clear(&self) -> anyhow::Result<()> {
            self.data.lock().await.clear();
            Ok(())
        }
        async fn setup_master_role(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn setup_slave_of(&self, _address: &str, _port: u16) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn test_sender_config() -> OfMsgSenderConfig {
        OfMsgSenderConfig { poll_interval_ms: 5, wait_interval_ms: 50, window_floor: 4, additive_ratio: 3, multiplicative_ratio: 2 }
    }

    fn make_agent() -> (OFAgent, tokio::sync::mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = tokio::sync::mpsc::channel(32);
        (OFAgent::new(1, tx, Duration::from_millis(200)), rx)
    }

    fn eth_type_field(value: u16) -> OxmField {
        OxmField { oxm_class: 0x8000, oxm_field: 5, hasmask: false, value: value.to_be_bytes().to_vec(), mask: None }
    }

    fn flow_mod(command: FlowModCommand, priority: u16, match_: Match) -> FlowMod {
        FlowMod {
            cookie: 1,
            cookie_mask: 0,
            table_id: 0,
            command,
            idle_timeout: 0,
            hard_timeout: 0,
            priority,
            buffer_id: 0xffff_ffff,
            out_port: 0xffff_ffff,
            out_group: 0xffff_ffff,
            flags: 0,
            match_,
            instructions: vec![],
        }
    }

    #[tokio::test]
    async fn add_then_delete_strict_round_trips() {
        let verifier = FlowVerifier::new();
        let match_ = Match::new().with_field(eth_type_field(0x0800)).canonicalize();
        verifier.apply(&flow_mod(FlowModCommand::Add, 100, match_.clone())).await;
        assert_eq!(verifier.len().await, 1);
        verifier.apply(&flow_mod(FlowModCommand::DeleteStrict, 100, match_)).await;
        assert_eq!(verifier.len().await, 0);
    }

    #[tokio::test]
    async fn non_strict_delete_removes_superset_matches() {
        let verifier = FlowVerifier::new();
        let specific = Match::new().with_field(eth_type_field(0x0800)).canonicalize();
        verifier.apply(&flow_mod(FlowModCommand::Add, 100, specific)).await;
        assert_eq!(verifier.len().await, 1);

        let wildcard = Match::new();
        verifier.apply(&flow_mod(FlowModCommand::Delete, 0, wildcard)).await;
        assert_eq!(verifier.len().await, 0);
    }

    fn removed_with_reason(match_: Match, reason: sdn_proto::constants::FlowRemovedReason) -> FlowRemoved {
        FlowRemoved {
            cookie: 1,
            priority: 100,
            reason,
            table_id: 0,
            duration_sec: 10,
            duration_nsec: 0,
            idle_timeout: 5,
            hard_timeout: 0,
            packet_count: 0,
            byte_count: 0,
            match_,
        }
    }

    #[tokio::test]
    async fn flow_removed_retires_shadow_entry_on_expected_reason() {
        let verifier = FlowVerifier::new();
        let (agent, _rx) = make_agent();
        let sender = OfMsgSender::new(test_sender_config());
        let match_ = Match::new().with_field(eth_type_field(0x0800)).canonicalize();
        verifier.apply(&flow_mod(FlowModCommand::Add, 100, match_.clone())).await;

        let removed = removed_with_reason(match_, sdn_proto::constants::FlowRemovedReason::IdleTimeout);
        verifier.on_flow_removed(1, &agent, &sender, &removed).await;
        assert_eq!(verifier.len().await, 0);
    }

    #[tokio::test]
    async fn flow_removed_reinstalls_on_unexpected_reason() {
        let verifier = FlowVerifier::new();
        let (agent, mut rx) = make_agent();
        let sender = OfMsgSender::new(test_sender_config());
        let match_ = Match::new().with_field(eth_type_field(0x0800)).canonicalize();
        verifier.apply(&flow_mod(FlowModCommand::Add, 100, match_.clone())).await;

        let removed = removed_with_reason(match_, sdn_proto::constants::FlowRemovedReason::Delete);
        verifier.on_flow_removed(1, &agent, &sender, &removed).await;

        // The reinstall goes back out over the wire...
        let frame = rx.recv().await.unwrap();
        let (_, message) = sdn_proto::decode_message(&frame).unwrap();
        assert!(matches!(message, sdn_proto::message::Message::FlowMod(_)));
        // ...and the shadow table reflects the entry as present again.
        assert_eq!(verifier.len().await, 1);
    }

    #[tokio::test]
    async fn send_applies_to_shadow_before_writing_to_wire() {
        let verifier = FlowVerifier::new();
        let (agent, mut rx) = make_agent();
        let sender = OfMsgSender::new(test_sender_config());
        let match_ = Match::new().with_field(eth_type_field(0x0800)).canonicalize();
        verifier.send(1, &agent, &sender, flow_mod(FlowModCommand::Add, 100, match_)).await.unwrap();
        assert_eq!(verifier.len().await, 1);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn reconcile_persists_shadow_snapshot() {
        let verifier = FlowVerifier::new();
        let store = MockStore::new();
        let match_ = Match::new().with_field(eth_type_field(0x0800)).canonicalize();
        verifier.apply(&flow_mod(FlowModCommand::Add, 100, match_)).await;

        verifier.persist_snapshot(1, &store).await;

        let states_list: Vec<(u64, u64)> =
            store.get_json(namespaces::FLOW_VERIFIER_STATES_LIST).await.unwrap().unwrap();
        assert_eq!(states_list, vec![(1, 0)]);
        let snapshot: Vec<ShadowEntry> =
            store.get_json(&namespaces::flow_verifier_state(1, 0)).await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
    }
}
