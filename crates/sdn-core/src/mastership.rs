// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MastershipController: the active/standby cluster state machine that
//! decides which node's `ConnectionServer` gets to push flow-mods.
//!
//! `push_role`/`monitor_roles` are grounded on `agent.rs::OFAgent::role_request`
//! and the OpenFlow role-request/reply semantics it wraps (spec §4.7/§7);
//! the "cheap handle" clonability follows `server.rs::ConnectionServer`
//! and `congestion.rs::OfMsgSender`'s own `#[derive(Clone)]` shape, needed
//! here so [`ClusterEventHandler::on_event`] — a synchronous method,
//! matching `inventory.rs::InventoryObserver`'s shape — can clone `self`
//! into a spawned task rather than being `async fn` itself.

use crate::config::{NodeStatus, RecoveryManagerConfig};
use crate::dpid_guard::DpidGuard;
use crate::error::{CoreError, CoreResult};
use crate::heartbeat::{ClusterEvent, ClusterEventHandler};
use crate::server::ConnectionServer;
use sdn_persistence::{namespaces, PersistenceStore, PersistenceStoreExt};
use sdn_proto::OfpControllerRole;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// A switch that answers a `NoChange` role request with `Equal` more than
/// this many times in a row is treated as stuck and disconnected — spec
/// §4.7's "role equal refusal" error policy.
const MAX_TIMES_MEET_EQUAL: u32 = 1;

#[derive(Clone)]
pub struct MastershipController {
    config: RecoveryManagerConfig,
    server: ConnectionServer,
    dpid_guard: Arc<DpidGuard>,
    store: Arc<dyn PersistenceStore>,
    role: Arc<RwLock<NodeStatus>>,
    generation_id: Arc<AtomicU64>,
    equal_refusals: Arc<RwLock<HashMap<u64, u32>>>,
    /// The primary's datastore endpoint last applied via
    /// `follow_primary_datastore`, learned from a `ParametersUpdate`
    /// heartbeat. Re-applied on every `PrimaryHeartbeat` while backup as a
    /// convergence safety net against the local datastore losing its
    /// replica configuration between heartbeats.
    primary_datastore: Arc<RwLock<Option<(String, u16)>>>,
}

impl MastershipController {
    pub fn new(
        config: RecoveryManagerConfig,
        server: ConnectionServer,
        dpid_guard: Arc<DpidGuard>,
        store: Arc<dyn PersistenceStore>,
    ) -> Self {
        let initial = config.status;
        MastershipController {
            config,
            server,
            dpid_guard,
            store,
            role: Arc::new(RwLock::new(initial)),
            generation_id: Arc::new(AtomicU64::new(0)),
            equal_refusals: Arc::new(RwLock::new(HashMap::new())),
            primary_datastore: Arc::new(RwLock::new(None)),
        }
    }

    /// A shared handle to this controller's current cluster role, suitable
    /// for passing into [`crate::heartbeat::HeartbeatService::run`] so it
    /// can branch its own timers on the same role this controller holds.
    pub fn role_handle(&self) -> Arc<RwLock<NodeStatus>> {
        self.role.clone()
    }

    pub async fn current_role(&self) -> NodeStatus {
        *self.role.read().await
    }

    fn switch_role_for(status: NodeStatus) -> Option<OfpControllerRole> {
        match status {
            NodeStatus::Primary => Some(OfpControllerRole::Master),
            NodeStatus::Backup => Some(OfpControllerRole::Slave),
            NodeStatus::Recovery => None,
        }
    }

    /// Pushes `role` to every connected switch. Per spec §4.7, the
    /// generation id is not locally invented: it is learned from each
    /// switch by sending a `NoChange` role request first and reading back
    /// the generation id the switch itself reports, then that learned
    /// value is used for the actual `Master`/`Slave` push. If a `Master`
    /// push comes back `Slave` — another controller already holds a
    /// higher generation id — the whole cluster demotes rather than
    /// leaving two controllers both believing themselves master.
    async fn push_role(&self, role: OfpControllerRole) {
        for dpid in self.server.connected_dpids().await {
            let Some(agent) = self.server.agent_for(dpid).await else { continue };
            let generation_id = match agent.role_request(OfpControllerRole::NoChange, 0).await {
                Ok(reply) => reply.generation_id,
                Err(e) => {
                    warn!("generation-id learn for {:#x} failed: {}", dpid, e);
                    continue;
                }
            };
            self.generation_id.store(generation_id, Ordering::Relaxed);
            match agent.role_request(role, generation_id).await {
                Ok(reply) => {
                    if role == OfpControllerRole::Master && reply.role != OfpControllerRole::Master {
                        warn!(
                            "switch {:#x} refused master role (replied {:?}), demoting cluster",
                            dpid, reply.role
                        );
                        self.demote_cluster().await;
                        return;
                    }
                }
                Err(e) => warn!("role request to {:#x} failed: {}", dpid, e),
            }
        }
    }

    async fn demote_cluster(&self) {
        *self.role.write().await = NodeStatus::Backup;
        self.push_role(OfpControllerRole::Slave).await;
    }

    /// Primary-only liveness check: a switch that keeps answering
    /// `NoChange` with `Equal` instead of `Master` is de-allowlisted and
    /// disconnected after [`MAX_TIMES_MEET_EQUAL`] consecutive refusals.
    pub async fn monitor_roles(&self) {
        if self.current_role().await != NodeStatus::Primary {
            return;
        }
        for dpid in self.server.connected_dpids().await {
            let Some(agent) = self.server.agent_for(dpid).await else { continue };
            let generation_id = self.generation_id.load(Ordering::Relaxed);
            match agent.role_request(OfpControllerRole::NoChange, generation_id).await {
                Ok(reply) if reply.role == OfpControllerRole::Equal => {
                    let mut refusals = self.equal_refusals.write().await;
                    let count = refusals.entry(dpid).or_insert(0);
                    *count += 1;
                    if *count > MAX_TIMES_MEET_EQUAL {
                        warn!("switch {:#x} stuck at equal role, disconnecting", dpid);
                        refusals.remove(&dpid);
                        drop(refusals);
                        self.dpid_guard.deny(dpid);
                        self.server.disconnect(dpid).await;
                    }
                }
                Ok(_) => {
                    self.equal_refusals.write().await.remove(&dpid);
                }
                Err(e) => warn!("role monitor request to {:#x} failed: {}", dpid, e),
            }
        }
    }

    /// Transitions to `status`, pushing the matching OpenFlow role to
    /// every connected switch and, when becoming primary, promoting this
    /// node's datastore.
    pub async fn start(&self, status: NodeStatus) -> CoreResult<()> {
        *self.role.write().await = status;
        info!("mastership transition: node {} is now {:?}", self.config.id, status);
        match Self::switch_role_for(status) {
            Some(role) => self.push_role(role).await,
            None => return Ok(()),
        }
        if status == NodeStatus::Primary {
            self.store
                .setup_master_role()
                .await
                .map_err(|e| CoreError::Persistence(e.to_string()))?;
        }
        Ok(())
    }

    /// Configures this node's datastore as a replica of the current
    /// primary's, called once a backup has located its peer (e.g. via a
    /// `ParametersUpdate` heartbeat carrying the primary's datastore
    /// endpoint).
    pub async fn follow_primary_datastore(&self, primary_address: &str, primary_port: u16) -> CoreResult<()> {
        self.store
            .setup_slave_of(primary_address, primary_port)
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))
    }

    /// Leaves the `Recovery` role once this node has rejoined the cluster.
    /// Promotes straight to `Primary` when `all_switches_seen` and this
    /// node's configured role is `Primary`; otherwise settles as `Backup`
    /// and waits for a primary-missing event.
    pub async fn complete_recovery(&self, all_switches_seen: bool) -> CoreResult<()> {
        if self.current_role().await != NodeStatus::Recovery {
            return Ok(());
        }
        self.start(NodeStatus::Backup).await?;
        if all_switches_seen && self.config.status == NodeStatus::Primary {
            self.start(NodeStatus::Primary).await?;
        }
        Ok(())
    }

    /// Persists the currently connected DPID set so a recovering peer can
    /// tell whether it has rediscovered every switch it saw before a crash.
    pub async fn record_seen_switches(&self) -> CoreResult<()> {
        let dpids = self.server.connected_dpids().await;
        self.store
            .put_json(namespaces::RECOVERY_SWITCHES, &dpids)
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))
    }

    pub async fn recorded_seen_switches(&self) -> CoreResult<Vec<u64>> {
        self.store
            .get_json(namespaces::RECOVERY_SWITCHES)
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))
            .map(|v| v.unwrap_or_default())
    }

    /// Applies (or re-applies) `address:port` as the replica target via
    /// `follow_primary_datastore`, caching it so a later `PrimaryHeartbeat`
    /// can re-assert it without needing another `ParametersUpdate`.
    async fn apply_primary_datastore(&self, address: &str, port: u16) {
        if let Err(e) = self.follow_primary_datastore(address, port).await {
            warn!("failed to follow primary datastore {}:{}: {}", address, port, e);
            return;
        }
        *self.primary_datastore.write().await = Some((address.to_string(), port));
    }

    async fn handle_cluster_event(&self, event: ClusterEvent) {
        match event {
            ClusterEvent::PrimaryMissing => {
                if self.current_role().await == NodeStatus::Backup {
                    warn!("primary heartbeat missing, promoting {} to primary", self.config.id);
                    if let Err(e) = self.start(NodeStatus::Primary).await {
                        warn!("promotion to primary failed: {}", e);
                    }
                }
            }
            ClusterEvent::BackupMissing => {
                if self.current_role().await == NodeStatus::Primary {
                    warn!("backup {} appears unreachable, marking inactive", self.config.id);
                }
            }
            ClusterEvent::ParametersUpdate { datastore_endpoint, .. } => {
                if self.current_role().await != NodeStatus::Backup {
                    return;
                }
                match parse_endpoint(&datastore_endpoint) {
                    Some((address, port)) => self.apply_primary_datastore(&address, port).await,
                    None => warn!("malformed datastore endpoint {:?} in parameters-update", datastore_endpoint),
                }
            }
            ClusterEvent::PrimaryHeartbeat => {
                if self.current_role().await != NodeStatus::Backup {
                    return;
                }
                let cached = self.primary_datastore.read().await.clone();
                if let Some((address, port)) = cached {
                    self.apply_primary_datastore(&address, port).await;
                }
            }
            ClusterEvent::BackupReply => {}
        }
    }

    /// One recovery-mode bookkeeping tick, called from the controller's
    /// role-monitoring loop: a primary keeps its seen-switches snapshot
    /// fresh for any peer that later boots into recovery, and a node
    /// that is itself recovering checks whether it has rediscovered every
    /// switch it saw before restarting.
    pub async fn recovery_tick(&self) -> CoreResult<()> {
        match self.current_role().await {
            NodeStatus::Primary => self.record_seen_switches().await,
            NodeStatus::Recovery => {
                let recorded = self.recorded_seen_switches().await?;
                let connected: std::collections::HashSet<u64> =
                    self.server.connected_dpids().await.into_iter().collect();
                let all_seen = !recorded.is_empty() && recorded.iter().all(|dpid| connected.contains(dpid));
                if all_seen {
                    info!("node {} rediscovered every switch seen before recovery", self.config.id);
                }
                self.complete_recovery(all_seen).await
            }
            NodeStatus::Backup => Ok(()),
        }
    }
}

/// Splits a `"host:port"` datastore endpoint, as carried by
/// `ClusterEvent::ParametersUpdate`, into its address and port parts.
fn parse_endpoint(endpoint: &str) -> Option<(String, u16)> {
    let (host, port) = endpoint.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    Some((host.to_string(), port))
}

impl ClusterEventHandler for MastershipController {
    fn on_event(&self, event: ClusterEvent) {
        let this = self.clone();
        tokio::spawn(async move {
            this.handle_cluster_event(event).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OfServerConfig;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashMap as StdHashMap;
    use tokio::sync::Mutex as AsyncMutex;

    /// Local in-memory stand-in so this module's tests don't depend on
    /// `sdn-persistence`'s own `#[cfg(test)]`-gated mock, which is not
    /// compiled when that crate is pulled in as an ordinary dependency.
    #[derive(Default)]
    struct MockStore {
        data: AsyncMutex<StdHashMap<String, String>>,
        slave_of_calls: std::sync::atomic::AtomicU32,
        last_slave_of: AsyncMutex<Option<(String, u16)>>,
    }

    impl MockStore {
        fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl PersistenceStore for MockStore {
        async fn put(&self, key: &str, value: &str) -> Result<()> {
            self.data.lock().await.insert(key.to_string(), value.to_string());
            Ok(())
        }
        async fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.data.lock().await.get(key).cloned())
        }
        async fn delete(&self, key: &str) -> Result<()> {
            self.data.lock().await.remove(key);
            Ok(())
        }
        async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
            Ok(self.data.lock().await.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
        }
        async fn clear(&self) -> Result<()> {
            self.data.lock().await.clear();
            Ok(())
        }
        async fn setup_master_role(&self) -> Result<()> {
            Ok(())
        }
        async fn setup_slave_of(&self, address: &str, port: u16) -> Result<()> {
            self.slave_of_calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            *self.last_slave_of.lock().await = Some((address.to_string(), port));
            Ok(())
        }
    }

    fn controller() -> MastershipController {
        let config = RecoveryManagerConfig { status: NodeStatus::Primary, ..Default::default() };
        let server = ConnectionServer::new(OfServerConfig::default(), Arc::new(DpidGuard::new(&Default::default())));
        MastershipController::new(config, server, Arc::new(DpidGuard::new(&Default::default())), Arc::new(MockStore::new()))
    }

    #[tokio::test]
    async fn starts_at_configured_role() {
        let controller = controller();
        assert_eq!(controller.current_role().await, NodeStatus::Primary);
    }

    #[tokio::test]
    async fn start_primary_promotes_datastore() {
        let controller = controller();
        controller.start(NodeStatus::Primary).await.unwrap();
        assert_eq!(controller.current_role().await, NodeStatus::Primary);
    }

    #[tokio::test]
    async fn complete_recovery_noop_unless_recovering() {
        let controller = controller();
        controller.complete_recovery(true).await.unwrap();
        assert_eq!(controller.current_role().await, NodeStatus::Primary);
    }

    #[tokio::test]
    async fn record_and_recall_seen_switches_round_trips() {
        let controller = controller();
        controller.record_seen_switches().await.unwrap();
        let seen = controller.recorded_seen_switches().await.unwrap();
        assert!(seen.is_empty());
    }

    #[tokio::test]
    async fn primary_missing_promotes_backup() {
        let config = RecoveryManagerConfig { status: NodeStatus::Backup, ..Default::default() };
        let server = ConnectionServer::new(OfServerConfig::default(), Arc::new(DpidGuard::new(&Default::default())));
        let controller = MastershipController::new(
            config,
            server,
            Arc::new(DpidGuard::new(&Default::default())),
            Arc::new(MockStore::new()),
        );
        *controller.role.write().await = NodeStatus::Backup;
        controller.handle_cluster_event(ClusterEvent::PrimaryMissing).await;
        assert_eq!(controller.current_role().await, NodeStatus::Primary);
    }

    fn backup_controller_with_store() -> (MastershipController, Arc<MockStore>) {
        let config = RecoveryManagerConfig { status: NodeStatus::Backup, ..Default::default() };
        let server = ConnectionServer::new(OfServerConfig::default(), Arc::new(DpidGuard::new(&Default::default())));
        let store = Arc::new(MockStore::new());
        let controller = MastershipController::new(
            config,
            server,
            Arc::new(DpidGuard::new(&Default::default())),
            store.clone(),
        );
        (controller, store)
    }

    #[tokio::test]
    async fn parameters_update_while_backup_follows_primary_datastore() {
        let (controller, store) = backup_controller_with_store();
        controller
            .handle_cluster_event(ClusterEvent::ParametersUpdate {
                node_id: "peer".into(),
                heartbeat_endpoint: "10.0.0.2:5555".into(),
                openflow_endpoint: "10.0.0.2:6653".into(),
                datastore_endpoint: "10.0.0.2:6379".into(),
            })
            .await;
        assert_eq!(store.slave_of_calls.load(Ordering::Relaxed), 1);
        assert_eq!(*store.last_slave_of.lock().await, Some(("10.0.0.2".to_string(), 6379)));
        assert_eq!(*controller.primary_datastore.read().await, Some(("10.0.0.2".to_string(), 6379)));
    }

    #[tokio::test]
    async fn primary_heartbeat_reapplies_cached_datastore() {
        let (controller, store) = backup_controller_with_store();
        controller
            .handle_cluster_event(ClusterEvent::ParametersUpdate {
                node_id: "peer".into(),
                heartbeat_endpoint: "10.0.0.2:5555".into(),
                openflow_endpoint: "10.0.0.2:6653".into(),
                datastore_endpoint: "10.0.0.2:6379".into(),
            })
            .await;
        controller.handle_cluster_event(ClusterEvent::PrimaryHeartbeat).await;
        assert_eq!(store.slave_of_calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn primary_heartbeat_before_any_parameters_update_is_noop() {
        let (controller, store) = backup_controller_with_store();
        controller.handle_cluster_event(ClusterEvent::PrimaryHeartbeat).await;
        assert_eq!(store.slave_of_calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn recovery_tick_promotes_once_all_seen_switches_reconnect() {
        let config = RecoveryManagerConfig { status: NodeStatus::Primary, ..Default::default() };
        let server = ConnectionServer::new(OfServerConfig::default(), Arc::new(DpidGuard::new(&Default::default())));
        let store = Arc::new(MockStore::new());
        store.put_json(namespaces::RECOVERY_SWITCHES, &Vec::<u64>::new()).await.unwrap();
        let controller = MastershipController::new(
            config,
            server,
            Arc::new(DpidGuard::new(&Default::default())),
            store,
        );
        *controller.role.write().await = NodeStatus::Recovery;
        controller.recovery_tick().await.unwrap();
        // No switches were ever recorded, so there is nothing to confirm
        // and recovery must not complete yet.
        assert_eq!(controller.current_role().await, NodeStatus::Recovery);
    }

    #[test]
    fn parse_endpoint_splits_host_and_port() {
        assert_eq!(parse_endpoint("10.0.0.2:6379"), Some(("10.0.0.2".to_string(), 6379)));
        assert_eq!(parse_endpoint("not-an-endpoint"), None);
        assert_eq!(parse_endpoint("host:notaport"), None);
    }
}
