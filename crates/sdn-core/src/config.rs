// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Controller configuration, loaded from the `--conf` JSON file and
//! overridable by CLI flags. Mirrors the recognized key groups in the
//! configuration-file surface: `of-server`, `dpid-checker`,
//! `link-discovery`, `flow-entries-verifier`, `ofmsg-sender`,
//! `recovery-manager`, `database-connector`.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfServerConfig {
    #[serde(default = "default_bind_address")]
    pub address: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_nthreads")]
    pub nthreads: usize,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub ctl_cert: Option<String>,
    #[serde(default)]
    pub ctl_privkey: Option<String>,
    #[serde(default)]
    pub cacert: Option<String>,
    #[serde(default = "default_echo_interval")]
    pub echo_interval_secs: u64,
    #[serde(default = "default_echo_attempts")]
    pub echo_attempts: u32,
    #[serde(default = "default_true")]
    pub liveness_check: bool,
    #[serde(default)]
    pub limiter: bool,
    #[serde(default = "default_max_pps")]
    pub max_pps: u32,
}

fn default_bind_address() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}
fn default_port() -> u16 {
    6633
}
fn default_nthreads() -> usize {
    4
}
fn default_echo_interval() -> u64 {
    10
}
fn default_echo_attempts() -> u32 {
    3
}
fn default_true() -> bool {
    true
}
fn default_max_pps() -> u32 {
    1000
}

impl Default for OfServerConfig {
    fn default() -> Self {
        OfServerConfig {
            address: default_bind_address(),
            port: default_port(),
            nthreads: default_nthreads(),
            secure: false,
            ctl_cert: None,
            ctl_privkey: None,
            cacert: None,
            echo_interval_secs: default_echo_interval(),
            echo_attempts: default_echo_attempts(),
            liveness_check: true,
            limiter: false,
            max_pps: default_max_pps(),
        }
    }
}

impl OfServerConfig {
    pub fn echo_interval(&self) -> Duration {
        Duration::from_secs(self.echo_interval_secs)
    }
}

/// Role class assigned to an allowlisted DPID; informational metadata
/// consulted by higher-level callers, not enforced by `DpidGuard` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DpidRoleClass {
    Access,
    Distribution,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DpidCheckerConfig {
    #[serde(default = "default_dpid_format")]
    pub dpid_format: String,
    /// Access-role allowlist.
    #[serde(rename = "AR", default)]
    pub access: Vec<u64>,
    /// Distribution-role allowlist.
    #[serde(rename = "DR", default)]
    pub distribution: Vec<u64>,
}

fn default_dpid_format() -> String {
    "hex".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkDiscoveryConfig {
    #[serde(default = "default_link_discovery_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_link_discovery_queue")]
    pub queue: usize,
}

fn default_link_discovery_interval() -> u64 {
    5
}
fn default_link_discovery_queue() -> usize {
    1000
}

impl Default for LinkDiscoveryConfig {
    fn default() -> Self {
        LinkDiscoveryConfig {
            poll_interval_secs: default_link_discovery_interval(),
            queue: default_link_discovery_queue(),
        }
    }
}

impl LinkDiscoveryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowVerifierConfig {
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_verifier_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_verifier_poll_interval() -> u64 {
    30
}

impl Default for FlowVerifierConfig {
    fn default() -> Self {
        FlowVerifierConfig {
            active: true,
            poll_interval_secs: default_verifier_poll_interval(),
        }
    }
}

impl FlowVerifierConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// How often queued route triggers (broken-path detection, flap
    /// debounce) are re-evaluated against the current link graph.
    #[serde(default = "default_topology_trigger_interval")]
    pub trigger_poll_interval_secs: u64,
    #[serde(default = "default_flap_debounce")]
    pub flap_debounce_secs: u64,
}

fn default_topology_trigger_interval() -> u64 {
    2
}
fn default_flap_debounce() -> u64 {
    10
}

impl Default for TopologyConfig {
    fn default() -> Self {
        TopologyConfig {
            trigger_poll_interval_secs: default_topology_trigger_interval(),
            flap_debounce_secs: default_flap_debounce(),
        }
    }
}

impl TopologyConfig {
    pub fn trigger_poll_interval(&self) -> Duration {
        Duration::from_secs(self.trigger_poll_interval_secs)
    }
    pub fn flap_debounce(&self) -> Duration {
        Duration::from_secs(self.flap_debounce_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfMsgSenderConfig {
    #[serde(default = "default_ofmsg_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_ofmsg_wait_interval")]
    pub wait_interval_ms: u64,
    /// AIMD window floor — the pacer never shrinks below this many
    /// in-flight messages even under sustained congestion.
    #[serde(default = "default_window_floor")]
    pub window_floor: u32,
    /// Additive increase applied to the window on every barrier ack
    /// received before `wait_interval_ms` elapses.
    #[serde(default = "default_additive_ratio")]
    pub additive_ratio: u32,
    /// Multiplicative decrease divisor applied to the window when a
    /// barrier ack is not observed within `wait_interval_ms`.
    #[serde(default = "default_multiplicative_ratio")]
    pub multiplicative_ratio: u32,
}

fn default_ofmsg_poll_interval() -> u64 {
    50
}
fn default_ofmsg_wait_interval() -> u64 {
    5000
}
fn default_window_floor() -> u32 {
    20
}
fn default_additive_ratio() -> u32 {
    5
}
fn default_multiplicative_ratio() -> u32 {
    2
}

impl Default for OfMsgSenderConfig {
    fn default() -> Self {
        OfMsgSenderConfig {
            poll_interval_ms: default_ofmsg_poll_interval(),
            wait_interval_ms: default_ofmsg_wait_interval(),
            window_floor: default_window_floor(),
            additive_ratio: default_additive_ratio(),
            multiplicative_ratio: default_multiplicative_ratio(),
        }
    }
}

impl OfMsgSenderConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatMode {
    Unicast,
    Multicast,
    Broadcast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Primary,
    Backup,
    Recovery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryManagerConfig {
    pub id: String,
    #[serde(default = "default_node_status")]
    pub status: NodeStatus,
    #[serde(default = "default_hb_mode")]
    pub hb_mode: HeartbeatMode,
    #[serde(default = "default_hb_address")]
    pub hb_address_local: IpAddr,
    #[serde(default = "default_hb_address")]
    pub hb_address_remote: IpAddr,
    #[serde(default = "default_hb_port")]
    pub hb_port_local: u16,
    #[serde(default = "default_hb_port")]
    pub hb_port_remote: u16,
    #[serde(default = "default_hb_interval")]
    pub hb_interval_ms: u64,
    #[serde(default = "default_primary_dead_interval")]
    pub hb_primary_dead_interval_ms: u64,
    #[serde(default = "default_backup_dead_interval")]
    pub hb_backup_dead_interval_ms: u64,
    #[serde(default = "default_primary_waiting_interval")]
    pub hb_primary_waiting_interval_ms: u64,
    #[serde(default = "default_role_monitoring_interval")]
    pub role_monitoring_interval_ms: u64,
    #[serde(default = "default_recovery_waiting_seconds")]
    pub recovery_waiting_seconds: u64,
}

fn default_node_status() -> NodeStatus {
    NodeStatus::Recovery
}
fn default_hb_mode() -> HeartbeatMode {
    HeartbeatMode::Unicast
}
fn default_hb_address() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}
fn default_hb_port() -> u16 {
    30303
}
fn default_hb_interval() -> u64 {
    1000
}
fn default_primary_dead_interval() -> u64 {
    3000
}
fn default_backup_dead_interval() -> u64 {
    3000
}
fn default_primary_waiting_interval() -> u64 {
    5000
}
fn default_role_monitoring_interval() -> u64 {
    1000
}
fn default_recovery_waiting_seconds() -> u64 {
    30
}

impl Default for RecoveryManagerConfig {
    fn default() -> Self {
        RecoveryManagerConfig {
            id: "node-1".to_string(),
            status: default_node_status(),
            hb_mode: default_hb_mode(),
            hb_address_local: default_hb_address(),
            hb_address_remote: default_hb_address(),
            hb_port_local: default_hb_port(),
            hb_port_remote: default_hb_port(),
            hb_interval_ms: default_hb_interval(),
            hb_primary_dead_interval_ms: default_primary_dead_interval(),
            hb_backup_dead_interval_ms: default_backup_dead_interval(),
            hb_primary_waiting_interval_ms: default_primary_waiting_interval(),
            role_monitoring_interval_ms: default_role_monitoring_interval(),
            recovery_waiting_seconds: default_recovery_waiting_seconds(),
        }
    }
}

impl RecoveryManagerConfig {
    pub fn hb_interval(&self) -> Duration {
        Duration::from_millis(self.hb_interval_ms)
    }
    pub fn primary_dead_interval(&self) -> Duration {
        Duration::from_millis(self.hb_primary_dead_interval_ms)
    }
    pub fn backup_dead_interval(&self) -> Duration {
        Duration::from_millis(self.hb_backup_dead_interval_ms)
    }
    pub fn primary_waiting_interval(&self) -> Duration {
        Duration::from_millis(self.hb_primary_waiting_interval_ms)
    }
    pub fn role_monitoring_interval(&self) -> Duration {
        Duration::from_millis(self.role_monitoring_interval_ms)
    }
    pub fn recovery_waiting(&self) -> Duration {
        Duration::from_secs(self.recovery_waiting_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConnectorConfig {
    #[serde(default = "default_db_address")]
    pub db_address: String,
    #[serde(default = "default_db_port")]
    pub db_port: u16,
}

fn default_db_address() -> String {
    "127.0.0.1".to_string()
}
fn default_db_port() -> u16 {
    6379
}

impl Default for DatabaseConnectorConfig {
    fn default() -> Self {
        DatabaseConnectorConfig {
            db_address: default_db_address(),
            db_port: default_db_port(),
        }
    }
}

/// Top-level controller configuration, loaded from `--conf` (default
/// `network-settings.json`) and merged over these defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "of-server", default)]
    pub of_server: OfServerConfig,
    #[serde(rename = "dpid-checker", default)]
    pub dpid_checker: DpidCheckerConfig,
    #[serde(rename = "link-discovery", default)]
    pub link_discovery: LinkDiscoveryConfig,
    #[serde(rename = "flow-entries-verifier", default)]
    pub flow_entries_verifier: FlowVerifierConfig,
    #[serde(default)]
    pub topology: TopologyConfig,
    #[serde(rename = "ofmsg-sender", default)]
    pub ofmsg_sender: OfMsgSenderConfig,
    #[serde(rename = "recovery-manager", default)]
    pub recovery_manager: RecoveryManagerConfig,
    #[serde(rename = "database-connector", default)]
    pub database_connector: DatabaseConnectorConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.of_server.port == 0 {
            return Err(ConfigError::InvalidValue("of-server.port cannot be 0".into()));
        }
        if self.of_server.secure
            && (self.of_server.ctl_cert.is_none() || self.of_server.ctl_privkey.is_none())
        {
            return Err(ConfigError::InvalidValue(
                "of-server.ctl-cert and ctl-privkey required when secure".into(),
            ));
        }
        if self.flow_entries_verifier.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "flow-entries-verifier.poll-interval cannot be 0".into(),
            ));
        }
        if self.ofmsg_sender.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "ofmsg-sender.poll-interval cannot be 0".into(),
            ));
        }
        if self.topology.trigger_poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "topology.trigger-poll-interval cannot be 0".into(),
            ));
        }
        if self.recovery_manager.id.is_empty() {
            return Err(ConfigError::InvalidValue("recovery-manager.id cannot be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Serialize(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "I/O error: {s}"),
            ConfigError::Parse(s) => write!(f, "parse error: {s}"),
            ConfigError::Serialize(s) => write!(f, "serialize error: {s}"),
            ConfigError::InvalidValue(s) => write!(f, "invalid value: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.of_server.port, 6633);
        assert_eq!(config.ofmsg_sender.poll_interval_ms, 50);
        assert_eq!(config.ofmsg_sender.wait_interval_ms, 5000);
    }

    #[test]
    fn rejects_zero_port() {
        let mut config = Config::default();
        config.of_server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn json_roundtrips_through_recognized_keys() {
        let json = r#"{
            "of-server": {"address": "127.0.0.1", "port": 6653},
            "dpid-checker": {"dpid-format": "hex", "AR": [1, 2], "DR": [3]}
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.of_server.port, 6653);
        assert_eq!(config.dpid_checker.access, vec![1, 2]);
        assert_eq!(config.dpid_checker.distribution, vec![3]);
        // Everything else falls back to its documented default.
        assert_eq!(config.flow_entries_verifier.poll_interval_secs, 30);
    }
}
