// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OpenFlow 1.3 SDN controller daemon.
//!
//! Wiring follows `hdds-discovery-server/src/main.rs`: parse CLI, load or
//! default a config, build a `tracing` subscriber, construct the core
//! components, register the signal-driven shutdown, and run.

mod cli;
mod handlers;

use clap::Parser;
use cli::Args;
use handlers::CoreHandler;
use parking_lot::Mutex as SyncMutex;
use sdn_core::config::Config;
use sdn_core::link_discovery::encode_beacon_frame;
use sdn_core::{
    Beacon, ConnectionServer, DpidGuard, FlowVerifier, LinkDiscoverer, MastershipController, OfMsgSender,
    SwitchInventory, TopologyEngine,
};
use sdn_persistence::RedisStore;
use sdn_proto::instruction::output_action;
use sdn_proto::message::{Message, PacketOut};
use sdn_proto::{OFPP_CONTROLLER, OFP_NO_BUFFER};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level: Level = args.log_level.parse().unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(true)
        .init();

    let config = if args.conf.exists() {
        info!("loading configuration from {:?}", args.conf);
        Config::from_file(&args.conf)?
    } else {
        info!("{:?} not found, starting from documented defaults", args.conf);
        Config::default()
    };
    config.validate()?;
    if let Some(tooldir) = &args.tooldir {
        info!("tooldir: {:?}", tooldir);
    }
    if let Some(etcdir) = &args.etcdir {
        info!("etcdir: {:?}", etcdir);
    }
    if let Some(dumpdir) = &args.dumpdir {
        info!("dumpdir: {:?}", dumpdir);
    }

    let dpid_guard = Arc::new(DpidGuard::new(&config.dpid_checker));
    let server = ConnectionServer::new(config.of_server.clone(), dpid_guard.clone());
    let inventory = SwitchInventory::new();
    let link_discovery = Arc::new(SyncMutex::new(LinkDiscoverer::new(config.link_discovery.poll_interval())));
    let flow_verifier = FlowVerifier::new();
    let topology = TopologyEngine::new();
    let of_sender = OfMsgSender::new(config.ofmsg_sender.clone());

    server
        .register_handler(Arc::new(CoreHandler {
            inventory: inventory.clone(),
            link_discovery: link_discovery.clone(),
            flow_verifier: flow_verifier.clone(),
            topology: topology.clone(),
            sender: of_sender.clone(),
        }))
        .await;

    let store: Arc<dyn sdn_persistence::PersistenceStore> = Arc::new(RedisStore::new(
        &config.database_connector.db_address,
        config.database_connector.db_port,
        None,
        0,
    )?);

    let mastership =
        MastershipController::new(config.recovery_manager.clone(), server.clone(), dpid_guard.clone(), store.clone());
    let (heartbeat, _heartbeat_tx) = sdn_core::HeartbeatService::new(config.recovery_manager.clone());
    heartbeat.register_handler(Arc::new(mastership.clone())).await;

    info!("sdn-controller starting: node {} role {:?}", config.recovery_manager.id, config.recovery_manager.status);
    mastership.start(config.recovery_manager.status).await?;

    if config.recovery_manager.status == sdn_core::config::NodeStatus::Primary {
        if let Err(e) = topology.load_routes(store.as_ref()).await {
            warn!("failed to load persisted routes on startup: {}", e);
        }
    }

    // Periodic inventory polling and flow-table reconciliation, one tick
    // per connected switch per cycle.
    {
        let server = server.clone();
        let inventory = inventory.clone();
        let poll_interval = config.flow_entries_verifier.poll_interval();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(poll_interval);
            loop {
                tick.tick().await;
                for dpid in server.connected_dpids().await {
                    if let Some(agent) = server.agent_for(dpid).await {
                        if let Err(e) = inventory.poll_once(dpid, &agent, true).await {
                            warn!("inventory poll for {:#x} failed: {}", dpid, e);
                        }
                    }
                }
            }
        });
    }
    {
        let server = server.clone();
        let flow_verifier = flow_verifier.clone();
        let of_sender = of_sender.clone();
        let store = store.clone();
        let poll_interval = config.flow_entries_verifier.poll_interval();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(poll_interval);
            loop {
                tick.tick().await;
                for dpid in server.connected_dpids().await {
                    if let Some(agent) = server.agent_for(dpid).await {
                        match flow_verifier.reconcile(dpid, &agent, &of_sender, store.as_ref()).await {
                            Ok(report) => {
                                if report.reinstalled > 0 || report.removed_unexpected > 0 {
                                    info!(
                                        "flow table reconciled for {:#x}: +{} -{}",
                                        dpid, report.reinstalled, report.removed_unexpected
                                    );
                                }
                            }
                            Err(e) => warn!("flow reconcile for {:#x} failed: {}", dpid, e),
                        }
                    }
                }
            }
        });
    }

    // Beacon send + half-link expiry tick.
    {
        let server = server.clone();
        let inventory = inventory.clone();
        let link_discovery = link_discovery.clone();
        let topology = topology.clone();
        let interval = config.link_discovery.poll_interval();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tick.tick().await;
                for dpid in server.connected_dpids().await {
                    let Some(agent) = server.agent_for(dpid).await else { continue };
                    let Some(switch) = inventory.switch(dpid).await else { continue };
                    for port in switch.ports.values() {
                        let beacon = Beacon::new(dpid, port.port_no, None);
                        let frame = encode_beacon_frame(port.hw_addr, &beacon);
                        let packet_out = PacketOut {
                            buffer_id: OFP_NO_BUFFER,
                            in_port: OFPP_CONTROLLER,
                            actions: output_action(port.port_no, 0),
                            data: frame,
                        };
                        let _ = agent.send_with_fresh_xid(&Message::PacketOut(packet_out)).await;
                    }
                }
                let events = link_discovery.lock().tick(std::time::Instant::now());
                for event in events {
                    info!("link discovery: {:?}", event);
                    topology.apply_link_event(event).await;
                }
            }
        });
    }

    // Route trigger-poll: keeps each Route's working-path selection
    // current as the link graph moves.
    {
        let topology = topology.clone();
        let store = store.clone();
        let interval = config.topology.trigger_poll_interval();
        let flap_debounce = config.topology.flap_debounce();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tick.tick().await;
                topology.poll_triggers(flap_debounce, store.as_ref()).await;
            }
        });
    }

    // Role-equal-refusal monitor and recovery-mode progress check.
    {
        let mastership = mastership.clone();
        let interval = config.recovery_manager.role_monitoring_interval();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tick.tick().await;
                mastership.monitor_roles().await;
                if let Err(e) = mastership.recovery_tick().await {
                    warn!("recovery-mode bookkeeping failed: {}", e);
                }
            }
        });
    }

    let heartbeat_role = mastership.role_handle();
    tokio::spawn(async move {
        if let Err(e) = heartbeat.run(heartbeat_role).await {
            warn!("heartbeat service stopped: {}", e);
        }
    });

    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown signal received, stopping controller");
        shutdown_server.shutdown();
    });

    server.run().await?;
    info!("sdn-controller stopped");
    Ok(())
}
