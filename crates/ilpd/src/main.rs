//! ilpd: ILP routing node.
//!
//! Runs the configured node plus one simulated neighbour per configured
//! peer, connected over the in-process loopback transport, until Ctrl-C.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use ilp_core::config::NodeConfig;
use ilp_routing::{LoopbackNetwork, RouteManager, SharedRouteManager};

mod handler;
mod neighbours;
mod snapshot;

use handler::EchoHandler;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config: explicit path argument, else the usual lookup.
    let config = match std::env::args().nth(1) {
        Some(path) => {
            let mut config = NodeConfig::load_from(Path::new(&path))
                .with_context(|| format!("failed to load config from {path}"))?;
            config.apply_overrides(|key| std::env::var(key).ok());
            config
        }
        None => {
            if let Err(e) = NodeConfig::write_default_if_missing() {
                tracing::warn!(error = %e, "failed to write default config");
            }
            NodeConfig::load().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to load config, using defaults");
                NodeConfig::default()
            })
        }
    };
    config.validate().context("invalid configuration")?;

    tracing::info!(
        address = %config.node.address,
        global_prefix = %config.node.global_prefix,
        peers = config.peers.len(),
        routes = config.routes.len(),
        broadcast_interval = ?config.ccp.route_broadcast_interval(),
        hold_down = ?config.ccp.route_expiry(),
        "ilpd starting"
    );

    // ── Nodes ────────────────────────────────────────────────────────────────

    let network = LoopbackNetwork::new();
    let local_id = neighbours::local_id(&config.node.address).to_string();

    let local: SharedRouteManager = Arc::new(Mutex::new(RouteManager::from_config(
        &config,
        network.transport(&local_id),
    )));
    network.register(&local_id, &local);

    for peer in &config.peers {
        lock(&local)
            .set_request_handler(&peer.id, Arc::new(EchoHandler::new(&peer.id)))
            .with_context(|| format!("failed to attach handler for {}", peer.id))?;
    }

    let neighbours = neighbours::spawn(&network, &config, &local_id);
    tracing::info!(count = neighbours.len(), "simulated neighbours running");

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let snapshot_task = tokio::spawn(snapshot::snapshot_loop(
        local.clone(),
        Duration::from_secs(5),
        shutdown_tx.subscribe(),
    ));

    let mut all_nodes = vec![local.clone()];
    all_nodes.extend(neighbours.iter().cloned());
    let expiry_task = tokio::spawn(snapshot::expiry_loop(all_nodes, shutdown_tx.subscribe()));

    let probe_task = tokio::spawn(snapshot::probe_loop(
        local.clone(),
        config.peers.iter().map(|p| p.id.clone()).collect(),
        config.ccp.route_broadcast_interval(),
        shutdown_tx.subscribe(),
    ));

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()  => tracing::info!("shutting down"),
        r = snapshot_task       => tracing::error!("snapshot task exited: {:?}", r),
        r = expiry_task         => tracing::error!("expiry task exited: {:?}", r),
        r = probe_task          => tracing::error!("probe task exited: {:?}", r),
    }

    // Stop deliveries, then drop the managers to cancel every CCP task.
    network.unregister(&local_id);
    for peer in &config.peers {
        network.unregister(&peer.id);
    }
    drop(neighbours);
    drop(local);
    Ok(())
}

pub(crate) fn lock(manager: &SharedRouteManager) -> MutexGuard<'_, RouteManager> {
    manager.lock().unwrap_or_else(PoisonError::into_inner)
}
