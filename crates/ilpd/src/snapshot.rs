//! Periodic node maintenance and logging.

use std::time::Duration;

use bytes::Bytes;
use ilp_core::PeerId;
use ilp_routing::{router, SharedRouteManager};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::lock;

/// Log the routing table and per-peer CCP state every `every`.
pub async fn snapshot_loop(
    manager: SharedRouteManager,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = interval.tick() => {}
        }

        let (status, routes) = {
            let manager = lock(&manager);
            let routes: Vec<(String, String)> = manager
                .router()
                .routing_table()
                .entries()
                .into_iter()
                .map(|(prefix, route)| (prefix, route.next_hop.clone()))
                .collect();
            (manager.status(), routes)
        };

        tracing::info!(
            address = %status.address,
            routing_table_id = %status.routing_table_id,
            epoch = status.epoch,
            routes = status.routes,
            "routing table snapshot"
        );
        for (prefix, next_hop) in routes {
            tracing::info!(%prefix, %next_hop, "  route");
        }
        for peer in &status.peers {
            tracing::info!(
                peer = %peer.id,
                relation = %peer.relation,
                learned = peer.learned_routes,
                sender = ?peer.sender,
                receiver = ?peer.receiver,
                "  peer"
            );
        }
        match serde_json::to_string(&status) {
            Ok(json) => tracing::debug!(status = %json, "status"),
            Err(e) => tracing::warn!(error = %e, "failed to encode status"),
        }
    }
}

/// Drop learned routes whose hold-down passed.
pub async fn expiry_loop(managers: Vec<SharedRouteManager>, mut shutdown: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = interval.tick() => {}
        }

        let now = Instant::now();
        for manager in &managers {
            let expired = lock(manager).expire_stale_routes(now);
            if !expired.is_empty() {
                tracing::debug!(count = expired.len(), "expired learned routes");
            }
        }
    }
}

/// Send a small request towards every neighbour's address through the
/// local router, logging how each one resolved.
pub async fn probe_loop(
    manager: SharedRouteManager,
    peers: Vec<PeerId>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = interval.tick() => {}
        }

        for peer in &peers {
            // Resolve under the lock, call the handler outside it.
            let target = {
                let manager = lock(&manager);
                let destination = manager
                    .router()
                    .routing_table()
                    .entries()
                    .into_iter()
                    .find(|(_, route)| route.next_hop == *peer)
                    .map(|(prefix, _)| prefix);
                destination.map(|prefix| (manager.router().handler_for(&prefix), prefix))
            };

            match target {
                None => tracing::debug!(%peer, "no route through peer yet"),
                Some((Err(e), prefix)) => tracing::warn!(%peer, %prefix, error = %e, "probe not routable"),
                Some((Ok((next_hop, handler)), prefix)) => {
                    match router::forward(&next_hop, handler, Bytes::from_static(b"probe")).await {
                        Ok(reply) => tracing::debug!(%prefix, %next_hop, bytes = reply.len(), "probe answered"),
                        Err(e) => tracing::warn!(%prefix, %next_hop, error = %e, "probe failed"),
                    }
                }
            }
        }
    }
}
