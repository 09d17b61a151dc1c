//! ILP routing integration test harness.
//!
//! Every test builds a small network of route managers connected over the
//! loopback transport and runs it on a paused tokio clock, so protocol
//! timers fire in virtual time. No sockets, no root.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use ilp_core::config::CcpSettings;
use ilp_core::Relation;
use ilp_routing::{new_registry, LoopbackNetwork, RouteManager, Router, SharedRouteManager};

// ── Harness ───────────────────────────────────────────────────────────────────

/// Protocol timings scaled down so tests converge quickly.
pub fn settings() -> CcpSettings {
    CcpSettings {
        route_broadcast_interval_ms: 1_000,
        route_expiry_ms: 5_000,
        route_control_retry_ms: 500,
        min_update_interval_ms: 20,
        max_epochs_per_update: 50,
    }
}

pub struct Net {
    pub network: Arc<LoopbackNetwork>,
    nodes: BTreeMap<String, SharedRouteManager>,
}

impl Net {
    pub fn new() -> Self {
        Self {
            network: LoopbackNetwork::new(),
            nodes: BTreeMap::new(),
        }
    }

    /// Add a node known to its neighbours as `id`, addressed `address`.
    pub fn node(&mut self, id: &str, address: &str) -> SharedRouteManager {
        let router = Router::new(address, "g", new_registry());
        let manager = RouteManager::new(router, self.network.transport(id), settings());
        let manager = Arc::new(Mutex::new(manager));
        self.network.register(id, &manager);
        self.nodes.insert(id.to_string(), manager.clone());
        manager
    }

    /// `a` sees `b` as `relation`; `b` sees `a` as the inverse. Routes flow
    /// both ways.
    pub fn link(&self, a: &str, relation: Relation, b: &str) {
        self.get(a).add_peer(b, relation, true, true);
        self.get(b).add_peer(a, relation.inverse(), true, true);
    }

    pub fn get(&self, id: &str) -> MutexGuard<'_, RouteManager> {
        self.nodes[id].lock().unwrap()
    }

    /// Next hop `id` would use for `address`, if it has a route.
    pub fn next_hop(&self, id: &str, address: &str) -> Option<String> {
        self.get(id).router().next_hop(address).ok()
    }

    pub fn has_route(&self, id: &str, prefix: &str) -> bool {
        self.get(id).router().routing_table().get(prefix).is_some()
    }

    pub fn epoch(&self, id: &str) -> u64 {
        self.get(id).status().epoch
    }
}

/// Wait (in virtual time) until `check` holds.
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(120), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

mod failures;
mod propagation;
