//! Simulated neighbours.
//!
//! Each configured peer gets its own route manager on the loopback
//! network, configured as the mirror image of our side of the link.
//! Children live under our address; parents and peers directly under the
//! global prefix.

use std::sync::{Arc, Mutex};

use ilp_core::config::{NodeConfig, PeerConfig};
use ilp_core::Relation;
use ilp_routing::{new_registry, LoopbackNetwork, RouteManager, Router, SharedRouteManager};

/// Our id on the loopback network: the last segment of our address.
pub fn local_id(address: &str) -> &str {
    address.rsplit('.').next().unwrap_or(address)
}

/// Address a simulated neighbour takes.
pub fn neighbour_address(config: &NodeConfig, peer: &PeerConfig) -> String {
    match peer.relation {
        Relation::Child => format!("{}.{}", config.node.address, peer.id),
        _ => format!("{}.{}", config.node.global_prefix, peer.id),
    }
}

pub fn spawn(
    network: &Arc<LoopbackNetwork>,
    config: &NodeConfig,
    local_id: &str,
) -> Vec<SharedRouteManager> {
    config
        .peers
        .iter()
        .map(|peer| {
            let address = neighbour_address(config, peer);
            let router = Router::new(address.clone(), config.node.global_prefix.clone(), new_registry());
            let mut manager =
                RouteManager::new(router, network.transport(&peer.id), config.ccp.clone());

            // They send what we receive and receive what we send.
            manager.add_peer(
                local_id,
                peer.relation.inverse(),
                peer.receive_routes,
                peer.send_routes,
            );

            let manager = Arc::new(Mutex::new(manager));
            network.register(&peer.id, &manager);
            tracing::info!(peer = %peer.id, %address, relation = %peer.relation, "neighbour started");
            manager
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: &str, relation: Relation) -> PeerConfig {
        PeerConfig {
            id: id.to_string(),
            relation,
            send_routes: true,
            receive_routes: true,
        }
    }

    #[test]
    fn local_id_is_last_segment() {
        assert_eq!(local_id("g.node"), "node");
        assert_eq!(local_id("g.a.b"), "b");
    }

    #[test]
    fn children_live_under_our_address() {
        let mut config = NodeConfig::default();
        config.node.address = "g.me".to_string();

        assert_eq!(neighbour_address(&config, &peer("helen", Relation::Child)), "g.me.helen");
        assert_eq!(neighbour_address(&config, &peer("harry", Relation::Parent)), "g.harry");
        assert_eq!(neighbour_address(&config, &peer("sally", Relation::Peer)), "g.sally");
    }
}
