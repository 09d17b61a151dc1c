use std::time::Duration;

use ilp_core::{IncomingRoute, Relation};
use tokio::time::Instant;

use crate::*;

fn sender_epoch(net: &Net, node: &str, peer: &str) -> u64 {
    net.get(node)
        .get_peer(peer)
        .and_then(|p| p.sender().map(|s| s.last_known_epoch()))
        .expect("peer has a sender")
}

fn linked_pair() -> Net {
    let mut net = Net::new();
    net.node("alice", "g.alice");
    net.node("bob", "g.bob");
    net.link("alice", Relation::Peer, "bob");
    net.get("alice").add_peer("dave", Relation::Child, false, false);
    net
}

/// Updates sent over a dead link are rolled back and delivered once the
/// link returns.
#[tokio::test(start_paused = true)]
async fn test_link_failure_rolls_back_and_recovers() {
    let net = linked_pair();
    eventually("bob learns alice", || net.has_route("bob", "g.alice")).await;
    eventually("alice's sender caught up", || {
        sender_epoch(&net, "alice", "bob") == net.epoch("alice")
    })
    .await;
    let acknowledged = sender_epoch(&net, "alice", "bob");

    net.network.set_link_down("alice", "bob", true);
    net.get("alice")
        .add_route("dave", IncomingRoute::new("g.dave", vec![]));
    assert!(net.epoch("alice") > acknowledged);

    // Several attempts fail; none of them sticks.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(sender_epoch(&net, "alice", "bob"), acknowledged);
    assert!(!net.has_route("bob", "g.dave"));

    net.network.set_link_down("alice", "bob", false);
    eventually("bob learns g.dave", || {
        net.next_hop("bob", "g.dave").as_deref() == Some("alice")
    })
    .await;
    assert_eq!(sender_epoch(&net, "alice", "bob"), net.epoch("alice"));
}

/// Routes from a silent neighbour expire after the hold-down time and come
/// back through a resync once it is reachable again.
#[tokio::test(start_paused = true)]
async fn test_hold_down_expiry_and_resync() {
    let net = linked_pair();
    eventually("bob learns alice", || net.has_route("bob", "g.alice")).await;

    net.network.set_link_down("alice", "bob", true);
    assert!(net.get("bob").expire_stale_routes(Instant::now()).is_empty());

    tokio::time::sleep(Duration::from_secs(6)).await;
    let expired = net.get("bob").expire_stale_routes(Instant::now());
    assert_eq!(expired, vec!["g.alice"]);
    assert!(!net.has_route("bob", "g.alice"));
    let receiver_epoch = net
        .get("bob")
        .get_peer("alice")
        .and_then(|p| p.receiver().map(|r| r.epoch()));
    assert_eq!(receiver_epoch, Some(0));

    net.network.set_link_down("alice", "bob", false);
    eventually("bob relearns alice", || net.has_route("bob", "g.alice")).await;
}

/// A rebuilt forwarding table carries a new id; the neighbour notices,
/// resyncs from epoch 0 and keeps its routes.
#[tokio::test(start_paused = true)]
async fn test_table_reset_forces_resync() {
    let net = linked_pair();
    net.get("alice")
        .add_route("dave", IncomingRoute::new("g.dave", vec![]));
    eventually("bob learns g.dave", || net.has_route("bob", "g.dave")).await;

    net.get("alice").reset_forwarding_table();
    let new_id = net.get("alice").status().routing_table_id;

    eventually("bob adopts the new table", || {
        let status = net.get("bob").status();
        let receiver = status.peers[0].receiver.expect("bob receives from alice");
        receiver.routing_table_id == new_id && receiver.epoch == net.epoch("alice")
    })
    .await;
    assert!(net.has_route("bob", "g.alice"));
    assert!(net.has_route("bob", "g.dave"));
}

/// Removing a peer drops its routes at once and ignores anything it still
/// sends.
#[tokio::test(start_paused = true)]
async fn test_removed_peer_is_forgotten() {
    let net = linked_pair();
    eventually("bob learns alice", || net.has_route("bob", "g.alice")).await;

    assert!(net.get("bob").remove_peer("alice"));
    assert!(!net.has_route("bob", "g.alice"));

    net.get("alice")
        .add_route("dave", IncomingRoute::new("g.dave", vec![]));
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!net.has_route("bob", "g.dave"));
    assert!(net.get("bob").get_peer("alice").is_none());
}

/// A route removed while the link was down and the table was rebuilt is
/// gone for the neighbour once it follows the new table.
#[tokio::test(start_paused = true)]
async fn test_table_reset_drops_routes_missing_from_new_table() {
    let net = linked_pair();
    net.get("alice")
        .add_route("dave", IncomingRoute::new("g.dave", vec![]));
    eventually("bob learns g.dave", || {
        net.next_hop("bob", "g.dave").as_deref() == Some("alice")
    })
    .await;

    net.network.set_link_down("alice", "bob", true);
    {
        let mut alice = net.get("alice");
        alice.remove_route("dave", "g.dave");
        alice.reset_forwarding_table();
    }
    let new_id = net.get("alice").status().routing_table_id;
    net.network.set_link_down("alice", "bob", false);

    eventually("bob follows the new table", || {
        let status = net.get("bob").status();
        let receiver = status.peers[0].receiver.expect("bob receives from alice");
        receiver.routing_table_id == new_id && receiver.epoch == net.epoch("alice")
    })
    .await;
    assert!(!net.has_route("bob", "g.dave"));
    assert!(net.next_hop("bob", "g.dave").is_none());
    assert!(net.has_route("bob", "g.alice"));

    // Heartbeats keep alice's other routes alive; g.dave stays gone.
    tokio::time::sleep(Duration::from_secs(60)).await;
    net.get("bob").expire_stale_routes(Instant::now());
    assert!(net.next_hop("bob", "g.dave").is_none());
    assert_eq!(net.next_hop("bob", "g.alice").as_deref(), Some("alice"));
}
