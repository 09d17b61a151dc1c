use std::time::Duration;

use ilp_core::{IncomingRoute, Relation};

use crate::*;

/// Two peers learn each other's address.
#[tokio::test(start_paused = true)]
async fn test_peers_exchange_addresses() {
    let mut net = Net::new();
    net.node("alice", "g.alice");
    net.node("bob", "g.bob");
    net.link("alice", Relation::Peer, "bob");

    eventually("alice learns bob", || {
        net.next_hop("alice", "g.bob.wallet").as_deref() == Some("bob")
    })
    .await;
    eventually("bob learns alice", || {
        net.next_hop("bob", "g.alice").as_deref() == Some("alice")
    })
    .await;

    let learned = net
        .get("bob")
        .get_peer("alice")
        .and_then(|peer| peer.learned_route("g.alice"))
        .expect("route learned from alice");
    assert_eq!(learned.path, vec!["g.alice"]);
}

/// Configured customer routes stay behind their parent's own address;
/// children that speak CCP are advertised like anyone else.
#[tokio::test(start_paused = true)]
async fn test_customer_routes_hide_behind_parent_address() {
    let mut net = Net::new();
    net.node("bob", "g.bob");
    net.node("alice", "g.bob.alice");
    net.node("carol", "g.bob.carol");
    net.link("alice", Relation::Parent, "bob");
    net.link("carol", Relation::Parent, "bob");
    {
        let mut bob = net.get("bob");
        bob.add_peer("dave", Relation::Child, false, false);
        bob.add_route("dave", IncomingRoute::new("g.bob.dave", vec![]));
    }

    eventually("carol learns alice through bob", || {
        net.next_hop("carol", "g.bob.alice").as_deref() == Some("bob")
            && net.has_route("carol", "g.bob.alice")
    })
    .await;
    eventually("carol learns bob", || net.has_route("carol", "g.bob")).await;

    // Let a few heartbeats pass; the configured child route must stay local.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!net.has_route("carol", "g.bob.dave"));
    assert_eq!(net.next_hop("carol", "g.bob.dave.wallet").as_deref(), Some("bob"));
    assert_eq!(net.next_hop("bob", "g.bob.dave.wallet").as_deref(), Some("dave"));
}

/// A configured route propagates, and so does its removal.
#[tokio::test(start_paused = true)]
async fn test_static_route_propagates_and_withdraws() {
    let mut net = Net::new();
    net.node("alice", "g.alice");
    net.node("bob", "g.bob");
    net.link("alice", Relation::Peer, "bob");
    {
        let mut alice = net.get("alice");
        alice.add_peer("dave", Relation::Child, false, false);
        alice.add_route("dave", IncomingRoute::new("g.dave", vec![]));
    }

    eventually("bob learns g.dave", || {
        net.next_hop("bob", "g.dave.x").as_deref() == Some("alice")
    })
    .await;
    let learned = net
        .get("bob")
        .get_peer("alice")
        .and_then(|peer| peer.learned_route("g.dave"))
        .expect("route learned from alice");
    assert_eq!(learned.path, vec!["g.alice"]);

    net.get("alice").remove_route("dave", "g.dave");
    eventually("bob forgets g.dave", || !net.has_route("bob", "g.dave")).await;
    assert!(net.next_hop("bob", "g.dave.x").is_none());
}

/// Peer routes are not passed up to a parent.
#[tokio::test(start_paused = true)]
async fn test_parent_does_not_learn_peer_routes() {
    let mut net = Net::new();
    net.node("up", "g.up");
    net.node("me", "g.me");
    net.node("side", "g.side");
    net.link("me", Relation::Parent, "up");
    net.link("me", Relation::Peer, "side");

    eventually("me learns both", || {
        net.has_route("me", "g.up") && net.has_route("me", "g.side")
    })
    .await;
    eventually("up learns me", || net.has_route("up", "g.me")).await;
    eventually("side learns up through me", || {
        net.next_hop("side", "g.up").as_deref() == Some("me")
    })
    .await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!net.has_route("up", "g.side"));
}

/// Three mutual peers converge on direct routes and never loop.
#[tokio::test(start_paused = true)]
async fn test_triangle_prefers_direct_routes() {
    let mut net = Net::new();
    for id in ["a", "b", "c"] {
        net.node(id, &format!("g.{id}"));
    }
    net.link("a", Relation::Peer, "b");
    net.link("b", Relation::Peer, "c");
    net.link("c", Relation::Peer, "a");

    eventually("full mesh converges", || {
        ["a", "b", "c"].iter().all(|from| {
            ["a", "b", "c"]
                .iter()
                .filter(|to| *to != from)
                .all(|to| net.next_hop(from, &format!("g.{to}")).as_deref() == Some(*to))
        })
    })
    .await;

    // Quiet network: only heartbeats from here on.
    let epochs: Vec<u64> = ["a", "b", "c"].iter().map(|id| net.epoch(id)).collect();
    tokio::time::sleep(Duration::from_secs(10)).await;
    let later: Vec<u64> = ["a", "b", "c"].iter().map(|id| net.epoch(id)).collect();
    assert_eq!(epochs, later);
}

/// Status reports every peer's CCP position.
#[tokio::test(start_paused = true)]
async fn test_status_reports_sync_state() {
    let mut net = Net::new();
    net.node("alice", "g.alice");
    net.node("bob", "g.bob");
    net.link("alice", Relation::Child, "bob");

    eventually("bob's sender reaches alice's epoch", || {
        let status = net.get("bob").status();
        let alice_epoch = net.epoch("alice");
        let bob_view = status.peers[0].receiver.map(|r| r.epoch);
        bob_view == Some(alice_epoch)
    })
    .await;

    let status = net.get("alice").status();
    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["address"], "g.alice");
    assert_eq!(json["peers"][0]["id"], "bob");
    assert_eq!(json["peers"][0]["relation"], "child");
    assert_eq!(json["peers"][0]["sender"]["mode"], "sync");
}
