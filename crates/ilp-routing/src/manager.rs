//! Route manager: one [`Peer`] per neighbour, best-route selection, and
//! dispatch of inbound CCP requests.
//!
//! Every change that can move a route ends in `update_prefix`, which picks
//! the best candidate across all peers and hands it to the [`Router`].
//! When that advances the forwarding epoch, every sender is woken.

use std::collections::BTreeMap;
use std::sync::Arc;

use ilp_core::config::{CcpSettings, NodeConfig};
use ilp_core::{
    CcpReply, CcpRequest, IncomingRoute, PeerId, Relation, RouteControlRequest,
    RouteUpdateRequest, RoutingTableId,
};
use serde::Serialize;
use tokio::time::Instant;

use crate::error::RoutingError;
use crate::peer::{Peer, PeerStatus};
use crate::receiver::CcpReceiver;
use crate::registry::new_registry;
use crate::router::Router;
use crate::sender::CcpSender;
use crate::transport::{CcpTransport, RequestHandler};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteManagerStatus {
    pub address: String,
    pub routing_table_id: RoutingTableId,
    pub epoch: u64,
    pub routes: usize,
    pub peers: Vec<PeerStatus>,
}

pub struct RouteManager {
    router: Router,
    peers: BTreeMap<PeerId, Peer>,
    transport: Arc<dyn CcpTransport>,
    settings: CcpSettings,
}

impl RouteManager {
    pub fn new(router: Router, transport: Arc<dyn CcpTransport>, settings: CcpSettings) -> Self {
        Self {
            router,
            peers: BTreeMap::new(),
            transport,
            settings,
        }
    }

    /// Build a node from configuration: peers first, then static routes.
    ///
    /// Spawns the peers' CCP tasks, so it must run inside a tokio runtime.
    pub fn from_config(config: &NodeConfig, transport: Arc<dyn CcpTransport>) -> Self {
        let router = Router::new(
            config.node.address.clone(),
            config.node.global_prefix.clone(),
            new_registry(),
        );
        let mut manager = Self::new(router, transport, config.ccp.clone());

        for peer in &config.peers {
            manager.add_peer(&peer.id, peer.relation, peer.send_routes, peer.receive_routes);
        }
        for route in &config.routes {
            manager.add_route(
                &route.peer,
                IncomingRoute::new(route.prefix.clone(), route.path.clone()),
            );
        }
        manager
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn settings(&self) -> &CcpSettings {
        &self.settings
    }

    // ── Peers ─────────────────────────────────────────────────────────────────

    /// Register a neighbour and start its CCP tasks. Replaces any peer with
    /// the same id.
    pub fn add_peer(&mut self, id: &str, relation: Relation, send_routes: bool, receive_routes: bool) {
        if self.peers.contains_key(id) {
            self.remove_peer(id);
        }

        self.router.add_peer(id, relation, None);

        let mut peer = Peer::new(id, relation);
        if send_routes {
            peer = peer.with_sender(CcpSender::new(
                id,
                self.router.address(),
                self.router.forwarding_table(),
                Arc::clone(self.router.registry()),
                Arc::clone(&self.transport),
                self.settings.clone(),
            ));
        }
        if receive_routes {
            peer = peer.with_receiver(CcpReceiver::new(
                id,
                Arc::clone(&self.transport),
                self.settings.clone(),
            ));
        }
        peer.start();

        tracing::info!(peer = id, %relation, send_routes, receive_routes, "peer added");
        self.peers.insert(id.to_string(), peer);
    }

    /// Attach the handler that carries forwarded requests to `id`.
    pub fn set_request_handler(
        &self,
        id: &str,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), RoutingError> {
        let mut entry = self
            .router
            .registry()
            .get_mut(id)
            .ok_or_else(|| RoutingError::UnknownPeer { peer: id.to_string() })?;
        entry.handler = Some(handler);
        Ok(())
    }

    /// Drop a neighbour, stop its tasks and re-route everything it carried.
    pub fn remove_peer(&mut self, id: &str) -> bool {
        let Some(peer) = self.peers.remove(id) else {
            return false;
        };
        peer.stop();
        self.router.remove_peer(id);

        let mut affected = peer.get_prefixes();
        affected.extend(
            self.router
                .routing_table()
                .entries()
                .into_iter()
                .filter(|(_, route)| route.next_hop == id)
                .map(|(prefix, _)| prefix),
        );
        affected.sort();
        affected.dedup();

        tracing::info!(peer = id, routes = affected.len(), "peer removed");
        self.update_prefixes(&affected);
        true
    }

    pub fn get_peer(&self, id: &str) -> Option<&Peer> {
        self.peers.get(id)
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.keys().cloned().collect()
    }

    // ── Static routes ─────────────────────────────────────────────────────────

    /// Configure a route through `peer_id`. Unknown peers are ignored.
    pub fn add_route(&mut self, peer_id: &str, route: IncomingRoute) {
        let Some(peer) = self.peers.get_mut(peer_id) else {
            tracing::warn!(peer = peer_id, prefix = %route.prefix, "no peer found to add route for");
            return;
        };
        let prefix = route.prefix.clone();
        if peer.insert_route(route) {
            self.update_prefixes(&[prefix]);
        }
    }

    pub fn remove_route(&mut self, peer_id: &str, prefix: &str) {
        let Some(peer) = self.peers.get_mut(peer_id) else {
            tracing::warn!(peer = peer_id, prefix, "no peer found to remove route for");
            return;
        };
        if peer.delete_route(prefix) {
            self.update_prefixes(&[prefix.to_string()]);
        }
    }

    // ── CCP dispatch ──────────────────────────────────────────────────────────

    /// Answer a CCP request that arrived from neighbour `from`.
    pub fn handle_ccp_request(&mut self, from: &str, request: CcpRequest) -> CcpReply {
        let Some(peer) = self.peers.get(from) else {
            tracing::debug!(peer = from, "ccp request from unknown peer");
            return CcpReply::reject(format!("unknown peer {from}"));
        };

        match request {
            CcpRequest::RouteControl(control) => {
                if peer.sender().is_none() {
                    return CcpReply::reject("not configured to send routes to this peer");
                }
                self.handle_route_control(from, &control).map_or_else(
                    |e| CcpReply::reject(e.to_string()),
                    |()| CcpReply::Ack,
                )
            }
            CcpRequest::RouteUpdate(update) => {
                if peer.receiver().is_none() {
                    return CcpReply::reject("not configured to receive routes from this peer");
                }
                self.handle_route_update(from, &update).map_or_else(
                    |e| CcpReply::reject(e.to_string()),
                    |_| CcpReply::Ack,
                )
            }
        }
    }

    pub fn handle_route_control(
        &self,
        peer_id: &str,
        request: &RouteControlRequest,
    ) -> Result<(), RoutingError> {
        let peer = self.peers.get(peer_id).ok_or_else(|| RoutingError::UnknownPeer {
            peer: peer_id.to_string(),
        })?;
        match peer.sender() {
            Some(sender) => sender.handle_route_control(request),
            None => tracing::debug!(peer = peer_id, "ignoring route control, not sending routes"),
        }
        Ok(())
    }

    /// Apply an update from `peer_id` and re-route what it changed.
    /// Returns the prefixes the update touched.
    pub fn handle_route_update(
        &mut self,
        peer_id: &str,
        request: &RouteUpdateRequest,
    ) -> Result<Vec<String>, RoutingError> {
        let peer = self.peers.get(peer_id).ok_or_else(|| RoutingError::UnknownPeer {
            peer: peer_id.to_string(),
        })?;
        let Some(receiver) = peer.receiver() else {
            tracing::debug!(peer = peer_id, "ignoring route update, not receiving routes");
            return Ok(Vec::new());
        };

        let changed = receiver.handle_route_update(request);
        self.update_prefixes(&changed);
        Ok(changed)
    }

    // ── Selection ─────────────────────────────────────────────────────────────

    /// Best candidate for exactly `prefix` across all peers.
    ///
    /// Order: configured before learned, then relation priority, then
    /// shorter path, then peer id.
    pub fn best_route(&self, prefix: &str) -> Option<(PeerId, IncomingRoute)> {
        let mut candidates = Vec::new();
        for peer in self.peers.values() {
            if let Some(route) = peer.static_route(prefix) {
                candidates.push((0u8, peer, route.clone()));
            }
            if let Some(route) = peer.learned_route(prefix).filter(|r| !self.is_looped(r)) {
                candidates.push((1u8, peer, route));
            }
        }

        candidates
            .into_iter()
            .min_by(|(a_rank, a_peer, a), (b_rank, b_peer, b)| {
                a_rank
                    .cmp(b_rank)
                    .then(a_peer.relation().priority().cmp(&b_peer.relation().priority()))
                    .then(a.path.len().cmp(&b.path.len()))
                    .then_with(|| a_peer.id().cmp(b_peer.id()))
            })
            .map(|(_, peer, route)| (peer.id().to_string(), route))
    }

    /// Learned routes that already crossed this node are never used.
    fn is_looped(&self, route: &IncomingRoute) -> bool {
        route.path.iter().any(|hop| hop == self.router.address())
    }

    fn update_prefix(&mut self, prefix: &str) -> bool {
        match self.best_route(prefix) {
            Some((peer, route)) => self.router.add_route(&peer, route),
            None => self.router.remove_route(prefix),
        }
    }

    fn update_prefixes(&mut self, prefixes: &[String]) {
        let before = self.router.forwarding_table().read().current_epoch();
        for prefix in prefixes {
            self.update_prefix(prefix);
        }
        let after = self.router.forwarding_table().read().current_epoch();
        if after != before {
            tracing::debug!(from_epoch = before, to_epoch = after, "forwarding epoch advanced");
            self.wake_senders();
        }
    }

    fn wake_senders(&self) {
        for sender in self.peers.values().filter_map(Peer::sender) {
            sender.schedule_route_update();
        }
    }

    // ── Maintenance ───────────────────────────────────────────────────────────

    /// Drop learned routes whose hold-down passed by `now` and re-route the
    /// affected prefixes. Returns those prefixes.
    pub fn expire_stale_routes(&mut self, now: Instant) -> Vec<String> {
        let mut expired: Vec<String> = self
            .peers
            .values()
            .filter_map(Peer::receiver)
            .flat_map(|receiver| receiver.expire(now))
            .collect();
        expired.sort();
        expired.dedup();

        if !expired.is_empty() {
            self.update_prefixes(&expired);
        }
        expired
    }

    /// Rebuild the forwarding table under a new id; peers resync from 0.
    pub fn reset_forwarding_table(&mut self) {
        self.router.reset_forwarding_table();
        self.wake_senders();
    }

    pub fn status(&self) -> RouteManagerStatus {
        let (routing_table_id, epoch) = {
            let table = self.router.forwarding_table();
            let table = table.read();
            (table.routing_table_id(), table.current_epoch())
        };
        RouteManagerStatus {
            address: self.router.address().to_string(),
            routing_table_id,
            epoch,
            routes: self.router.routing_table().len(),
            peers: self.peers.values().map(Peer::status).collect(),
        }
    }
}
