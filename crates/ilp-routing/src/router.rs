//! Router: local route selection and the advertisement policy.
//!
//! The router owns the local [`RoutingTable`] and is the only writer of the
//! [`ForwardingRoutingTable`]. Every local change runs through
//! `update_local_route`; only a change of next hop reaches the
//! forwarding step, so re-adding an identical route costs nothing.

use std::sync::Arc;

use bytes::Bytes;
use ilp_core::prefix::{ancestors, depth, is_prefix_of};
use ilp_core::{IncomingRoute, PeerId, Relation, Route, RouteState};

use crate::error::RoutingError;
use crate::forwarding_table::{ForwardingRoutingTable, SharedForwardingTable};
use crate::registry::{PeerEntry, PeerRegistry};
use crate::routing_table::RoutingTable;
use crate::transport::RequestHandler;

pub struct Router {
    address: String,
    global_prefix: String,
    routing_table: RoutingTable,
    forwarding: SharedForwardingTable,
    registry: PeerRegistry,
}

impl Router {
    /// Build a router for the node at `address`.
    ///
    /// The node's own address is advertised from the start, with itself as
    /// next hop and as the whole path.
    pub fn new(
        address: impl Into<String>,
        global_prefix: impl Into<String>,
        registry: PeerRegistry,
    ) -> Self {
        let address = address.into();
        let forwarding = SharedForwardingTable::new(ForwardingRoutingTable::new());
        forwarding
            .write()
            .record(&address, RouteState::Present(Route::new(address.clone(), vec![address.clone()])));

        Self {
            address,
            global_prefix: global_prefix.into(),
            routing_table: RoutingTable::new(),
            forwarding,
            registry,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn global_prefix(&self) -> &str {
        &self.global_prefix
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing_table
    }

    /// Handle to the forwarding table, for senders.
    pub fn forwarding_table(&self) -> SharedForwardingTable {
        self.forwarding.clone()
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    // ── Peers ─────────────────────────────────────────────────────────────────

    pub fn add_peer(
        &self,
        id: &str,
        relation: Relation,
        handler: Option<Arc<dyn RequestHandler>>,
    ) {
        self.registry
            .insert(id.to_string(), PeerEntry { relation, handler });
    }

    pub fn remove_peer(&self, id: &str) -> Option<PeerEntry> {
        self.registry.remove(id).map(|(_, entry)| entry)
    }

    pub fn get_peer(&self, id: &str) -> Option<PeerEntry> {
        self.registry.get(id).map(|entry| entry.clone())
    }

    // ── Local routes ──────────────────────────────────────────────────────────

    /// Make `peer` the next hop for `route.prefix`. Returns whether the
    /// local table changed.
    pub fn add_route(&mut self, peer: &str, route: IncomingRoute) -> bool {
        let local = route.to_route(peer);
        self.update_local_route(&route.prefix, Some(local))
    }

    pub fn remove_route(&mut self, prefix: &str) -> bool {
        self.update_local_route(prefix, None)
    }

    fn update_local_route(&mut self, prefix: &str, route: Option<Route>) -> bool {
        let current_next_hop = self.routing_table.get(prefix).map(|r| r.next_hop.clone());
        let new_next_hop = route.as_ref().map(|r| r.next_hop.clone());

        if current_next_hop == new_next_hop {
            return false;
        }

        match route {
            Some(route) => {
                tracing::trace!(
                    prefix,
                    old = ?current_next_hop,
                    new = ?new_next_hop,
                    "new best route for prefix"
                );
                self.routing_table.insert(prefix, route);
            }
            None => {
                tracing::trace!(prefix, "no more route available for prefix");
                self.routing_table.remove(prefix);
            }
        }

        self.update_forwarding_route(prefix);
        true
    }

    /// Re-run the advertisement policy for `prefix`, then for every more
    /// specific prefix in the local table if the advertisement changed.
    ///
    /// The write guard is held for the whole sequence so epoch allocation
    /// stays serialised.
    fn update_forwarding_route(&self, prefix: &str) {
        let mut forwarding = self.forwarding.write();
        if !self.update_forwarding_entry(&mut forwarding, prefix) {
            return;
        }

        let mut worklist: Vec<String> = self
            .routing_table
            .keys_starting_with(prefix)
            .into_iter()
            .filter(|sub| sub != prefix)
            .collect();
        worklist.sort_by_key(|sub| depth(sub));

        for sub in &worklist {
            self.update_forwarding_entry(&mut forwarding, sub);
        }
    }

    /// Returns whether a new epoch was recorded.
    fn update_forwarding_entry(&self, forwarding: &mut ForwardingRoutingTable, prefix: &str) -> bool {
        if prefix == self.address {
            return false;
        }

        let advertised = self
            .routing_table
            .get(prefix)
            .filter(|local| !self.is_looped(local))
            .map(|local| local.via(&self.address))
            .filter(|route| self.should_advertise(forwarding, prefix, route));
        let state = RouteState::from(advertised);

        if forwarding.next_hop(prefix) == state.next_hop() {
            return false;
        }

        let next_hop = state.next_hop().map(str::to_string);
        let epoch = forwarding.record(prefix, state);
        tracing::debug!(prefix, next_hop = ?next_hop, epoch, "forwarding route changed");
        true
    }

    /// The route already went through us once.
    fn is_looped(&self, route: &Route) -> bool {
        route.path.iter().any(|hop| *hop == self.address)
    }

    /// Policy for a route whose path already starts with our address.
    fn should_advertise(&self, forwarding: &ForwardingRoutingTable, prefix: &str, route: &Route) -> bool {
        if !is_prefix_of(&self.global_prefix, prefix) || prefix == self.global_prefix {
            tracing::trace!(prefix, "not advertising prefix outside the global space");
            return false;
        }

        let own_child = prefix
            .strip_prefix(self.address.as_str())
            .is_some_and(|rest| rest.starts_with('.'));
        if own_child && route.path.len() == 1 {
            tracing::trace!(prefix, "customer route covered by own address");
            return false;
        }

        // A less specific prefix already sends this traffic to the same hop.
        let covered = ancestors(prefix)
            .any(|ancestor| forwarding.next_hop(ancestor) == Some(route.next_hop.as_str()));
        if covered {
            tracing::trace!(prefix, next_hop = %route.next_hop, "route covered by less specific prefix");
            return false;
        }

        true
    }

    /// Issue a fresh routing table id and replay every live route. Peers
    /// notice the new id and resync from epoch 0.
    pub fn reset_forwarding_table(&self) {
        let mut forwarding = self.forwarding.write();
        forwarding.reset();
        tracing::info!(
            routing_table_id = %forwarding.routing_table_id(),
            epoch = forwarding.current_epoch(),
            "forwarding table reset"
        );
    }

    // ── Resolution ────────────────────────────────────────────────────────────

    pub fn resolve(&self, address: &str) -> Result<&Route, RoutingError> {
        self.routing_table
            .resolve(address)
            .ok_or_else(|| RoutingError::NoRoute {
                prefix: address.to_string(),
            })
    }

    pub fn next_hop(&self, address: &str) -> Result<PeerId, RoutingError> {
        self.resolve(address).map(|route| route.next_hop.clone())
    }

    /// Next hop for `address` and the handler that reaches it.
    pub fn handler_for(
        &self,
        address: &str,
    ) -> Result<(PeerId, Arc<dyn RequestHandler>), RoutingError> {
        let peer = self.next_hop(address)?;
        let entry = self
            .registry
            .get(&peer)
            .ok_or_else(|| RoutingError::UnknownPeer { peer: peer.clone() })?;
        let handler = entry
            .handler
            .clone()
            .ok_or_else(|| RoutingError::NoHandler { peer: peer.clone() })?;
        drop(entry);
        Ok((peer, handler))
    }

    /// Forward `payload` to the next hop for `address`.
    pub async fn request(&self, address: &str, payload: Bytes) -> Result<Bytes, RoutingError> {
        let (peer, handler) = self.handler_for(address)?;
        forward(&peer, handler, payload).await
    }
}

/// Call a resolved handler, mapping its failure into the routing taxonomy.
pub async fn forward(
    peer: &str,
    handler: Arc<dyn RequestHandler>,
    payload: Bytes,
) -> Result<Bytes, RoutingError> {
    handler
        .handle_request(payload)
        .await
        .map_err(|e| RoutingError::HandlerFailed {
            peer: peer.to_string(),
            message: format!("{e:#}"),
        })
}
