//! Forwarding routing table: what we advertise, plus the epoch log.
//!
//! Every change to an advertised prefix is assigned the next epoch and
//! appended to the log at that index. Senders diff a peer's last
//! acknowledged epoch against the log to build updates.
//!
//! Invariants:
//!   - `log.len() == current_epoch`; epochs are never reused.
//!   - `log[e]` is the update that produced epoch `e`, or `None` once a
//!     later update for the same prefix superseded it.
//!   - the live map holds the latest update per prefix, withdrawals included.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ilp_core::{PrefixMap, RouteState, RouteUpdate, RoutingTableId};

#[derive(Debug)]
pub struct ForwardingRoutingTable {
    routing_table_id: RoutingTableId,
    current_epoch: u64,
    log: Vec<Option<RouteUpdate>>,
    routes: PrefixMap<RouteUpdate>,
}

impl Default for ForwardingRoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ForwardingRoutingTable {
    pub fn new() -> Self {
        Self {
            routing_table_id: RoutingTableId::generate(),
            current_epoch: 0,
            log: Vec::new(),
            routes: PrefixMap::new(),
        }
    }

    pub fn routing_table_id(&self) -> RoutingTableId {
        self.routing_table_id
    }

    /// The next epoch to be assigned.
    pub fn current_epoch(&self) -> u64 {
        self.current_epoch
    }

    /// Latest update for exactly `prefix`, withdrawals included.
    pub fn get(&self, prefix: &str) -> Option<&RouteUpdate> {
        self.routes.get(prefix)
    }

    /// Next hop we currently advertise for `prefix`, if any.
    pub fn next_hop(&self, prefix: &str) -> Option<&str> {
        self.get(prefix).and_then(RouteUpdate::next_hop)
    }

    pub fn keys(&self) -> Vec<String> {
        self.routes.keys()
    }

    pub fn keys_starting_with(&self, prefix: &str) -> Vec<String> {
        self.routes.keys_starting_with(prefix)
    }

    /// Assign the next epoch to `state` for `prefix` and log it.
    ///
    /// The log slot of the update this one replaces is cleared.
    pub fn record(&mut self, prefix: &str, state: RouteState) -> u64 {
        let epoch = self.current_epoch;
        self.current_epoch += 1;

        let update = RouteUpdate {
            prefix: prefix.to_string(),
            state,
            epoch,
        };
        if let Some(previous) = self.routes.insert(prefix, update.clone()) {
            if let Some(slot) = self.log.get_mut(previous.epoch as usize) {
                *slot = None;
            }
        }
        self.log.push(Some(update));
        epoch
    }

    pub fn log(&self) -> &[Option<RouteUpdate>] {
        &self.log
    }

    /// Up to `max` log slots starting at epoch `from`.
    pub fn log_range(&self, from: u64, max: usize) -> &[Option<RouteUpdate>] {
        let start = (from as usize).min(self.log.len());
        let end = start.saturating_add(max).min(self.log.len());
        &self.log[start..end]
    }

    /// Start over under a fresh id. Live routes are re-logged from epoch 0
    /// so peers that resync receive the full table; withdrawals are dropped.
    pub fn reset(&mut self) {
        let live: Vec<(String, RouteState)> = self
            .routes
            .entries()
            .into_iter()
            .filter(|(_, update)| update.state.is_present())
            .map(|(prefix, update)| (prefix, update.state.clone()))
            .collect();

        self.routing_table_id = RoutingTableId::generate();
        self.current_epoch = 0;
        self.log.clear();
        self.routes.clear();

        for (prefix, state) in live {
            self.record(&prefix, state);
        }
    }
}

/// The forwarding table shared between the router (writer) and every
/// sender (readers).
#[derive(Debug, Clone, Default)]
pub struct SharedForwardingTable(Arc<RwLock<ForwardingRoutingTable>>);

impl SharedForwardingTable {
    pub fn new(table: ForwardingRoutingTable) -> Self {
        Self(Arc::new(RwLock::new(table)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ForwardingRoutingTable> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ForwardingRoutingTable> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}
