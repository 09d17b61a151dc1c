//! Peer registry: who our neighbours are and how to reach them.
//!
//! Shared by the router (handler lookup), the route manager (membership)
//! and every sender (relation lookups while filtering).

use std::sync::Arc;

use dashmap::DashMap;
use ilp_core::{PeerId, Relation};

use crate::transport::RequestHandler;

#[derive(Clone)]
pub struct PeerEntry {
    pub relation: Relation,

    /// Where forwarded requests for this peer go. A peer without one can
    /// still exchange routes but cannot carry traffic.
    pub handler: Option<Arc<dyn RequestHandler>>,
}

impl PeerEntry {
    pub fn new(relation: Relation) -> Self {
        Self {
            relation,
            handler: None,
        }
    }

    pub fn with_handler(relation: Relation, handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            relation,
            handler: Some(handler),
        }
    }
}

impl std::fmt::Debug for PeerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerEntry")
            .field("relation", &self.relation)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// Keyed on peer id.
pub type PeerRegistry = Arc<DashMap<PeerId, PeerEntry>>;

/// Create a new empty peer registry.
pub fn new_registry() -> PeerRegistry {
    Arc::new(DashMap::new())
}

/// Relation of `peer`, if it is registered.
pub fn relation_of(registry: &PeerRegistry, peer: &str) -> Option<Relation> {
    registry.get(peer).map(|entry| entry.relation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registry_creates_empty() {
        let registry = new_registry();
        assert!(registry.is_empty());
        assert_eq!(relation_of(&registry, "harry"), None);
    }

    #[test]
    fn relation_lookup() {
        let registry = new_registry();
        registry.insert("harry".to_string(), PeerEntry::new(Relation::Parent));
        assert_eq!(relation_of(&registry, "harry"), Some(Relation::Parent));
        assert!(format!("{:?}", *registry.get("harry").unwrap()).contains("handler: false"));
    }
}
