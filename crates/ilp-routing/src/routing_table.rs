//! Local routing table: prefix → route, used for next-hop decisions.
//!
//! No policy lives here. The router decides what goes in.

use ilp_core::{PrefixMap, Route};

#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: PrefixMap<Route>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, prefix: &str, route: Route) -> Option<Route> {
        self.routes.insert(prefix, route)
    }

    pub fn remove(&mut self, prefix: &str) -> Option<Route> {
        self.routes.remove(prefix)
    }

    /// Exact lookup.
    pub fn get(&self, prefix: &str) -> Option<&Route> {
        self.routes.get(prefix)
    }

    /// Longest-prefix lookup for a destination address.
    pub fn resolve(&self, address: &str) -> Option<&Route> {
        self.routes.resolve(address)
    }

    pub fn keys(&self) -> Vec<String> {
        self.routes.keys()
    }

    pub fn keys_starting_with(&self, prefix: &str) -> Vec<String> {
        self.routes.keys_starting_with(prefix)
    }

    pub fn entries(&self) -> Vec<(String, &Route)> {
        self.routes.entries()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_through_prefix_map() {
        let mut table = RoutingTable::new();
        table.insert("g.harry", Route::new("harry", vec![]));
        table.insert("g.harry.sub", Route::new("sally", vec![]));

        assert_eq!(table.resolve("g.harry.sub.x").unwrap().next_hop, "sally");
        assert_eq!(table.resolve("g.harry.other").unwrap().next_hop, "harry");
        assert!(table.resolve("g.sally").is_none());
        assert_eq!(table.len(), 2);

        table.remove("g.harry.sub");
        assert_eq!(table.keys(), vec!["g.harry"]);
    }
}
