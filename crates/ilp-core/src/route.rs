//! Route types shared by the routing tables and the CCP state machines.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Identity of a directly connected neighbour.
pub type PeerId = String;

/// Where packets for a prefix go next, and the trail of nodes the
/// advertisement crossed to get here.
///
/// Stored routes are never mutated in place; an update replaces the whole
/// value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub next_hop: PeerId,
    /// Loop-detection trail, nearest node first.
    pub path: Vec<PeerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    /// Opaque credential carried with the route. Passed along, never verified.
    #[serde(default)]
    pub auth: Bytes,
}

impl Route {
    pub fn new(next_hop: impl Into<PeerId>, path: Vec<PeerId>) -> Self {
        Self {
            next_hop: next_hop.into(),
            path,
            weight: None,
            auth: Bytes::new(),
        }
    }

    /// Copy of this route with `hop` prepended to the path.
    pub fn via(&self, hop: &str) -> Self {
        let mut path = Vec::with_capacity(self.path.len() + 1);
        path.push(hop.to_string());
        path.extend(self.path.iter().cloned());
        Self {
            path,
            ..self.clone()
        }
    }
}

/// A route as a neighbour told us about it, before any local policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingRoute {
    pub prefix: String,
    pub path: Vec<PeerId>,
    #[serde(default)]
    pub auth: Bytes,
}

impl IncomingRoute {
    pub fn new(prefix: impl Into<String>, path: Vec<PeerId>) -> Self {
        Self {
            prefix: prefix.into(),
            path,
            auth: Bytes::new(),
        }
    }

    /// The local route this becomes when `peer` is chosen as next hop.
    pub fn to_route(&self, peer: &str) -> Route {
        Route {
            next_hop: peer.to_string(),
            path: self.path.clone(),
            weight: None,
            auth: self.auth.clone(),
        }
    }
}

/// A route as we advertise it to a neighbour, after policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastRoute {
    pub prefix: String,
    pub next_hop: PeerId,
    pub path: Vec<PeerId>,
    #[serde(default)]
    pub auth: Bytes,
}

impl BroadcastRoute {
    pub fn new(prefix: &str, route: &Route) -> Self {
        Self {
            prefix: prefix.to_string(),
            next_hop: route.next_hop.clone(),
            path: route.path.clone(),
            auth: route.auth.clone(),
        }
    }
}

/// Either a live route or an explicit withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteState {
    Present(Route),
    Withdrawn,
}

impl RouteState {
    pub fn route(&self) -> Option<&Route> {
        match self {
            RouteState::Present(route) => Some(route),
            RouteState::Withdrawn => None,
        }
    }

    pub fn next_hop(&self) -> Option<&str> {
        self.route().map(|r| r.next_hop.as_str())
    }

    pub fn is_present(&self) -> bool {
        matches!(self, RouteState::Present(_))
    }
}

impl From<Option<Route>> for RouteState {
    fn from(route: Option<Route>) -> Self {
        match route {
            Some(route) => RouteState::Present(route),
            None => RouteState::Withdrawn,
        }
    }
}

/// One forwarding-table change: the state a prefix moved to and the epoch
/// that change was assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteUpdate {
    pub prefix: String,
    pub state: RouteState,
    pub epoch: u64,
}

impl RouteUpdate {
    pub fn route(&self) -> Option<&Route> {
        self.state.route()
    }

    pub fn next_hop(&self) -> Option<&str> {
        self.state.next_hop()
    }

    /// Same prefix and epoch, route cleared.
    pub fn withdrawn(&self) -> Self {
        Self {
            prefix: self.prefix.clone(),
            state: RouteState::Withdrawn,
            epoch: self.epoch,
        }
    }
}

// ── Relation ──────────────────────────────────────────────────────────────────

/// Topological role of a neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Parent,
    Peer,
    Child,
    Local,
}

impl Relation {
    /// Selection priority. Lower wins among otherwise equal routes.
    pub fn priority(self) -> u8 {
        match self {
            Relation::Parent => 0,
            Relation::Peer => 1,
            Relation::Child => 2,
            Relation::Local => 3,
        }
    }

    /// The relation the other side of the link has with us.
    pub fn inverse(self) -> Self {
        match self {
            Relation::Parent => Relation::Child,
            Relation::Child => Relation::Parent,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Relation::Parent => "parent",
            Relation::Peer => "peer",
            Relation::Child => "child",
            Relation::Local => "local",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown relation: {0}")]
pub struct UnknownRelation(pub String);

impl FromStr for Relation {
    type Err = UnknownRelation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parent" => Ok(Relation::Parent),
            "peer" => Ok(Relation::Peer),
            "child" => Ok(Relation::Child),
            "local" => Ok(Relation::Local),
            other => Err(UnknownRelation(other.to_string())),
        }
    }
}
