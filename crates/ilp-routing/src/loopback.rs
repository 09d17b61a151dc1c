//! In-process CCP transport connecting route managers directly.
//!
//! Every request is encoded with the JSON codec and decoded again on the
//! far side, so nodes behave as they would over a real link. Links can be
//! taken down to simulate failures.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use dashmap::{DashMap, DashSet};
use ilp_core::{CcpReply, CcpRequest, PeerId};

use crate::error::TransportError;
use crate::manager::RouteManager;
use crate::transport::CcpTransport;

pub type SharedRouteManager = Arc<Mutex<RouteManager>>;

#[derive(Default)]
pub struct LoopbackNetwork {
    nodes: DashMap<PeerId, Weak<Mutex<RouteManager>>>,
    /// Directed links that currently drop everything.
    down: DashSet<(PeerId, PeerId)>,
}

impl LoopbackNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Transport used by the node registered as `local`.
    pub fn transport(self: &Arc<Self>, local: &str) -> Arc<dyn CcpTransport> {
        Arc::new(LoopbackTransport {
            network: Arc::clone(self),
            local: local.to_string(),
        })
    }

    pub fn register(&self, id: &str, manager: &SharedRouteManager) {
        self.nodes.insert(id.to_string(), Arc::downgrade(manager));
        tracing::debug!(node = id, "loopback node registered");
    }

    /// Stop delivering to `id`. Requests to it fail from now on.
    pub fn unregister(&self, id: &str) {
        if self.nodes.remove(id).is_some() {
            tracing::debug!(node = id, "loopback node unregistered");
        }
    }

    /// Take the link between `a` and `b` down (both directions) or bring it
    /// back up.
    pub fn set_link_down(&self, a: &str, b: &str, down: bool) {
        for link in [(a.to_string(), b.to_string()), (b.to_string(), a.to_string())] {
            if down {
                self.down.insert(link);
            } else {
                self.down.remove(&link);
            }
        }
        tracing::info!(a, b, down, "loopback link state changed");
    }

    pub fn is_link_down(&self, from: &str, to: &str) -> bool {
        self.down.contains(&(from.to_string(), to.to_string()))
    }

    fn deliver(&self, from: &str, to: &str, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        if self.is_link_down(from, to) {
            return Err(TransportError::Failure(format!("link {from} -> {to} is down")));
        }

        let node = self
            .nodes
            .get(to)
            .and_then(|entry| entry.value().upgrade())
            .ok_or_else(|| TransportError::Failure(format!("no node registered as {to}")))?;

        let request = CcpRequest::from_bytes(request)?;
        let reply = node
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handle_ccp_request(from, request);
        Ok(reply.to_bytes()?)
    }
}

struct LoopbackTransport {
    network: Arc<LoopbackNetwork>,
    local: PeerId,
}

#[async_trait::async_trait]
impl CcpTransport for LoopbackTransport {
    async fn send(&self, peer: &str, request: CcpRequest) -> Result<CcpReply, TransportError> {
        let bytes = request.to_bytes()?;
        let reply = self.network.deliver(&self.local, peer, &bytes)?;
        Ok(CcpReply::from_bytes(&reply)?)
    }
}
