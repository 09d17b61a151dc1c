//! Route-manager view of one neighbour.
//!
//! A peer carries its configured (static) routes, and optionally a sender
//! (we broadcast to it) and a receiver (it broadcasts to us). The
//! receiver keeps the routes the neighbour taught us.

use ilp_core::{IncomingRoute, PeerId, PrefixMap, Relation};
use serde::Serialize;

use crate::receiver::{CcpReceiver, ReceiverStatus};
use crate::sender::{CcpSender, SenderStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerStatus {
    pub id: PeerId,
    pub relation: Relation,
    pub static_routes: usize,
    pub learned_routes: usize,
    pub sender: Option<SenderStatus>,
    pub receiver: Option<ReceiverStatus>,
}

pub struct Peer {
    id: PeerId,
    relation: Relation,
    routes: PrefixMap<IncomingRoute>,
    sender: Option<CcpSender>,
    receiver: Option<CcpReceiver>,
}

impl Peer {
    pub fn new(id: impl Into<PeerId>, relation: Relation) -> Self {
        Self {
            id: id.into(),
            relation,
            routes: PrefixMap::new(),
            sender: None,
            receiver: None,
        }
    }

    pub fn with_sender(mut self, sender: CcpSender) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_receiver(mut self, receiver: CcpReceiver) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn relation(&self) -> Relation {
        self.relation
    }

    pub fn sender(&self) -> Option<&CcpSender> {
        self.sender.as_ref()
    }

    pub fn receiver(&self) -> Option<&CcpReceiver> {
        self.receiver.as_ref()
    }

    /// Store a configured route. Returns whether anything changed.
    pub fn insert_route(&mut self, route: IncomingRoute) -> bool {
        let prefix = route.prefix.clone();
        self.routes.insert(&prefix, route.clone()) != Some(route)
    }

    pub fn delete_route(&mut self, prefix: &str) -> bool {
        self.routes.remove(prefix).is_some()
    }

    pub fn static_route(&self, prefix: &str) -> Option<&IncomingRoute> {
        self.routes.get(prefix)
    }

    pub fn learned_route(&self, prefix: &str) -> Option<IncomingRoute> {
        self.receiver.as_ref()?.get_prefix(prefix)
    }

    /// Configured route for `prefix`, else the one the neighbour sent.
    pub fn get_prefix(&self, prefix: &str) -> Option<IncomingRoute> {
        self.static_route(prefix)
            .cloned()
            .or_else(|| self.learned_route(prefix))
    }

    /// Every prefix this peer can reach, configured or learned.
    pub fn get_prefixes(&self) -> Vec<String> {
        let mut prefixes = self.routes.keys();
        if let Some(receiver) = &self.receiver {
            prefixes.extend(receiver.prefixes());
        }
        prefixes.sort();
        prefixes.dedup();
        prefixes
    }

    pub fn start(&self) {
        if let Some(sender) = &self.sender {
            sender.start();
        }
        if let Some(receiver) = &self.receiver {
            receiver.start();
        }
    }

    pub fn stop(&self) {
        if let Some(sender) = &self.sender {
            sender.stop();
        }
        if let Some(receiver) = &self.receiver {
            receiver.stop();
        }
    }

    pub fn status(&self) -> PeerStatus {
        PeerStatus {
            id: self.id.clone(),
            relation: self.relation,
            static_routes: self.routes.len(),
            learned_routes: self.receiver.as_ref().map_or(0, |r| r.prefixes().len()),
            sender: self.sender.as_ref().map(CcpSender::status),
            receiver: self.receiver.as_ref().map(CcpReceiver::status),
        }
    }
}
