//! ilp-routing: route tables, advertisement policy and the CCP state
//! machines that keep neighbours in sync.
//!
//! Layering, leaves first: [`RoutingTable`] and [`ForwardingRoutingTable`]
//! hold routes; [`Router`] decides what is advertised; [`CcpSender`] and
//! [`CcpReceiver`] exchange forwarding-table diffs with one neighbour each;
//! [`RouteManager`] ties the peers together.

pub mod error;
pub mod forwarding_table;
pub mod loopback;
pub mod manager;
pub mod peer;
pub mod receiver;
pub mod registry;
pub mod router;
pub mod routing_table;
pub mod sender;
pub mod transport;

#[cfg(test)]
mod testing;

pub use error::{RoutingError, TransportError};
pub use forwarding_table::{ForwardingRoutingTable, SharedForwardingTable};
pub use loopback::{LoopbackNetwork, SharedRouteManager};
pub use manager::{RouteManager, RouteManagerStatus};
pub use peer::{Peer, PeerStatus};
pub use receiver::{CcpReceiver, ReceiverStatus};
pub use registry::{new_registry, PeerEntry, PeerRegistry};
pub use router::Router;
pub use routing_table::RoutingTable;
pub use sender::{CcpSender, SenderStatus};
pub use transport::{CcpTransport, RequestHandler};
