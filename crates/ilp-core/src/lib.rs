//! ilp-core: shared routing types, CCP messages, and node configuration.
//! All other ILP crates depend on this one.

pub mod ccp;
pub mod config;
pub mod prefix;
pub mod route;
pub mod table_id;

pub use ccp::{CcpReply, CcpRequest, CcpRoute, Mode, RouteControlRequest, RouteUpdateRequest};
pub use prefix::PrefixMap;
pub use route::{BroadcastRoute, IncomingRoute, PeerId, Relation, Route, RouteState, RouteUpdate};
pub use table_id::RoutingTableId;
