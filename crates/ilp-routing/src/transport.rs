//! Capability traits at the edges of the routing core.
//!
//! The core never touches sockets. It sends CCP requests through a
//! [`CcpTransport`] and forwards data requests to a per-peer
//! [`RequestHandler`]. Both are injected at construction.

use bytes::Bytes;
use ilp_core::{CcpReply, CcpRequest};

use crate::error::TransportError;

/// Request/reply exchange with a directly connected neighbour.
///
/// Each call is independent. The transport knows nothing about
/// connection state; an unreachable peer is just a failed send.
#[async_trait::async_trait]
pub trait CcpTransport: Send + Sync {
    async fn send(&self, peer: &str, request: CcpRequest) -> Result<CcpReply, TransportError>;
}

/// Delivers a forwarded data request to one peer.
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle_request(&self, payload: Bytes) -> anyhow::Result<Bytes>;
}
