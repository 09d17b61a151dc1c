//! Request handler for simulated neighbours: answers with the payload.

use bytes::Bytes;
use ilp_core::PeerId;
use ilp_routing::RequestHandler;

pub struct EchoHandler {
    peer: PeerId,
}

impl EchoHandler {
    pub fn new(peer: &str) -> Self {
        Self {
            peer: peer.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl RequestHandler for EchoHandler {
    async fn handle_request(&self, payload: Bytes) -> anyhow::Result<Bytes> {
        tracing::debug!(peer = %self.peer, bytes = payload.len(), "request delivered");
        Ok(payload)
    }
}
