//! CCP: the route configuration protocol spoken between neighbours.
//!
//! A receiver asks a sender to start (or stop) broadcasting with a
//! [`RouteControlRequest`]. The sender then pushes [`RouteUpdateRequest`]s,
//! each covering a contiguous range of its forwarding-table epochs. Both
//! requests are answered with a [`CcpReply`].
//!
//! The byte form is JSON. How those bytes travel is the transport's concern.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::route::{BroadcastRoute, IncomingRoute, PeerId};
use crate::table_id::RoutingTableId;

/// Whether a peer currently wants our route broadcasts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Idle,
    Sync,
}

/// Sent by a receiver to tell the sender where it is and what it wants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteControlRequest {
    pub mode: Mode,
    pub last_known_routing_table_id: RoutingTableId,
    pub last_known_epoch: u64,
    /// Optional protocol features. None are supported; ignored on receipt.
    #[serde(default)]
    pub features: Vec<String>,
}

/// A route on the wire. The next hop is implied by who sent it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CcpRoute {
    pub prefix: String,
    pub path: Vec<PeerId>,
    #[serde(default)]
    pub auth: Bytes,
}

impl From<BroadcastRoute> for CcpRoute {
    fn from(route: BroadcastRoute) -> Self {
        Self {
            prefix: route.prefix,
            path: route.path,
            auth: route.auth,
        }
    }
}

impl From<&CcpRoute> for IncomingRoute {
    fn from(route: &CcpRoute) -> Self {
        IncomingRoute {
            prefix: route.prefix.clone(),
            path: route.path.clone(),
            auth: route.auth.clone(),
        }
    }
}

/// Sent by a sender: the changes between two of its epochs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteUpdateRequest {
    /// Address of the node that sent the update.
    pub speaker: String,
    pub routing_table_id: RoutingTableId,
    pub current_epoch_index: u64,
    pub from_epoch_index: u64,
    pub to_epoch_index: u64,
    /// Milliseconds the receiver may keep these routes without a refresh.
    pub hold_down_time: u64,
    pub new_routes: Vec<CcpRoute>,
    pub withdrawn_routes: Vec<String>,
}

impl RouteUpdateRequest {
    /// No routes added or withdrawn; only the epoch range moves.
    pub fn is_heartbeat(&self) -> bool {
        self.new_routes.is_empty() && self.withdrawn_routes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CcpRequest {
    RouteControl(RouteControlRequest),
    RouteUpdate(RouteUpdateRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CcpReply {
    Ack,
    Reject { reason: String },
}

impl CcpRequest {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(CodecError::Encode)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(data).map_err(CodecError::Decode)
    }
}

impl CcpReply {
    pub fn reject(reason: impl Into<String>) -> Self {
        CcpReply::Reject {
            reason: reason.into(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(CodecError::Encode)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(data).map_err(CodecError::Decode)
    }
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// Most epochs a single update may cover.
pub const MAX_EPOCHS_PER_UPDATE: usize = 50;

/// Floor on the delay between scheduled updates to one peer.
pub const MINIMUM_UPDATE_INTERVAL: Duration = Duration::from_millis(150);

/// Delay before a failed route control request is retried.
pub const ROUTE_CONTROL_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Default heartbeat interval, also the per-update send timeout.
pub const DEFAULT_ROUTE_BROADCAST_INTERVAL: Duration = Duration::from_secs(30);

/// Default hold-down time advertised with our updates.
pub const DEFAULT_ROUTE_EXPIRY: Duration = Duration::from_secs(45);

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode ccp message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode ccp message: {0}")]
    Decode(#[source] serde_json::Error),
}
