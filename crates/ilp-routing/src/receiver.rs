//! CCP receiver: applies one neighbour's route updates.
//!
//! Updates must chain: an update is applied only if its range starts at
//! or before our epoch and ends at or after it. A gap is dropped and the
//! control task is woken to tell the sender where we really are.
//!
//! The control task sends `Sync` until the neighbour acknowledges, retrying
//! on a fixed interval, then parks until a resync is requested.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ilp_core::config::CcpSettings;
use ilp_core::prefix::is_valid_address;
use ilp_core::{
    CcpReply, CcpRequest, IncomingRoute, Mode, PeerId, PrefixMap, RouteControlRequest,
    RouteUpdateRequest, RoutingTableId,
};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::transport::CcpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReceiverStatus {
    pub routing_table_id: RoutingTableId,
    pub epoch: u64,
}

#[derive(Debug, Default)]
struct ReceiverState {
    /// The neighbour's forwarding table as last observed.
    routing_table_id: RoutingTableId,
    epoch: u64,
    /// Hold-down deadline for everything in `routes`.
    expiry: Option<Instant>,
    routes: PrefixMap<IncomingRoute>,
}

struct ReceiverShared {
    peer: PeerId,
    transport: Arc<dyn CcpTransport>,
    settings: CcpSettings,
    state: Mutex<ReceiverState>,
    resync: Notify,
}

pub struct CcpReceiver {
    shared: Arc<ReceiverShared>,
    cancel: CancellationToken,
    started: AtomicBool,
}

impl CcpReceiver {
    pub fn new(
        peer: impl Into<PeerId>,
        transport: Arc<dyn CcpTransport>,
        settings: CcpSettings,
    ) -> Self {
        Self {
            shared: Arc::new(ReceiverShared {
                peer: peer.into(),
                transport,
                settings,
                state: Mutex::new(ReceiverState::default()),
                resync: Notify::new(),
            }),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn peer(&self) -> &str {
        &self.shared.peer
    }

    /// Spawn the control task. Later calls are no-ops.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(run(Arc::clone(&self.shared), self.cancel.clone()));
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wake the control task so it re-announces our position.
    pub fn request_resync(&self) {
        self.shared.resync.notify_one();
    }

    /// Apply an update. Returns every prefix whose route changed:
    /// withdrawals first, then additions, in message order.
    ///
    /// A new routing table id drops everything learned from the old table;
    /// those prefixes lead the list. Past that, gaps, stale updates and
    /// heartbeats change nothing. Malformed prefixes are skipped.
    pub fn handle_route_update(&self, request: &RouteUpdateRequest) -> Vec<String> {
        let mut state = self.shared.lock();
        let peer = &self.shared.peer;

        let deadline = Instant::now() + Duration::from_millis(request.hold_down_time);
        state.expiry = Some(state.expiry.map_or(deadline, |current| current.max(deadline)));

        let mut changed = Vec::new();
        if request.routing_table_id != state.routing_table_id {
            changed = state.routes.keys();
            state.routes.clear();
            tracing::info!(
                %peer,
                old = %state.routing_table_id,
                new = %request.routing_table_id,
                dropped = changed.len(),
                "peer has a new routing table"
            );
            state.routing_table_id = request.routing_table_id;
            state.epoch = 0;
        }

        if request.from_epoch_index > state.epoch {
            tracing::debug!(
                %peer,
                expected = state.epoch,
                from_epoch = request.from_epoch_index,
                "gap in route updates"
            );
            drop(state);
            self.shared.resync.notify_one();
            return changed;
        }

        if state.epoch > request.to_epoch_index {
            tracing::debug!(
                %peer,
                epoch = state.epoch,
                to_epoch = request.to_epoch_index,
                "stale route update"
            );
            return changed;
        }

        if request.is_heartbeat() {
            tracing::trace!(%peer, epoch = request.to_epoch_index, "route heartbeat");
            state.epoch = request.to_epoch_index;
            return changed;
        }

        changed.reserve(request.withdrawn_routes.len() + request.new_routes.len());
        for prefix in &request.withdrawn_routes {
            if !is_valid_address(prefix) {
                tracing::debug!(%peer, %prefix, "ignoring malformed withdrawal");
                continue;
            }
            tracing::trace!(%peer, %prefix, "route withdrawn");
            state.routes.remove(prefix);
            changed.push(prefix.clone());
        }
        for route in &request.new_routes {
            if !is_valid_address(&route.prefix) {
                tracing::debug!(%peer, prefix = %route.prefix, "ignoring malformed route");
                continue;
            }
            tracing::trace!(%peer, prefix = %route.prefix, "route received");
            state.routes.insert(&route.prefix, IncomingRoute::from(route));
            changed.push(route.prefix.clone());
        }
        state.epoch = request.to_epoch_index;

        tracing::debug!(
            %peer,
            changed = changed.len(),
            epoch = state.epoch,
            "applied route update"
        );
        changed
    }

    /// One control attempt. Retrying is the control task's job.
    pub async fn send_route_control(&self) -> Result<(), TransportError> {
        self.shared.send_route_control().await
    }

    /// Drop every route if the hold-down deadline passed by `now`, and ask
    /// the neighbour to resend from scratch. Returns the dropped prefixes.
    pub fn expire(&self, now: Instant) -> Vec<String> {
        let mut state = self.shared.lock();
        match state.expiry {
            Some(deadline) if deadline <= now => {}
            _ => return Vec::new(),
        }

        let dropped = state.routes.keys();
        state.routes.clear();
        state.epoch = 0;
        state.expiry = None;
        drop(state);

        tracing::warn!(
            peer = %self.shared.peer,
            dropped = dropped.len(),
            "routes expired, requesting resync"
        );
        self.shared.resync.notify_one();
        dropped
    }

    pub fn get_prefix(&self, prefix: &str) -> Option<IncomingRoute> {
        self.shared.lock().routes.get(prefix).cloned()
    }

    pub fn prefixes(&self) -> Vec<String> {
        self.shared.lock().routes.keys()
    }

    pub fn routing_table_id(&self) -> RoutingTableId {
        self.shared.lock().routing_table_id
    }

    pub fn epoch(&self) -> u64 {
        self.shared.lock().epoch
    }

    pub fn expiry(&self) -> Option<Instant> {
        self.shared.lock().expiry
    }

    pub fn status(&self) -> ReceiverStatus {
        let state = self.shared.lock();
        ReceiverStatus {
            routing_table_id: state.routing_table_id,
            epoch: state.epoch,
        }
    }
}

impl Drop for CcpReceiver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl ReceiverShared {
    fn lock(&self) -> MutexGuard<'_, ReceiverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn send_route_control(&self) -> Result<(), TransportError> {
        let request = {
            let state = self.lock();
            RouteControlRequest {
                mode: Mode::Sync,
                last_known_routing_table_id: state.routing_table_id,
                last_known_epoch: state.epoch,
                features: Vec::new(),
            }
        };
        tracing::debug!(
            peer = %self.peer,
            routing_table_id = %request.last_known_routing_table_id,
            epoch = request.last_known_epoch,
            "sending route control"
        );

        let timeout = self.settings.route_broadcast_interval();
        let outcome = tokio::time::timeout(
            timeout,
            self.transport
                .send(&self.peer, CcpRequest::RouteControl(request)),
        )
        .await;

        match outcome {
            Ok(Ok(CcpReply::Ack)) => Ok(()),
            Ok(Ok(CcpReply::Reject { reason })) => Err(TransportError::Rejected(reason)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }
}

async fn run(shared: Arc<ReceiverShared>, cancel: CancellationToken) {
    tracing::info!(peer = %shared.peer, "route control started");
    let retry = shared.settings.route_control_retry();

    loop {
        let attempt = tokio::select! {
            _ = cancel.cancelled() => break,
            attempt = shared.send_route_control() => attempt,
        };

        match attempt {
            Ok(()) => {
                tracing::debug!(peer = %shared.peer, "route control acknowledged");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = shared.resync.notified() => {}
                }
            }
            Err(e) => {
                tracing::warn!(
                    peer = %shared.peer,
                    error = %e,
                    retry_in = ?retry,
                    "route control failed"
                );
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(retry) => {}
                    _ = shared.resync.notified() => {}
                }
            }
        }
    }

    tracing::info!(peer = %shared.peer, "route control stopped");
}
