//! CCP sender: pushes our forwarding table to one neighbour.
//!
//! The neighbour drives the mode with route control requests. While it is
//! in `Sync`, a background task sends one update per deadline: as soon as
//! the minimum interval since the last send has passed when the peer is
//! behind our epoch, as a heartbeat once the broadcast interval has passed
//! otherwise. Deadlines count from the last send, so wake-ups never push a
//! pending update back.
//!
//! The peer's epoch is advanced before the send completes and rolled back
//! if the send fails, times out or is rejected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ilp_core::config::CcpSettings;
use ilp_core::{
    CcpReply, CcpRequest, CcpRoute, Mode, PeerId, Relation, RouteControlRequest, RouteUpdate,
    RouteUpdateRequest,
};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::forwarding_table::SharedForwardingTable;
use crate::registry::{relation_of, PeerRegistry};
use crate::transport::CcpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SenderStatus {
    pub epoch: u64,
    pub mode: Mode,
}

#[derive(Debug, Default)]
struct SenderState {
    mode: Mode,
    /// Our epoch as far as the peer is concerned.
    last_known_epoch: u64,
    last_update_sent_at: Option<Instant>,
}

struct SenderShared {
    peer: PeerId,
    speaker: String,
    forwarding: SharedForwardingTable,
    registry: PeerRegistry,
    transport: Arc<dyn CcpTransport>,
    settings: CcpSettings,
    state: Mutex<SenderState>,
    wake: Notify,
}

pub struct CcpSender {
    shared: Arc<SenderShared>,
    cancel: CancellationToken,
    started: AtomicBool,
}

impl CcpSender {
    pub fn new(
        peer: impl Into<PeerId>,
        speaker: impl Into<String>,
        forwarding: SharedForwardingTable,
        registry: PeerRegistry,
        transport: Arc<dyn CcpTransport>,
        settings: CcpSettings,
    ) -> Self {
        Self {
            shared: Arc::new(SenderShared {
                peer: peer.into(),
                speaker: speaker.into(),
                forwarding,
                registry,
                transport,
                settings,
                state: Mutex::new(SenderState::default()),
                wake: Notify::new(),
            }),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn peer(&self) -> &str {
        &self.shared.peer
    }

    /// Spawn the broadcast task. Later calls are no-ops.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(run(Arc::clone(&self.shared), self.cancel.clone()));
    }

    /// Cancel the broadcast task. An update already in flight completes.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn handle_route_control(&self, request: &RouteControlRequest) {
        self.shared.handle_route_control(request);
    }

    /// Ask the task to recompute its next deadline.
    pub fn schedule_route_update(&self) {
        self.shared.wake.notify_one();
    }

    /// Time until the next update, or `None` while the peer is idle.
    pub fn next_delay(&self) -> Option<Duration> {
        let now = Instant::now();
        self.shared
            .next_deadline(now)
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    pub async fn send_single_route_update(&self) -> Result<(), TransportError> {
        self.shared.send_single_route_update().await
    }

    pub fn filter_routes(&self, updates: &[Option<RouteUpdate>]) -> Vec<RouteUpdate> {
        self.shared.filter_routes(updates)
    }

    pub fn mode(&self) -> Mode {
        self.shared.lock().mode
    }

    pub fn last_known_epoch(&self) -> u64 {
        self.shared.lock().last_known_epoch
    }

    pub fn status(&self) -> SenderStatus {
        let state = self.shared.lock();
        SenderStatus {
            epoch: state.last_known_epoch,
            mode: state.mode,
        }
    }
}

impl Drop for CcpSender {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl SenderShared {
    fn lock(&self) -> MutexGuard<'_, SenderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_route_control(&self, request: &RouteControlRequest) {
        let mut state = self.lock();
        let table_id = self.forwarding.read().routing_table_id();

        if request.last_known_routing_table_id != table_id {
            tracing::debug!(
                peer = %self.peer,
                theirs = %request.last_known_routing_table_id,
                ours = %table_id,
                "peer knows a different routing table, resending from epoch 0"
            );
            state.last_known_epoch = 0;
        } else {
            state.last_known_epoch = request.last_known_epoch;
        }

        if state.mode != request.mode {
            tracing::info!(
                peer = %self.peer,
                mode = ?request.mode,
                epoch = state.last_known_epoch,
                "peer changed route broadcast mode"
            );
        }
        state.mode = request.mode;
        drop(state);

        // Idle or not, the task recomputes; idle parks it.
        self.wake.notify_one();
    }

    /// When the next update is due, never earlier than `now`.
    fn next_deadline(&self, now: Instant) -> Option<Instant> {
        let state = self.lock();
        if state.mode != Mode::Sync {
            return None;
        }
        let Some(sent_at) = state.last_update_sent_at else {
            return Some(now);
        };

        let floor = sent_at + self.settings.min_update_interval();
        let current_epoch = self.forwarding.read().current_epoch();
        let due = if state.last_known_epoch < current_epoch {
            floor
        } else {
            (sent_at + self.settings.route_broadcast_interval()).max(floor)
        };
        Some(due.max(now))
    }

    async fn send_single_route_update(&self) -> Result<(), TransportError> {
        let (request, previous_epoch, to_epoch) = {
            let mut state = self.lock();
            state.last_update_sent_at = Some(Instant::now());

            let table = self.forwarding.read();
            let from_epoch = state.last_known_epoch;
            let slice = table.log_range(from_epoch, self.settings.max_epochs_per_update);
            let to_epoch = from_epoch + slice.len() as u64;

            let mut new_routes = Vec::new();
            let mut withdrawn_routes = Vec::new();
            for update in self.filter_routes(slice) {
                match update.route() {
                    Some(route) => new_routes.push(CcpRoute {
                        prefix: update.prefix.clone(),
                        path: route.path.clone(),
                        auth: route.auth.clone(),
                    }),
                    None => withdrawn_routes.push(update.prefix),
                }
            }

            let request = RouteUpdateRequest {
                speaker: self.speaker.clone(),
                routing_table_id: table.routing_table_id(),
                current_epoch_index: table.current_epoch(),
                from_epoch_index: from_epoch,
                to_epoch_index: to_epoch,
                hold_down_time: self.settings.route_expiry_ms,
                new_routes,
                withdrawn_routes,
            };

            state.last_known_epoch = to_epoch;
            (request, from_epoch, to_epoch)
        };

        tracing::debug!(
            peer = %self.peer,
            from_epoch = previous_epoch,
            to_epoch,
            new_routes = request.new_routes.len(),
            withdrawn_routes = request.withdrawn_routes.len(),
            "sending route update"
        );

        let timeout = self.settings.route_broadcast_interval();
        let outcome = tokio::time::timeout(
            timeout,
            self.transport
                .send(&self.peer, CcpRequest::RouteUpdate(request)),
        )
        .await;

        let result = match outcome {
            Ok(Ok(CcpReply::Ack)) => Ok(()),
            Ok(Ok(CcpReply::Reject { reason })) => Err(TransportError::Rejected(reason)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::Timeout(timeout)),
        };

        if let Err(e) = &result {
            let mut state = self.lock();
            // A route control that arrived meanwhile wins over the rollback.
            if state.last_known_epoch == to_epoch {
                state.last_known_epoch = previous_epoch;
            }
            tracing::debug!(
                peer = %self.peer,
                error = %e,
                epoch = state.last_known_epoch,
                "route update failed, epoch rolled back"
            );
        }
        result
    }

    /// Clear routes this peer must not hear about. Collected log slots are
    /// skipped; cleared updates go out as withdrawals.
    fn filter_routes(&self, updates: &[Option<RouteUpdate>]) -> Vec<RouteUpdate> {
        let peer_relation = relation_of(&self.registry, &self.peer);

        updates
            .iter()
            .flatten()
            .map(|update| {
                let Some(next_hop) = update.next_hop() else {
                    return update.clone();
                };

                if next_hop == self.peer {
                    return update.withdrawn();
                }

                if peer_relation == Some(Relation::Parent) {
                    let hop_relation = relation_of(&self.registry, next_hop);
                    if matches!(hop_relation, Some(Relation::Parent | Relation::Peer)) {
                        tracing::trace!(
                            peer = %self.peer,
                            prefix = %update.prefix,
                            next_hop,
                            "not advertising peer or parent route to parent"
                        );
                        return update.withdrawn();
                    }
                }

                update.clone()
            })
            .collect()
    }
}

async fn run(shared: Arc<SenderShared>, cancel: CancellationToken) {
    tracing::info!(peer = %shared.peer, "route broadcaster started");

    loop {
        let deadline = shared.next_deadline(Instant::now());
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = shared.wake.notified() => continue,
            _ = sleep_until(deadline) => {}
        }

        if let Err(e) = shared.send_single_route_update().await {
            tracing::warn!(peer = %shared.peer, error = %e, "route broadcast failed");
        }
    }

    tracing::info!(peer = %shared.peer, "route broadcaster stopped");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
