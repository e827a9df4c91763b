//! Dispatch engine: matches towing requests to tow trucks.
//!
//! Each pending request is owned by its own match task. The engine keeps a
//! table from booking id to that task's command channel and turns every
//! external input into a command, so all transitions for one booking are
//! applied strictly in order.
//!
//! # Architecture
//!
//! ```text
//!   POST /towing ──▶ DispatchEngine::start ──spawn──▶ ┌─────────────┐
//!                          │                          │  MatchTask  │──▶ offers,
//!   Tower answer ──▶ DispatchEngine::respond ──cmd──▶ │ (per        │    notifications
//!                          │                          │  booking)   │
//!   cancel ───────▶ DispatchEngine::cancel ───cmd──▶  │  + timer    │──▶ Store
//!                          │                          └──────┬──────┘
//!                          ▼                                 │ evict
//!              Mutex<HashMap<BookingId, Sender>> ◀───────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A closed or missing match task is reported as "already handled"

mod commands;
mod task;

pub use commands::{CancelOutcome, MatchCommand, MatchSnapshot, MatchStart, ResponseOutcome};

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info};

use towline_core::{
    BookingId, BookingStatus, BookingUpdate, Coordinates, MatchError, MatchRequest, Money,
    OfferResponse, ParticipantId, ProviderKind, RideId, RideStatus, Role, Store, StoreError,
};
use towline_protocol::OutboundMessage;

use crate::config::DispatchConfig;
use crate::registry::ConnectionRegistry;
use task::MatchTask;

/// Command buffer per match task.
const COMMAND_BUFFER: usize = 32;

type PendingTable = Arc<Mutex<HashMap<BookingId, mpsc::Sender<MatchCommand>>>>;

/// Errors starting a match.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Booking {0} is already being matched")]
    AlreadyPending(BookingId),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Everything needed to start matching one towing request.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchTicket {
    pub booking_id: BookingId,
    pub requester_id: ParticipantId,
    pub ride_id: RideId,
    pub origin: Coordinates,
    pub distance: f64,
    pub price: Money,
}

/// Shared handle to the matching engine.
#[derive(Clone)]
pub struct DispatchEngine {
    store: Arc<dyn Store>,
    registry: ConnectionRegistry,
    config: DispatchConfig,
    pending: PendingTable,
}

impl DispatchEngine {
    pub fn new(store: Arc<dyn Store>, registry: ConnectionRegistry, config: DispatchConfig) -> Self {
        Self {
            store,
            registry,
            config,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Finds tow trucks near the origin and offers the request to the nearest.
    ///
    /// With nobody in range the booking and ride are rejected at once and the
    /// requester is told; no match is kept.
    ///
    /// # Errors
    ///
    /// - `DispatchError::AlreadyPending` if the booking is already being matched
    /// - `DispatchError::Store` if the candidate query or rejection write fails
    pub async fn start(&self, ticket: MatchTicket) -> Result<MatchStart, DispatchError> {
        if self.is_pending(&ticket.booking_id).await {
            return Err(DispatchError::AlreadyPending(ticket.booking_id));
        }

        let candidates = self
            .store
            .nearby_available(ProviderKind::Tower, ticket.origin, self.config.search_radius_m)
            .await?;

        let request = match MatchRequest::new(
            ticket.booking_id.clone(),
            ticket.requester_id.clone(),
            ticket.ride_id.clone(),
            ticket.distance,
            ticket.price,
            candidates,
        ) {
            Ok(request) => request,
            Err(MatchError::NoCandidates(_)) => {
                self.reject_unmatched(&ticket).await?;
                return Ok(MatchStart::NoCandidates);
            }
        };

        let Some(first) = request.current_candidate().cloned() else {
            self.reject_unmatched(&ticket).await?;
            return Ok(MatchStart::NoCandidates);
        };
        let candidate_count = request.candidates().len();

        let (sender, receiver) = mpsc::channel(COMMAND_BUFFER);
        {
            let mut pending = self.pending.lock().await;
            if pending.contains_key(&ticket.booking_id) {
                return Err(DispatchError::AlreadyPending(ticket.booking_id));
            }
            pending.insert(ticket.booking_id.clone(), sender.clone());
        }

        let task = MatchTask::new(
            request,
            receiver,
            sender,
            Arc::clone(&self.store),
            self.registry.clone(),
            Arc::clone(&self.pending),
            self.config.offer_timeout(),
            self.config.finalize_retry(),
        );
        tokio::spawn(task.run());

        info!(
            booking_id = %ticket.booking_id,
            candidates = candidate_count,
            first = %first,
            "Matching started"
        );

        Ok(MatchStart::Offered {
            agent: first,
            candidates: candidate_count,
        })
    }

    /// Applies a tow truck's answer to the booking's pending match.
    pub async fn respond(
        &self,
        booking_id: &BookingId,
        agent: ParticipantId,
        response: OfferResponse,
    ) -> ResponseOutcome {
        let Some(sender) = self.sender_for(booking_id).await else {
            debug!(booking_id = %booking_id, agent = %agent, "Answer for unknown or resolved booking");
            return ResponseOutcome::AlreadyHandled;
        };

        let (tx, rx) = oneshot::channel();
        let cmd = MatchCommand::Respond {
            agent,
            response,
            respond_to: tx,
        };
        if sender.send(cmd).await.is_err() {
            return ResponseOutcome::AlreadyHandled;
        }

        rx.await.unwrap_or(ResponseOutcome::AlreadyHandled)
    }

    /// Withdraws a pending request.
    ///
    /// Returns `CancelOutcome::Resolving` if the match already resolved and
    /// its outcome is still being written; the caller must not touch the
    /// booking until the match is evicted.
    pub async fn cancel(&self, booking_id: &BookingId) -> CancelOutcome {
        let Some(sender) = self.sender_for(booking_id).await else {
            return CancelOutcome::NotPending;
        };

        let (tx, rx) = oneshot::channel();
        if sender.send(MatchCommand::Cancel { respond_to: tx }).await.is_err() {
            return CancelOutcome::NotPending;
        }

        rx.await.unwrap_or(CancelOutcome::NotPending)
    }

    /// Returns the state of a pending match.
    pub async fn snapshot(&self, booking_id: &BookingId) -> Option<MatchSnapshot> {
        let sender = self.sender_for(booking_id).await?;

        let (tx, rx) = oneshot::channel();
        sender
            .send(MatchCommand::Snapshot { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    /// Returns true while a match for `booking_id` is in the pending table.
    pub async fn is_pending(&self, booking_id: &BookingId) -> bool {
        self.pending.lock().await.contains_key(booking_id)
    }

    /// Number of matches in the pending table.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    async fn sender_for(&self, booking_id: &BookingId) -> Option<mpsc::Sender<MatchCommand>> {
        self.pending.lock().await.get(booking_id).cloned()
    }

    async fn reject_unmatched(&self, ticket: &MatchTicket) -> Result<(), StoreError> {
        self.store
            .update_booking(
                &ticket.booking_id,
                BookingUpdate::status(BookingStatus::Rejected),
            )
            .await?;
        self.store
            .set_ride_status(&ticket.ride_id, RideStatus::Rejected)
            .await?;

        info!(booking_id = %ticket.booking_id, "No tow trucks in range, request rejected");

        self.registry
            .send(
                Role::Requester,
                &ticket.requester_id,
                &OutboundMessage::request_unmatched(ticket.booking_id.clone()),
            )
            .await;

        Ok(())
    }
}
