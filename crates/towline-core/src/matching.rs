//! Request-matching state machine.
//!
//! A `MatchRequest` tracks one towing request while it is offered to nearby
//! tow trucks one at a time. It is pure state: it performs no I/O and knows
//! nothing about timers or connections. The daemon drives it from a single
//! task per booking and turns each `Transition` into storage writes and
//! outbound messages.
//!
//! # States
//!
//! ```text
//!            accept (current candidate)
//!   Pending ─────────────────────────────▶ Accepted
//!      │  ▲
//!      │  │ reject / timeout, next candidate exists
//!      │  └─────────┐
//!      ├────────────┘
//!      │ reject / timeout, queue exhausted
//!      ├─────────────────────────────────▶ Rejected
//!      │ cancel
//!      └─────────────────────────────────▶ Cancelled
//! ```
//!
//! Terminal states never transition again; every later input yields
//! `Transition::Stale`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{BookingId, ParticipantId, RideId};
use crate::money::Money;

/// Lifecycle status of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl MatchStatus {
    /// Returns true for every state except `Pending`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A tow truck's answer to an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferResponse {
    Accept,
    Reject,
}

/// Why an input did not change the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// The match already reached a terminal state.
    AlreadyResolved,
    /// The responding agent is not the one currently holding the offer.
    NotCurrentCandidate,
    /// A timeout fired for an offer that has since been superseded.
    OfferSuperseded,
}

/// Result of applying an input to a `MatchRequest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Offer the request to `agent`; `offer` is its index in the queue.
    Offer { agent: ParticipantId, offer: usize },
    /// `agent` won the request.
    Accepted { agent: ParticipantId },
    /// Every candidate declined or timed out.
    Exhausted,
    /// The request was withdrawn; `offered` held the offer at the time.
    Cancelled { offered: Option<ParticipantId> },
    /// Nothing changed.
    Stale(StaleReason),
}

/// Errors creating a match.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    /// There is nobody to offer the request to.
    #[error("no candidates for booking {0}")]
    NoCandidates(BookingId),
}

/// In-memory state of one towing request being matched.
///
/// # Invariants
///
/// - `candidates` is fixed at creation and contains no duplicates.
/// - `current_offer` never decreases and never exceeds `candidates.len()`.
/// - `resolved_agent` is `Some` iff `status == Accepted`.
#[derive(Debug, Clone)]
pub struct MatchRequest {
    booking_id: BookingId,
    requester_id: ParticipantId,
    ride_id: RideId,
    distance: f64,
    price: Money,
    status: MatchStatus,
    candidates: Vec<ParticipantId>,
    current_offer: usize,
    resolved_agent: Option<ParticipantId>,
}

impl MatchRequest {
    /// Creates a pending match offering to `candidates` in the given order.
    ///
    /// Duplicate candidates are dropped (first occurrence wins) so nobody is
    /// offered the same request twice.
    ///
    /// # Errors
    ///
    /// Returns `MatchError::NoCandidates` when the queue is empty.
    pub fn new(
        booking_id: BookingId,
        requester_id: ParticipantId,
        ride_id: RideId,
        distance: f64,
        price: Money,
        candidates: Vec<ParticipantId>,
    ) -> Result<Self, MatchError> {
        let mut queue: Vec<ParticipantId> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !queue.contains(&candidate) {
                queue.push(candidate);
            }
        }

        if queue.is_empty() {
            return Err(MatchError::NoCandidates(booking_id));
        }

        Ok(Self {
            booking_id,
            requester_id,
            ride_id,
            distance,
            price,
            status: MatchStatus::Pending,
            candidates: queue,
            current_offer: 0,
            resolved_agent: None,
        })
    }

    pub fn booking_id(&self) -> &BookingId {
        &self.booking_id
    }

    pub fn requester_id(&self) -> &ParticipantId {
        &self.requester_id
    }

    pub fn ride_id(&self) -> &RideId {
        &self.ride_id
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn price(&self) -> Money {
        self.price
    }

    pub fn status(&self) -> MatchStatus {
        self.status
    }

    pub fn candidates(&self) -> &[ParticipantId] {
        &self.candidates
    }

    /// Index of the candidate currently holding the offer.
    ///
    /// Equals `candidates().len()` once the queue is exhausted.
    pub fn current_offer(&self) -> usize {
        self.current_offer
    }

    pub fn resolved_agent(&self) -> Option<&ParticipantId> {
        self.resolved_agent.as_ref()
    }

    /// The candidate holding the offer, if the match is still pending.
    pub fn current_candidate(&self) -> Option<&ParticipantId> {
        if self.status.is_terminal() {
            return None;
        }
        self.candidates.get(self.current_offer)
    }

    /// The transition that opens the match: the offer to the first candidate.
    pub fn initial_offer(&self) -> Transition {
        match self.current_candidate() {
            Some(agent) => Transition::Offer {
                agent: agent.clone(),
                offer: self.current_offer,
            },
            None => Transition::Stale(StaleReason::AlreadyResolved),
        }
    }

    /// Applies a tow truck's response.
    pub fn respond(&mut self, agent: &ParticipantId, response: OfferResponse) -> Transition {
        match response {
            OfferResponse::Accept => self.accept(agent),
            OfferResponse::Reject => self.reject(agent),
        }
    }

    /// Applies an acceptance from `agent`.
    ///
    /// Only the current candidate can win; any other accept is stale.
    pub fn accept(&mut self, agent: &ParticipantId) -> Transition {
        if let Some(stale) = self.check_current(agent) {
            return stale;
        }

        self.status = MatchStatus::Accepted;
        self.resolved_agent = Some(agent.clone());
        Transition::Accepted {
            agent: agent.clone(),
        }
    }

    /// Applies a rejection from `agent`, advancing the queue if `agent`
    /// currently holds the offer.
    pub fn reject(&mut self, agent: &ParticipantId) -> Transition {
        if let Some(stale) = self.check_current(agent) {
            return stale;
        }
        self.advance()
    }

    /// Applies a server-side timeout for the offer at index `offer`.
    ///
    /// A timeout for an offer that is no longer current is stale.
    pub fn expire(&mut self, offer: usize) -> Transition {
        if self.status.is_terminal() {
            return Transition::Stale(StaleReason::AlreadyResolved);
        }
        if offer != self.current_offer {
            return Transition::Stale(StaleReason::OfferSuperseded);
        }
        self.advance()
    }

    /// Withdraws a pending match.
    pub fn cancel(&mut self) -> Transition {
        if self.status.is_terminal() {
            return Transition::Stale(StaleReason::AlreadyResolved);
        }
        let offered = self.current_candidate().cloned();
        self.status = MatchStatus::Cancelled;
        Transition::Cancelled { offered }
    }

    fn check_current(&self, agent: &ParticipantId) -> Option<Transition> {
        if self.status.is_terminal() {
            return Some(Transition::Stale(StaleReason::AlreadyResolved));
        }
        if self.current_candidate() != Some(agent) {
            return Some(Transition::Stale(StaleReason::NotCurrentCandidate));
        }
        None
    }

    fn advance(&mut self) -> Transition {
        if self.current_offer < self.candidates.len() {
            self.current_offer += 1;
        }

        match self.candidates.get(self.current_offer) {
            Some(next) => Transition::Offer {
                agent: next.clone(),
                offer: self.current_offer,
            },
            None => {
                self.status = MatchStatus::Rejected;
                Transition::Exhausted
            }
        }
    }
}
