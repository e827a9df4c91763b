//! Match task commands and the outcomes callers observe.

use tokio::sync::oneshot;

use towline_core::{BookingId, MatchStatus, OfferResponse, ParticipantId};

// ============================================================================
// Commands
// ============================================================================

/// Commands processed by a match task, one at a time.
#[derive(Debug)]
pub enum MatchCommand {
    /// A tow truck answered the offer.
    Respond {
        agent: ParticipantId,
        response: OfferResponse,
        respond_to: oneshot::Sender<ResponseOutcome>,
    },

    /// Withdraw the request.
    Cancel {
        respond_to: oneshot::Sender<CancelOutcome>,
    },

    /// Read the current state.
    Snapshot {
        respond_to: oneshot::Sender<MatchSnapshot>,
    },
}

// ============================================================================
// Outcomes
// ============================================================================

/// How a tow truck's answer was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// This answer won the booking. `persisted` is false when the first
    /// storage write failed and is being retried.
    Accepted { persisted: bool },
    /// The answer was a rejection; the request moved on to `next`.
    Advanced { next: ParticipantId },
    /// The answer was a rejection and nobody is left to offer to.
    Exhausted,
    /// The answer had no effect: wrong agent, too late, or unknown booking.
    AlreadyHandled,
}

/// Result of withdrawing a pending request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The match was stopped; `offered` held the offer at that moment.
    Cancelled { offered: Option<ParticipantId> },
    /// There was no pending match for the booking.
    NotPending,
    /// The match already resolved and its outcome is still being written.
    Resolving,
}

/// Where a pending match stands.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSnapshot {
    pub booking_id: BookingId,
    pub requester_id: ParticipantId,
    pub status: MatchStatus,
    pub candidates: Vec<ParticipantId>,
    pub current_offer: usize,
    pub current_candidate: Option<ParticipantId>,
}

/// How a new request started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchStart {
    /// The nearest tow truck was offered the request.
    Offered { agent: ParticipantId, candidates: usize },
    /// Nobody was in range; the booking is already rejected.
    NoCandidates,
}
