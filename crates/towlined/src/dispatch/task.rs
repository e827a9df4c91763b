//! The match task: sole owner of one `MatchRequest`.
//!
//! Every input for a booking (answers, the offer timer, cancellation and
//! snapshots) is handled here, one at a time, so the losing side of any race
//! sees the state the winner left behind and becomes a no-op.
//!
//! Terminal outcomes are written to storage before anyone is notified and
//! before the pending entry is removed. If a write fails it is retried on a
//! fixed delay; meanwhile every answer is refused as already handled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use towline_core::{
    BookingStatus, BookingUpdate, MatchRequest, ParticipantId, RideStatus, Role, Store,
    StoreResult, Transition,
};
use towline_protocol::OutboundMessage;

use super::commands::{CancelOutcome, MatchCommand, MatchSnapshot, ResponseOutcome};
use super::PendingTable;
use crate::registry::ConnectionRegistry;

/// A resolved match, waiting to be recorded.
#[derive(Debug, Clone, PartialEq)]
enum Terminal {
    Accepted(ParticipantId),
    Exhausted,
    Cancelled(Option<ParticipantId>),
}

enum Step {
    Continue,
    Rearm(Instant),
    Done,
}

pub(super) struct MatchTask {
    request: MatchRequest,
    receiver: mpsc::Receiver<MatchCommand>,
    /// Our own sender, used to recognise our entry in the pending table.
    sender: mpsc::Sender<MatchCommand>,
    store: Arc<dyn Store>,
    registry: ConnectionRegistry,
    pending: PendingTable,
    offer_timeout: Duration,
    finalize_retry: Duration,
}

impl MatchTask {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        request: MatchRequest,
        receiver: mpsc::Receiver<MatchCommand>,
        sender: mpsc::Sender<MatchCommand>,
        store: Arc<dyn Store>,
        registry: ConnectionRegistry,
        pending: PendingTable,
        offer_timeout: Duration,
        finalize_retry: Duration,
    ) -> Self {
        Self {
            request,
            receiver,
            sender,
            store,
            registry,
            pending,
            offer_timeout,
            finalize_retry,
        }
    }

    /// Sends the first offer, then processes inputs until the match resolves.
    pub(super) async fn run(mut self) {
        let mut deadline = match self.request.initial_offer() {
            Transition::Offer { agent, offer } => self.offer(&agent, offer).await,
            other => {
                warn!(
                    booking_id = %self.request.booking_id(),
                    transition = ?other,
                    "Match task started without an offer"
                );
                self.evict().await;
                return;
            }
        };

        loop {
            tokio::select! {
                Some(cmd) = self.receiver.recv() => {
                    match self.handle_command(cmd).await {
                        Step::Continue => {}
                        Step::Rearm(next) => deadline = next,
                        Step::Done => break,
                    }
                }

                _ = sleep_until(deadline) => {
                    match self.handle_timeout().await {
                        Step::Continue => {}
                        Step::Rearm(next) => deadline = next,
                        Step::Done => break,
                    }
                }
            }
        }

        debug!(booking_id = %self.request.booking_id(), "Match task finished");
    }

    async fn handle_command(&mut self, cmd: MatchCommand) -> Step {
        match cmd {
            MatchCommand::Respond {
                agent,
                response,
                respond_to,
            } => match self.request.respond(&agent, response) {
                Transition::Offer { agent: next, offer } => {
                    info!(
                        booking_id = %self.request.booking_id(),
                        agent = %agent,
                        next = %next,
                        "Offer rejected, moving to next tow truck"
                    );
                    let _ = respond_to.send(ResponseOutcome::Advanced { next: next.clone() });
                    Step::Rearm(self.offer(&next, offer).await)
                }
                Transition::Accepted { agent } => {
                    info!(
                        booking_id = %self.request.booking_id(),
                        agent = %agent,
                        "Offer accepted"
                    );
                    self.conclude(Terminal::Accepted(agent), move |persisted| {
                        let _ = respond_to.send(ResponseOutcome::Accepted { persisted });
                    })
                    .await;
                    Step::Done
                }
                Transition::Exhausted => {
                    info!(
                        booking_id = %self.request.booking_id(),
                        agent = %agent,
                        "Last tow truck rejected, request unmatched"
                    );
                    self.conclude(Terminal::Exhausted, move |_| {
                        let _ = respond_to.send(ResponseOutcome::Exhausted);
                    })
                    .await;
                    Step::Done
                }
                stale @ (Transition::Stale(_) | Transition::Cancelled { .. }) => {
                    debug!(
                        booking_id = %self.request.booking_id(),
                        agent = %agent,
                        transition = ?stale,
                        "Ignoring answer"
                    );
                    let _ = respond_to.send(ResponseOutcome::AlreadyHandled);
                    Step::Continue
                }
            },

            MatchCommand::Cancel { respond_to } => match self.request.cancel() {
                Transition::Cancelled { offered } => {
                    info!(
                        booking_id = %self.request.booking_id(),
                        offered = ?offered,
                        "Match cancelled"
                    );
                    let outcome = CancelOutcome::Cancelled {
                        offered: offered.clone(),
                    };
                    self.conclude(Terminal::Cancelled(offered), move |_| {
                        let _ = respond_to.send(outcome);
                    })
                    .await;
                    Step::Done
                }
                _ => {
                    let _ = respond_to.send(CancelOutcome::NotPending);
                    Step::Continue
                }
            },

            MatchCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
                Step::Continue
            }
        }
    }

    async fn handle_timeout(&mut self) -> Step {
        let offer = self.request.current_offer();
        let timed_out = self.request.current_candidate().cloned();

        match self.request.expire(offer) {
            Transition::Offer { agent, offer } => {
                info!(
                    booking_id = %self.request.booking_id(),
                    timed_out = ?timed_out,
                    next = %agent,
                    "Offer timed out, moving to next tow truck"
                );
                Step::Rearm(self.offer(&agent, offer).await)
            }
            Transition::Exhausted => {
                info!(
                    booking_id = %self.request.booking_id(),
                    timed_out = ?timed_out,
                    "Last offer timed out, request unmatched"
                );
                self.conclude(Terminal::Exhausted, |_| {}).await;
                Step::Done
            }
            other => {
                debug!(
                    booking_id = %self.request.booking_id(),
                    transition = ?other,
                    "Ignoring timer"
                );
                Step::Continue
            }
        }
    }

    /// Offers the request to `agent` and returns the new deadline.
    async fn offer(&self, agent: &ParticipantId, offer: usize) -> Instant {
        let message = OutboundMessage::offer(
            self.request.booking_id().clone(),
            self.request.distance(),
            self.request.price(),
        );
        let delivered = self.registry.send(Role::FieldAgent, agent, &message).await;

        debug!(
            booking_id = %self.request.booking_id(),
            agent = %agent,
            offer,
            delivered,
            "Offer sent"
        );

        Instant::now() + self.offer_timeout
    }

    /// Records `terminal`, reports the first attempt through `reply`, retries
    /// until storage accepts it, then notifies and evicts.
    async fn conclude<F>(&mut self, terminal: Terminal, reply: F)
    where
        F: FnOnce(bool),
    {
        let mut attempt = self.persist(&terminal).await;
        reply(attempt.is_ok());

        let mut retries: u32 = 0;
        while let Err(e) = &attempt {
            retries += 1;
            warn!(
                booking_id = %self.request.booking_id(),
                outcome = ?terminal,
                retries,
                error = %e,
                "Failed to record match outcome, retrying"
            );
            self.hold_off().await;
            attempt = self.persist(&terminal).await;
        }

        self.notify(&terminal).await;
        self.evict().await;
    }

    async fn persist(&self, terminal: &Terminal) -> StoreResult<()> {
        let booking_id = self.request.booking_id();
        let ride_id = self.request.ride_id();

        match terminal {
            Terminal::Accepted(agent) => {
                self.store
                    .update_booking(booking_id, BookingUpdate::accepted_by(agent.clone()))
                    .await?;
                self.store.set_ride_status(ride_id, RideStatus::Accepted).await?;
                self.store
                    .set_provider_availability(agent, false, None)
                    .await?;
            }
            Terminal::Exhausted => {
                self.store
                    .update_booking(booking_id, BookingUpdate::status(BookingStatus::Rejected))
                    .await?;
                self.store.set_ride_status(ride_id, RideStatus::Rejected).await?;
            }
            Terminal::Cancelled(_) => {
                self.store
                    .update_booking(booking_id, BookingUpdate::status(BookingStatus::Cancelled))
                    .await?;
                self.store.set_ride_status(ride_id, RideStatus::Cancelled).await?;
            }
        }

        Ok(())
    }

    async fn notify(&self, terminal: &Terminal) {
        let booking_id = self.request.booking_id();
        let requester = self.request.requester_id();

        match terminal {
            Terminal::Accepted(agent) => {
                self.registry
                    .send(
                        Role::Requester,
                        requester,
                        &OutboundMessage::request_accepted(booking_id.clone(), agent.clone()),
                    )
                    .await;
                self.registry
                    .send(Role::Requester, requester, &OutboundMessage::show_bookings())
                    .await;
            }
            Terminal::Exhausted => {
                self.registry
                    .send(
                        Role::Requester,
                        requester,
                        &OutboundMessage::request_unmatched(booking_id.clone()),
                    )
                    .await;
                self.registry
                    .send(Role::Requester, requester, &OutboundMessage::show_bookings())
                    .await;
            }
            Terminal::Cancelled(Some(agent)) => {
                self.registry
                    .send(
                        Role::FieldAgent,
                        agent,
                        &OutboundMessage::booking_cancelled(booking_id.clone()),
                    )
                    .await;
            }
            Terminal::Cancelled(None) => {}
        }
    }

    /// Waits out one retry delay, refusing any input that arrives meanwhile.
    async fn hold_off(&mut self) {
        let until = Instant::now() + self.finalize_retry;
        loop {
            tokio::select! {
                Some(cmd) = self.receiver.recv() => self.refuse(cmd),
                _ = sleep_until(until) => return,
            }
        }
    }

    fn refuse(&self, cmd: MatchCommand) {
        match cmd {
            MatchCommand::Respond { respond_to, .. } => {
                let _ = respond_to.send(ResponseOutcome::AlreadyHandled);
            }
            MatchCommand::Cancel { respond_to } => {
                let _ = respond_to.send(CancelOutcome::Resolving);
            }
            MatchCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
        }
    }

    async fn evict(&self) {
        let mut pending = self.pending.lock().await;
        let ours = pending
            .get(self.request.booking_id())
            .is_some_and(|sender| sender.same_channel(&self.sender));
        if ours {
            pending.remove(self.request.booking_id());
        }
    }

    fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            booking_id: self.request.booking_id().clone(),
            requester_id: self.request.requester_id().clone(),
            status: self.request.status(),
            candidates: self.request.candidates().to_vec(),
            current_offer: self.request.current_offer(),
            current_candidate: self.request.current_candidate().cloned(),
        }
    }
}
