//! Towing request intake.
//!
//! The HTTP entry point for a new towing request: it creates the ride, chat
//! and booking records, sets up the requester's payment and hands the
//! booking to the dispatch engine. Cancellation also enters here because an
//! accepted booking is no longer owned by the engine.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use towline_core::{
    Booking, BookingId, BookingKind, BookingStatus, BookingUpdate, Money, NewBooking,
    ParticipantId, Place, RideStatus, Role, Store, StoreError, VehicleId,
};
use towline_protocol::OutboundMessage;

use crate::dispatch::{CancelOutcome, DispatchEngine, DispatchError, MatchTicket};
use crate::payments::{PaymentError, PaymentGateway, PaymentSetup};
use crate::registry::ConnectionRegistry;

/// Errors creating or cancelling a towing request.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Booking {0} is being finalized, try again")]
    Resolving(BookingId),
}

/// Body of `POST /towing`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TowingRequest {
    #[serde(alias = "customerId")]
    pub requester_id: ParticipantId,
    pub vehicle_id: VehicleId,
    /// Pickup point.
    #[serde(alias = "location")]
    pub origin: Place,
    pub destination: Place,
    /// Trip length in miles, as quoted to the requester.
    pub distance: f64,
    pub price: Money,
}

/// Result of a successful intake.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TowingReceipt {
    pub booking: Booking,
    pub payment_intent: PaymentSetup,
}

/// Creates and cancels towing requests.
#[derive(Clone)]
pub struct TowingIntake {
    store: Arc<dyn Store>,
    engine: DispatchEngine,
    registry: ConnectionRegistry,
    payments: Arc<dyn PaymentGateway>,
}

impl TowingIntake {
    pub fn new(
        store: Arc<dyn Store>,
        engine: DispatchEngine,
        registry: ConnectionRegistry,
        payments: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            store,
            engine,
            registry,
            payments,
        }
    }

    /// Records a towing request and starts matching it.
    ///
    /// The returned booking is read back after matching started, so it is
    /// already `Rejected` when no tow truck was in range.
    ///
    /// # Errors
    ///
    /// A payment failure cancels the booking and ride before it is returned.
    pub async fn create(&self, request: TowingRequest) -> Result<TowingReceipt, IntakeError> {
        let origin = request.origin.coordinates();
        if !origin.is_valid() || !request.destination.coordinates().is_valid() {
            return Err(IntakeError::InvalidRequest(
                "pickup and destination must be valid coordinates".to_string(),
            ));
        }
        if !request.price.is_positive() {
            return Err(IntakeError::InvalidRequest("price must be positive".to_string()));
        }

        let notes = vec![format!(
            "Towing from \"{}\" to \"{}\" - ({} Mi)",
            request.origin.label(),
            request.destination.label(),
            request.distance
        )];

        let ride = self
            .store
            .create_ride(request.origin.clone(), request.destination.clone())
            .await?;
        let chat_id = self.store.create_chat().await?;
        let booking = self
            .store
            .create_booking(NewBooking {
                kind: BookingKind::Towing,
                requester_id: request.requester_id.clone(),
                vehicle_id: request.vehicle_id.clone(),
                ride_id: Some(ride.id.clone()),
                chat_id: Some(chat_id),
                cost: request.price,
                notes,
            })
            .await?;

        info!(
            booking_id = %booking.id,
            requester = %request.requester_id,
            price = %request.price,
            "Towing request received"
        );

        let payment_intent = match self
            .payments
            .create_payment_intent(&request.requester_id, request.price)
            .await
        {
            Ok(setup) => setup,
            Err(e) => {
                warn!(booking_id = %booking.id, error = %e, "Payment setup failed, cancelling booking");
                self.store
                    .update_booking(&booking.id, BookingUpdate::status(BookingStatus::Cancelled))
                    .await?;
                self.store.set_ride_status(&ride.id, RideStatus::Cancelled).await?;
                return Err(e.into());
            }
        };

        self.engine
            .start(MatchTicket {
                booking_id: booking.id.clone(),
                requester_id: request.requester_id,
                ride_id: ride.id,
                origin,
                distance: request.distance,
                price: request.price,
            })
            .await?;

        let booking = self.store.booking(&booking.id).await?;
        Ok(TowingReceipt {
            booking,
            payment_intent,
        })
    }

    /// Cancels a booking.
    ///
    /// A booking still being matched is withdrawn from the engine. An
    /// accepted towing booking is cancelled in storage, its tow truck is told
    /// and made available again. Returns false if the booking was already in
    /// a state that cannot be cancelled.
    ///
    /// # Errors
    ///
    /// `IntakeError::Resolving` while the engine is still recording the
    /// match's outcome; storage is not touched.
    pub async fn cancel(&self, booking_id: &BookingId) -> Result<bool, IntakeError> {
        match self.engine.cancel(booking_id).await {
            CancelOutcome::Cancelled { .. } => return Ok(true),
            CancelOutcome::Resolving => return Err(IntakeError::Resolving(booking_id.clone())),
            CancelOutcome::NotPending => {}
        }

        let booking = self.store.booking(booking_id).await?;
        match booking.status {
            BookingStatus::Pending | BookingStatus::Accepted | BookingStatus::Ongoing => {}
            BookingStatus::Completed | BookingStatus::Rejected | BookingStatus::Cancelled => {
                return Ok(false);
            }
        }

        self.store
            .update_booking(booking_id, BookingUpdate::status(BookingStatus::Cancelled))
            .await?;
        if let Some(ride_id) = &booking.ride_id {
            self.store.set_ride_status(ride_id, RideStatus::Cancelled).await?;
        }

        if booking.status == BookingStatus::Accepted && booking.kind == BookingKind::Towing {
            if let Some(agent) = &booking.provider_id {
                self.store.set_provider_availability(agent, true, None).await?;
                self.registry
                    .send(
                        Role::FieldAgent,
                        agent,
                        &OutboundMessage::booking_cancelled(booking_id.clone()),
                    )
                    .await;
            }
        }

        info!(booking_id = %booking_id, previous = ?booking.status, "Booking cancelled");
        Ok(true)
    }
}
