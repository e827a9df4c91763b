//! Field-agent telemetry relay.
//!
//! Tow trucks report their position while working a booking and toggle their
//! availability when going on or off duty. Positions are written to storage
//! and forwarded to the requester; availability only touches storage.

use std::sync::Arc;

use tracing::debug;

use towline_core::{
    BookingId, Coordinates, ParticipantId, RideId, Role, Store, StoreResult,
};
use towline_protocol::OutboundMessage;

use crate::registry::ConnectionRegistry;

/// A tow truck's position report for an active booking.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationReport {
    pub agent_id: ParticipantId,
    pub booking_id: BookingId,
    pub ride_id: RideId,
    pub requester_id: ParticipantId,
    pub location: Coordinates,
}

/// Relays tow-truck location and availability.
#[derive(Clone)]
pub struct TelemetryRelay {
    store: Arc<dyn Store>,
    registry: ConnectionRegistry,
}

impl TelemetryRelay {
    pub fn new(store: Arc<dyn Store>, registry: ConnectionRegistry) -> Self {
        Self { store, registry }
    }

    /// Records the truck and ride position, then forwards it to the requester.
    ///
    /// Returns whether the requester received the update. An offline
    /// requester is not an error.
    pub async fn update_location(&self, report: LocationReport) -> StoreResult<bool> {
        self.store
            .set_provider_location(&report.agent_id, report.location)
            .await?;
        self.store
            .set_ride_driver(&report.ride_id, report.location)
            .await?;

        let forwarded = self
            .registry
            .send(
                Role::Requester,
                &report.requester_id,
                &OutboundMessage::Location {
                    location: report.location,
                    booking_id: report.booking_id.clone(),
                    ride_id: report.ride_id.clone(),
                },
            )
            .await;

        debug!(
            agent = %report.agent_id,
            booking_id = %report.booking_id,
            forwarded,
            "Location updated"
        );
        Ok(forwarded)
    }

    /// Sets whether a truck is taking requests, and where it is.
    pub async fn update_availability(
        &self,
        agent_id: &ParticipantId,
        is_online: bool,
        location: Option<Coordinates>,
    ) -> StoreResult<()> {
        self.store
            .set_provider_availability(agent_id, is_online, location)
            .await?;
        debug!(agent = %agent_id, is_online, "Availability updated");
        Ok(())
    }
}
