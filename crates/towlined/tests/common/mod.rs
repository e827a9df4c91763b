//! Shared helpers for the towlined integration tests.
//!
//! Panic-free policy exemption: tests CAN use `.unwrap()` and `.expect()` - this is allowed.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;

use towline_core::{
    BookingId, BookingKind, Coordinates, MemoryStore, Money, NewBooking, ParticipantId, Place,
    Provider, ProviderKind, RideId, Role, Store, VehicleId,
};
use towlined::config::DispatchConfig;
use towlined::dispatch::{DispatchEngine, MatchTicket};
use towlined::registry::{ChannelTransport, ConnectionKey, ConnectionRegistry};

/// Pickup point used by every scenario.
pub const ORIGIN: Coordinates = Coordinates {
    latitude: 40.0,
    longitude: -74.0,
};

/// Upper bound on waiting for a frame. Far above the offer timeout so that
/// paused-time tests always see the offer timer fire first.
const FRAME_WAIT: Duration = Duration::from_secs(600);

/// A tow truck `north_km` kilometres north of `ORIGIN`.
pub fn create_test_tower(id: &str, north_km: f64) -> Provider {
    Provider {
        id: ParticipantId::new(id),
        name: format!("Tower {id}"),
        kind: ProviderKind::Tower,
        location: Some(Coordinates {
            latitude: ORIGIN.latitude + north_km / 111.2,
            longitude: ORIGIN.longitude,
        }),
        available: true,
        earnings: Money::zero(),
        balance: Money::zero(),
    }
}

pub fn create_test_config() -> DispatchConfig {
    DispatchConfig {
        offer_timeout_secs: 30,
        search_radius_m: 15_000.0,
        finalize_retry_ms: 100,
    }
}

/// A participant connected through an in-process transport.
pub struct TestClient {
    pub key: ConnectionKey,
    rx: mpsc::UnboundedReceiver<String>,
}

impl TestClient {
    /// Waits for the next frame and decodes it.
    pub async fn next_frame(&mut self) -> Value {
        let text = timeout(FRAME_WAIT, self.rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("transport closed");
        serde_json::from_str(&text).expect("frame is JSON")
    }

    /// Returns a frame only if one is already queued.
    pub fn try_frame(&mut self) -> Option<Value> {
        self.rx
            .try_recv()
            .ok()
            .map(|text| serde_json::from_str(&text).expect("frame is JSON"))
    }
}

pub async fn connect(registry: &ConnectionRegistry, role: Role, identity: &str) -> TestClient {
    let key = ConnectionKey::new(role, identity);
    let (transport, rx) = ChannelTransport::new();
    registry.register(key.clone(), Arc::new(transport)).await;
    TestClient { key, rx }
}

/// Creates a pending towing booking with its ride.
pub async fn create_test_booking(store: &dyn Store, requester: &str) -> (BookingId, RideId) {
    let place = |lat: f64, lon: f64| Place {
        latitude: lat,
        longitude: lon,
        formatted_address: None,
    };
    let ride = store
        .create_ride(place(ORIGIN.latitude, ORIGIN.longitude), place(40.2, -74.1))
        .await
        .unwrap();
    let booking = store
        .create_booking(NewBooking {
            kind: BookingKind::Towing,
            requester_id: ParticipantId::new(requester),
            vehicle_id: VehicleId::new("vehicle-1"),
            ride_id: Some(ride.id.clone()),
            chat_id: None,
            cost: Money::from_usd(90.0),
            notes: Vec::new(),
        })
        .await
        .unwrap();
    (booking.id, ride.id)
}

pub fn create_test_ticket(booking_id: &BookingId, ride_id: &RideId, requester: &str) -> MatchTicket {
    MatchTicket {
        booking_id: booking_id.clone(),
        requester_id: ParticipantId::new(requester),
        ride_id: ride_id.clone(),
        origin: ORIGIN,
        distance: 12.0,
        price: Money::from_usd(90.0),
    }
}

/// Test fixture: a store with towers, a registry and an engine.
pub struct Dispatch {
    pub store: Arc<MemoryStore>,
    pub registry: ConnectionRegistry,
    pub engine: DispatchEngine,
}

impl Dispatch {
    pub fn new(towers: Vec<Provider>) -> Self {
        Self::with_store(Arc::new(MemoryStore::with_providers(towers)))
    }

    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        let registry = ConnectionRegistry::new();
        let engine = DispatchEngine::new(store.clone(), registry.clone(), create_test_config());
        Self {
            store,
            registry,
            engine,
        }
    }

    /// Waits until the match for `booking_id` has left the pending table.
    pub async fn wait_settled(&self, booking_id: &BookingId) {
        for _ in 0..1_000 {
            if !self.engine.is_pending(booking_id).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("match for {booking_id} never settled");
    }
}

pub fn frame_type(frame: &Value) -> &str {
    frame["type"].as_str().unwrap_or_default()
}
