//! In-process storage backend.
//!
//! `MemoryStore` keeps every record in hash maps behind a single async
//! `RwLock`. It is the reference implementation of `Store`: the standalone
//! daemon seeds it with providers from configuration, and the test suites use
//! it to observe exactly what the dispatch core wrote.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Store, StoreError, StoreResult};
use crate::chat::{ChatMessage, DeliveryStatus, NewChatMessage};
use crate::geo::{Coordinates, Place};
use crate::ids::{BookingId, ChatId, MessageId, ParticipantId, RideId};
use crate::money::Money;
use crate::records::{
    Booking, BookingStatus, BookingUpdate, NewBooking, Provider, ProviderKind, Ride, RideStatus,
};

#[derive(Default)]
struct MemoryState {
    providers: HashMap<ParticipantId, Provider>,
    bookings: HashMap<BookingId, Booking>,
    rides: HashMap<RideId, Ride>,
    chats: HashMap<ChatId, Vec<MessageId>>,
    messages: HashMap<MessageId, ChatMessage>,
}

/// Hash-map backed `Store`.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    next_id: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with providers.
    pub fn with_providers(providers: impl IntoIterator<Item = Provider>) -> Self {
        let mut state = MemoryState::default();
        for provider in providers {
            state.providers.insert(provider.id.clone(), provider);
        }
        Self {
            state: RwLock::new(state),
            next_id: AtomicU64::new(0),
        }
    }

    /// Inserts or replaces a provider record.
    pub async fn insert_provider(&self, provider: Provider) {
        let mut state = self.state.write().await;
        state.providers.insert(provider.id.clone(), provider);
    }

    /// Returns every message in a chat, oldest first.
    pub async fn messages(&self, chat_id: &ChatId) -> Vec<ChatMessage> {
        let state = self.state.read().await;
        state
            .chats
            .get(chat_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.messages.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the number of stored bookings.
    pub async fn booking_count(&self) -> usize {
        self.state.read().await.bookings.len()
    }

    fn allocate(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}-{n}")
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn provider(&self, id: &ParticipantId) -> StoreResult<Provider> {
        let state = self.state.read().await;
        state
            .providers
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("provider", id))
    }

    async fn set_provider_availability(
        &self,
        id: &ParticipantId,
        available: bool,
        location: Option<Coordinates>,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let provider = state
            .providers
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("provider", id))?;
        provider.available = available;
        if location.is_some() {
            provider.location = location;
        }
        Ok(())
    }

    async fn set_provider_location(&self, id: &ParticipantId, location: Coordinates) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let provider = state
            .providers
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("provider", id))?;
        provider.location = Some(location);
        Ok(())
    }

    async fn credit_provider(&self, id: &ParticipantId, amount: Money) -> StoreResult<Provider> {
        let mut state = self.state.write().await;
        let provider = state
            .providers
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("provider", id))?;
        provider.earnings += amount;
        provider.balance += amount;
        Ok(provider.clone())
    }

    async fn nearby_available(
        &self,
        kind: ProviderKind,
        origin: Coordinates,
        radius_m: f64,
    ) -> StoreResult<Vec<ParticipantId>> {
        let state = self.state.read().await;
        let mut nearby: Vec<(f64, ParticipantId)> = state
            .providers
            .values()
            .filter(|p| p.kind == kind && p.available)
            .filter_map(|p| {
                let distance = p.location?.distance_m(&origin);
                (distance <= radius_m).then(|| (distance, p.id.clone()))
            })
            .collect();

        // Nearest first; ties broken by id so the order is deterministic
        nearby.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        debug!(
            kind = ?kind,
            radius_m,
            found = nearby.len(),
            "Nearby provider query"
        );

        Ok(nearby.into_iter().map(|(_, id)| id).collect())
    }

    async fn create_booking(&self, booking: NewBooking) -> StoreResult<Booking> {
        let id = BookingId::new(self.allocate("booking"));
        let record = Booking {
            id: id.clone(),
            kind: booking.kind,
            requester_id: booking.requester_id,
            vehicle_id: booking.vehicle_id,
            provider_id: None,
            ride_id: booking.ride_id,
            chat_id: booking.chat_id,
            status: BookingStatus::Pending,
            cost: booking.cost,
            paid: Money::zero(),
            balance: booking.cost,
            notes: booking.notes,
            created_at: Utc::now(),
        };
        let mut state = self.state.write().await;
        state.bookings.insert(id, record.clone());
        Ok(record)
    }

    async fn booking(&self, id: &BookingId) -> StoreResult<Booking> {
        let state = self.state.read().await;
        state
            .bookings
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("booking", id))
    }

    async fn update_booking(&self, id: &BookingId, update: BookingUpdate) -> StoreResult<Booking> {
        let mut state = self.state.write().await;
        let booking = state
            .bookings
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("booking", id))?;
        if let Some(status) = update.status {
            booking.status = status;
        }
        if let Some(provider_id) = update.provider_id {
            booking.provider_id = Some(provider_id);
        }
        Ok(booking.clone())
    }

    async fn record_payment(&self, id: &BookingId, amount: Money) -> StoreResult<Booking> {
        let mut state = self.state.write().await;
        let booking = state
            .bookings
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("booking", id))?;
        booking.paid += amount;
        if booking.balance.is_positive() {
            booking.balance = booking.balance.saturating_sub_floor(amount);
        }
        Ok(booking.clone())
    }

    async fn create_ride(&self, from: Place, to: Place) -> StoreResult<Ride> {
        let id = RideId::new(self.allocate("ride"));
        let ride = Ride {
            id: id.clone(),
            from,
            to,
            driver: None,
            status: RideStatus::Pending,
        };
        let mut state = self.state.write().await;
        state.rides.insert(id, ride.clone());
        Ok(ride)
    }

    async fn ride(&self, id: &RideId) -> StoreResult<Ride> {
        let state = self.state.read().await;
        state
            .rides
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("ride", id))
    }

    async fn set_ride_status(&self, id: &RideId, status: RideStatus) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let ride = state
            .rides
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("ride", id))?;
        ride.status = status;
        Ok(())
    }

    async fn set_ride_driver(&self, id: &RideId, position: Coordinates) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let ride = state
            .rides
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("ride", id))?;
        ride.driver = Some(position);
        Ok(())
    }

    async fn create_chat(&self) -> StoreResult<ChatId> {
        let id = ChatId::new(self.allocate("chat"));
        let mut state = self.state.write().await;
        state.chats.insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn save_message(&self, message: NewChatMessage) -> StoreResult<ChatMessage> {
        let mut state = self.state.write().await;
        if !state.chats.contains_key(&message.chat_id) {
            return Err(StoreError::not_found("chat", &message.chat_id));
        }

        let id = MessageId::new(self.allocate("message"));
        let stored = ChatMessage {
            id: id.clone(),
            chat_id: message.chat_id.clone(),
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            text: message.text,
            status: DeliveryStatus::Sent,
            sent_at: Utc::now(),
        };

        state.messages.insert(id.clone(), stored.clone());
        if let Some(thread) = state.chats.get_mut(&message.chat_id) {
            thread.push(id);
        }
        Ok(stored)
    }

    async fn set_message_status(&self, id: &MessageId, status: DeliveryStatus) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let message = state
            .messages
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("message", id))?;
        message.status = status;
        Ok(())
    }
}
