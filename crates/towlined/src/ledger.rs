//! In-app payment ledger.

use std::sync::Arc;

use tracing::{info, warn};

use towline_core::{Booking, BookingId, Money, ParticipantId, Provider, Store, StoreResult};

/// Result of applying a payment.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub booking: Booking,
    pub provider: Provider,
}

/// Applies requester payments to bookings and provider balances.
#[derive(Clone)]
pub struct PaymentLedger {
    store: Arc<dyn Store>,
}

impl PaymentLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Moves `amount` from the booking's outstanding balance to the provider.
    ///
    /// Returns `None` without writing anything when the booking or provider
    /// does not exist, or the amount is not positive.
    pub async fn apply(
        &self,
        booking_id: &BookingId,
        receiver_id: &ParticipantId,
        amount: Money,
    ) -> StoreResult<Option<Settlement>> {
        if !amount.is_positive() {
            warn!(booking_id = %booking_id, amount = %amount, "Ignoring non-positive payment");
            return Ok(None);
        }

        match self.store.booking(booking_id).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                warn!(booking_id = %booking_id, "Payment for unknown booking");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        match self.store.provider(receiver_id).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                warn!(provider = %receiver_id, "Payment to unknown provider");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        let booking = self.store.record_payment(booking_id, amount).await?;
        let provider = self.store.credit_provider(receiver_id, amount).await?;

        info!(
            booking_id = %booking_id,
            provider = %receiver_id,
            amount = %amount,
            outstanding = %booking.balance,
            "Payment applied"
        );

        Ok(Some(Settlement { booking, provider }))
    }
}
