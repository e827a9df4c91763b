//! Payment collaborator.
//!
//! Creating a towing request also sets up a card payment for the requester.
//! The daemon only needs the client-side tokens back; capturing the payment
//! happens between the client and the processor.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use towline_core::{Money, ParticipantId};

/// Errors from the payment processor.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PaymentError {
    #[error("Payment declined: {0}")]
    Declined(String),

    #[error("Payment processor unavailable: {0}")]
    Unavailable(String),
}

/// Tokens the requester app needs to complete a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSetup {
    pub client_secret: String,
    #[serde(rename = "ephemeralKey")]
    pub ephemeral_key: String,
    /// The requester's account reference at the processor.
    #[serde(rename = "stripeId")]
    pub customer_ref: String,
}

/// Creates payment intents with a processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(
        &self,
        requester: &ParticipantId,
        amount: Money,
    ) -> Result<PaymentSetup, PaymentError>;
}

/// Gateway that mints local tokens without contacting a processor.
#[derive(Debug, Default)]
pub struct OfflinePayments {
    counter: AtomicU64,
}

impl OfflinePayments {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentGateway for OfflinePayments {
    async fn create_payment_intent(
        &self,
        requester: &ParticipantId,
        amount: Money,
    ) -> Result<PaymentSetup, PaymentError> {
        if !amount.is_positive() {
            return Err(PaymentError::Declined(format!("invalid amount {amount}")));
        }

        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(requester = %requester, cents = amount.as_cents(), "Offline payment intent created");

        Ok(PaymentSetup {
            client_secret: format!("pi_offline_{n}_secret_{}", amount.as_cents()),
            ephemeral_key: format!("ek_offline_{n}"),
            customer_ref: format!("cus_offline_{requester}"),
        })
    }
}
