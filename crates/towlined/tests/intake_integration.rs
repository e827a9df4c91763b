//! Integration tests for towing request intake and cancellation.
//!
//! Panic-free policy exemption: tests CAN use `.unwrap()` and `.expect()` - this is allowed.

mod common;

use std::sync::Arc;

use async_trait::async_trait;

use towline_core::{
    BookingId, BookingStatus, MemoryStore, Money, OfferResponse, ParticipantId, Place,
    RideStatus, Role, Store, VehicleId,
};
use towlined::dispatch::ResponseOutcome;
use towlined::intake::{IntakeError, TowingIntake, TowingRequest};
use towlined::payments::{OfflinePayments, PaymentError, PaymentGateway, PaymentSetup};

use common::{connect, create_test_tower, frame_type, Dispatch, ORIGIN};

/// Gateway whose processor is always down.
struct DownPayments;

#[async_trait]
impl PaymentGateway for DownPayments {
    async fn create_payment_intent(
        &self,
        _requester: &ParticipantId,
        _amount: Money,
    ) -> Result<PaymentSetup, PaymentError> {
        Err(PaymentError::Unavailable("connection refused".to_string()))
    }
}

fn create_test_request() -> TowingRequest {
    TowingRequest {
        requester_id: ParticipantId::new("cust-1"),
        vehicle_id: VehicleId::new("vehicle-1"),
        origin: Place {
            latitude: ORIGIN.latitude,
            longitude: ORIGIN.longitude,
            formatted_address: Some("Main St".to_string()),
        },
        destination: Place {
            latitude: 40.2,
            longitude: -74.1,
            formatted_address: Some("Garage Rd".to_string()),
        },
        distance: 12.5,
        price: Money::from_usd(90.0),
    }
}

fn create_test_intake(dispatch: &Dispatch, payments: Arc<dyn PaymentGateway>) -> TowingIntake {
    TowingIntake::new(
        dispatch.store.clone(),
        dispatch.engine.clone(),
        dispatch.registry.clone(),
        payments,
    )
}

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn test_create_records_booking_and_offers() {
    let dispatch = Dispatch::new(vec![create_test_tower("tower-1", 1.0)]);
    let mut tower = connect(&dispatch.registry, Role::FieldAgent, "tower-1").await;
    let intake = create_test_intake(&dispatch, Arc::new(OfflinePayments::new()));

    let receipt = intake.create(create_test_request()).await.unwrap();
    let booking = &receipt.booking;

    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.cost, Money::from_usd(90.0));
    assert_eq!(booking.balance, Money::from_usd(90.0));
    assert!(booking.chat_id.is_some());
    assert_eq!(booking.notes, vec!["Towing from \"Main St\" to \"Garage Rd\" - (12.5 Mi)"]);
    assert!(receipt.payment_intent.client_secret.starts_with("pi_offline_"));
    assert!(dispatch.engine.is_pending(&booking.id).await);

    let offer = tower.next_frame().await;
    assert_eq!(frame_type(&offer), "serviceRequest");
    assert_eq!(offer["bookingId"], booking.id.as_str());
    assert_eq!(offer["distance"], 12.5);
}

#[tokio::test]
async fn test_create_without_towers_is_rejected() {
    let dispatch = Dispatch::new(Vec::new());
    let mut customer = connect(&dispatch.registry, Role::Requester, "cust-1").await;
    let intake = create_test_intake(&dispatch, Arc::new(OfflinePayments::new()));

    let receipt = intake.create(create_test_request()).await.unwrap();
    assert_eq!(receipt.booking.status, BookingStatus::Rejected);
    assert!(!dispatch.engine.is_pending(&receipt.booking.id).await);

    let notice = customer.next_frame().await;
    assert_eq!(frame_type(&notice), "notification");
    assert!(customer.try_frame().is_none());
}

#[tokio::test]
async fn test_create_rejects_invalid_input() {
    let dispatch = Dispatch::new(vec![create_test_tower("tower-1", 1.0)]);
    let intake = create_test_intake(&dispatch, Arc::new(OfflinePayments::new()));

    let mut request = create_test_request();
    request.origin.latitude = 123.0;
    let err = intake.create(request).await.unwrap_err();
    assert!(matches!(err, IntakeError::InvalidRequest(_)));

    let mut request = create_test_request();
    request.price = Money::zero();
    let err = intake.create(request).await.unwrap_err();
    assert!(matches!(err, IntakeError::InvalidRequest(_)));

    assert_eq!(dispatch.store.booking_count().await, 0);
}

#[tokio::test]
async fn test_payment_failure_cancels_booking() {
    let dispatch = Dispatch::new(vec![create_test_tower("tower-1", 1.0)]);
    let mut tower = connect(&dispatch.registry, Role::FieldAgent, "tower-1").await;
    let intake = create_test_intake(&dispatch, Arc::new(DownPayments));

    let err = intake.create(create_test_request()).await.unwrap_err();
    assert!(matches!(err, IntakeError::Payment(PaymentError::Unavailable(_))));

    assert_eq!(dispatch.engine.pending_count().await, 0);
    assert!(tower.try_frame().is_none());
    assert_eq!(dispatch.store.booking_count().await, 1);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_accepted_booking_frees_tower() {
    let dispatch = Dispatch::new(vec![create_test_tower("tower-1", 1.0)]);
    let mut tower = connect(&dispatch.registry, Role::FieldAgent, "tower-1").await;
    let intake = create_test_intake(&dispatch, Arc::new(OfflinePayments::new()));

    let receipt = intake.create(create_test_request()).await.unwrap();
    let booking_id = receipt.booking.id.clone();
    assert_eq!(frame_type(&tower.next_frame().await), "serviceRequest");

    let outcome = dispatch
        .engine
        .respond(&booking_id, ParticipantId::new("tower-1"), OfferResponse::Accept)
        .await;
    assert_eq!(outcome, ResponseOutcome::Accepted { persisted: true });
    dispatch.wait_settled(&booking_id).await;

    let tower_id = ParticipantId::new("tower-1");
    assert!(!dispatch.store.provider(&tower_id).await.unwrap().available);

    assert!(intake.cancel(&booking_id).await.unwrap());

    let booking = dispatch.store.booking(&booking_id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Cancelled);
    let ride = dispatch.store.ride(booking.ride_id.as_ref().unwrap()).await.unwrap();
    assert_eq!(ride.status, RideStatus::Cancelled);
    assert!(dispatch.store.provider(&tower_id).await.unwrap().available);

    let notice = tower.next_frame().await;
    assert_eq!(notice["message"], "The booking has been cancelled");
    assert_eq!(notice["bookingId"], booking_id.as_str());

    // Already cancelled
    assert!(!intake.cancel(&booking_id).await.unwrap());
}

#[tokio::test]
async fn test_cancel_unknown_booking_is_not_found() {
    let dispatch = Dispatch::with_store(Arc::new(MemoryStore::new()));
    let intake = create_test_intake(&dispatch, Arc::new(OfflinePayments::new()));

    let err = intake
        .cancel(&BookingId::new("booking-404"))
        .await
        .unwrap_err();
    assert!(matches!(err, IntakeError::Store(e) if e.is_not_found()));
}
