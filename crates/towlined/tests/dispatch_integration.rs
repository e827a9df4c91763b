//! Integration tests for the dispatch engine.
//!
//! Offer timeouts run on tokio's paused clock, so a 30 second timeout costs
//! nothing in wall time.
//!
//! Panic-free policy exemption: tests CAN use `.unwrap()` and `.expect()` - this is allowed.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{timeout, Instant};

use towline_core::{
    BookingStatus, MatchStatus, OfferResponse, ParticipantId, RideStatus, Role, Store,
};
use towlined::dispatch::{CancelOutcome, DispatchError, MatchStart, ResponseOutcome};
use towlined::registry::{ConnectionKey, Transport, TransportError};

use common::{
    connect, create_test_booking, create_test_config, create_test_ticket, create_test_tower,
    frame_type, Dispatch,
};

fn agent(id: &str) -> ParticipantId {
    ParticipantId::new(id)
}

// ============================================================================
// Offer sequencing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_reject_then_timeout_then_accept() {
    let fx = Dispatch::new(vec![
        create_test_tower("tower-c", 5.0),
        create_test_tower("tower-a", 1.0),
        create_test_tower("tower-b", 3.0),
    ]);
    let mut customer = connect(&fx.registry, Role::Requester, "cust-1").await;
    let mut tower_a = connect(&fx.registry, Role::FieldAgent, "tower-a").await;
    let mut tower_b = connect(&fx.registry, Role::FieldAgent, "tower-b").await;
    let mut tower_c = connect(&fx.registry, Role::FieldAgent, "tower-c").await;

    let (booking_id, ride_id) = create_test_booking(&*fx.store, "cust-1").await;
    let started = fx
        .engine
        .start(create_test_ticket(&booking_id, &ride_id, "cust-1"))
        .await
        .unwrap();
    assert_eq!(
        started,
        MatchStart::Offered {
            agent: agent("tower-a"),
            candidates: 3
        }
    );

    // Nearest first
    let offer = tower_a.next_frame().await;
    assert_eq!(offer["channel"], "Tower");
    assert_eq!(frame_type(&offer), "serviceRequest");
    assert_eq!(offer["bookingId"], booking_id.as_str());
    assert_eq!(offer["cost"], 90.0);

    // A rejects: B is offered
    let outcome = fx
        .engine
        .respond(&booking_id, agent("tower-a"), OfferResponse::Reject)
        .await;
    assert_eq!(outcome, ResponseOutcome::Advanced { next: agent("tower-b") });
    let offered_b_at = Instant::now();
    assert_eq!(frame_type(&tower_b.next_frame().await), "serviceRequest");

    // B stays silent: after the offer timeout C is offered
    let offer = tower_c.next_frame().await;
    assert_eq!(frame_type(&offer), "serviceRequest");
    assert!(offered_b_at.elapsed() >= Duration::from_secs(30));

    let snapshot = fx.engine.snapshot(&booking_id).await.unwrap();
    assert_eq!(snapshot.current_offer, 2);
    assert_eq!(snapshot.current_candidate, Some(agent("tower-c")));

    // Nobody is offered twice
    assert!(tower_a.try_frame().is_none());
    assert!(tower_b.try_frame().is_none());

    // C accepts
    let outcome = fx
        .engine
        .respond(&booking_id, agent("tower-c"), OfferResponse::Accept)
        .await;
    assert_eq!(outcome, ResponseOutcome::Accepted { persisted: true });

    let accepted = customer.next_frame().await;
    assert_eq!(accepted["channel"], "Customer");
    assert_eq!(accepted["message"], "Your towing request has been accepted");
    assert_eq!(accepted["towerId"], "tower-c");
    let navigation = customer.next_frame().await;
    assert_eq!(frame_type(&navigation), "navigation");
    assert_eq!(navigation["screen"], "/bookings");

    fx.wait_settled(&booking_id).await;

    let booking = fx.store.booking(&booking_id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Accepted);
    assert_eq!(booking.provider_id, Some(agent("tower-c")));
    assert_eq!(fx.store.ride(&ride_id).await.unwrap().status, RideStatus::Accepted);
    assert!(!fx.store.provider(&agent("tower-c")).await.unwrap().available);
    assert!(tower_a.try_frame().is_none());
    assert!(tower_b.try_frame().is_none());
    assert!(tower_c.try_frame().is_none());

    // B's late answer changes nothing
    let late = fx
        .engine
        .respond(&booking_id, agent("tower-b"), OfferResponse::Accept)
        .await;
    assert_eq!(late, ResponseOutcome::AlreadyHandled);
    assert_eq!(
        fx.store.booking(&booking_id).await.unwrap().provider_id,
        Some(agent("tower-c"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_accept_at_offer_deadline_resolves_once() {
    let fx = Dispatch::new(vec![
        create_test_tower("tower-a", 1.0),
        create_test_tower("tower-b", 2.0),
    ]);
    let mut tower_a = connect(&fx.registry, Role::FieldAgent, "tower-a").await;
    let mut tower_b = connect(&fx.registry, Role::FieldAgent, "tower-b").await;

    let (booking_id, ride_id) = create_test_booking(&*fx.store, "cust-1").await;
    fx.engine
        .start(create_test_ticket(&booking_id, &ride_id, "cust-1"))
        .await
        .unwrap();
    assert_eq!(frame_type(&tower_a.next_frame().await), "serviceRequest");

    // The clock reaches A's deadline just as A accepts
    tokio::time::advance(create_test_config().offer_timeout()).await;
    let outcome = fx
        .engine
        .respond(&booking_id, agent("tower-a"), OfferResponse::Accept)
        .await;

    match outcome {
        ResponseOutcome::Accepted { persisted } => {
            assert!(persisted);
            fx.wait_settled(&booking_id).await;
            let booking = fx.store.booking(&booking_id).await.unwrap();
            assert_eq!(booking.status, BookingStatus::Accepted);
            assert_eq!(booking.provider_id, Some(agent("tower-a")));
            assert!(tower_b.try_frame().is_none());
        }
        ResponseOutcome::AlreadyHandled => {
            // The timer won: B holds the offer and A's accept changed nothing
            assert_eq!(frame_type(&tower_b.next_frame().await), "serviceRequest");
            let snapshot = fx.engine.snapshot(&booking_id).await.unwrap();
            assert_eq!(snapshot.status, MatchStatus::Pending);
            assert_eq!(snapshot.current_offer, 1);
            assert_eq!(snapshot.current_candidate, Some(agent("tower-b")));
            let booking = fx.store.booking(&booking_id).await.unwrap();
            assert_eq!(booking.status, BookingStatus::Pending);
            assert_eq!(booking.provider_id, None);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(tower_a.try_frame().is_none());
}

/// Transport whose writes never complete.
struct StalledTransport;

#[async_trait]
impl Transport for StalledTransport {
    async fn send_text(&self, _text: String) -> Result<(), TransportError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_reject_returns_before_next_offer_is_written() {
    let fx = Dispatch::new(vec![
        create_test_tower("tower-a", 1.0),
        create_test_tower("tower-b", 2.0),
    ]);
    fx.registry
        .register(
            ConnectionKey::new(Role::FieldAgent, "tower-b"),
            Arc::new(StalledTransport),
        )
        .await;

    let (booking_id, ride_id) = create_test_booking(&*fx.store, "cust-1").await;
    fx.engine
        .start(create_test_ticket(&booking_id, &ride_id, "cust-1"))
        .await
        .unwrap();

    let outcome = timeout(
        Duration::from_secs(5),
        fx.engine
            .respond(&booking_id, agent("tower-a"), OfferResponse::Reject),
    )
    .await
    .expect("reject blocked on the next offer");
    assert_eq!(outcome, ResponseOutcome::Advanced { next: agent("tower-b") });
}

#[tokio::test(start_paused = true)]
async fn test_every_candidate_times_out() {
    let fx = Dispatch::new(vec![
        create_test_tower("tower-a", 1.0),
        create_test_tower("tower-b", 2.0),
    ]);
    let mut customer = connect(&fx.registry, Role::Requester, "cust-1").await;

    let (booking_id, ride_id) = create_test_booking(&*fx.store, "cust-1").await;
    let started_at = Instant::now();
    fx.engine
        .start(create_test_ticket(&booking_id, &ride_id, "cust-1"))
        .await
        .unwrap();

    let unmatched = customer.next_frame().await;
    assert_eq!(
        unmatched["message"],
        "Your towing request was not accepted by any available towers"
    );
    assert_eq!(frame_type(&customer.next_frame().await), "navigation");
    assert!(started_at.elapsed() >= Duration::from_secs(60));

    fx.wait_settled(&booking_id).await;
    assert_eq!(
        fx.store.booking(&booking_id).await.unwrap().status,
        BookingStatus::Rejected
    );
    assert_eq!(fx.store.ride(&ride_id).await.unwrap().status, RideStatus::Rejected);
}

#[tokio::test(start_paused = true)]
async fn test_last_reject_exhausts_queue() {
    let fx = Dispatch::new(vec![create_test_tower("tower-a", 1.0)]);
    let (booking_id, ride_id) = create_test_booking(&*fx.store, "cust-1").await;
    fx.engine
        .start(create_test_ticket(&booking_id, &ride_id, "cust-1"))
        .await
        .unwrap();

    let outcome = fx
        .engine
        .respond(&booking_id, agent("tower-a"), OfferResponse::Reject)
        .await;
    assert_eq!(outcome, ResponseOutcome::Exhausted);

    fx.wait_settled(&booking_id).await;
    assert_eq!(
        fx.store.booking(&booking_id).await.unwrap().status,
        BookingStatus::Rejected
    );
}

// ============================================================================
// Edge cases
// ============================================================================

#[tokio::test]
async fn test_zero_candidates_rejects_immediately() {
    // Only tower is out of range
    let fx = Dispatch::new(vec![create_test_tower("far-away", 40.0)]);
    let mut customer = connect(&fx.registry, Role::Requester, "cust-1").await;

    let (booking_id, ride_id) = create_test_booking(&*fx.store, "cust-1").await;
    let started = fx
        .engine
        .start(create_test_ticket(&booking_id, &ride_id, "cust-1"))
        .await
        .unwrap();
    assert_eq!(started, MatchStart::NoCandidates);
    assert!(!fx.engine.is_pending(&booking_id).await);

    assert_eq!(
        fx.store.booking(&booking_id).await.unwrap().status,
        BookingStatus::Rejected
    );
    assert_eq!(fx.store.ride(&ride_id).await.unwrap().status, RideStatus::Rejected);

    // Exactly one notification and no navigation hint
    let frame = customer.next_frame().await;
    assert_eq!(frame_type(&frame), "notification");
    assert_eq!(frame["bookingId"], booking_id.as_str());
    assert!(customer.try_frame().is_none());
}

#[tokio::test]
async fn test_unavailable_towers_are_not_candidates() {
    let mut busy = create_test_tower("busy", 1.0);
    busy.available = false;
    let fx = Dispatch::new(vec![busy, create_test_tower("free", 4.0)]);

    let (booking_id, ride_id) = create_test_booking(&*fx.store, "cust-1").await;
    let started = fx
        .engine
        .start(create_test_ticket(&booking_id, &ride_id, "cust-1"))
        .await
        .unwrap();
    assert_eq!(
        started,
        MatchStart::Offered {
            agent: agent("free"),
            candidates: 1
        }
    );
}

#[tokio::test]
async fn test_duplicate_start_is_refused() {
    let fx = Dispatch::new(vec![create_test_tower("tower-a", 1.0)]);
    let (booking_id, ride_id) = create_test_booking(&*fx.store, "cust-1").await;
    let ticket = create_test_ticket(&booking_id, &ride_id, "cust-1");

    fx.engine.start(ticket.clone()).await.unwrap();
    let err = fx.engine.start(ticket).await.unwrap_err();
    assert!(matches!(err, DispatchError::AlreadyPending(id) if id == booking_id));
    assert_eq!(fx.engine.pending_count().await, 1);
}

#[tokio::test]
async fn test_answer_from_non_current_agent_is_ignored() {
    let fx = Dispatch::new(vec![
        create_test_tower("tower-a", 1.0),
        create_test_tower("tower-b", 2.0),
    ]);
    let (booking_id, ride_id) = create_test_booking(&*fx.store, "cust-1").await;
    fx.engine
        .start(create_test_ticket(&booking_id, &ride_id, "cust-1"))
        .await
        .unwrap();

    for response in [OfferResponse::Reject, OfferResponse::Accept] {
        let outcome = fx.engine.respond(&booking_id, agent("tower-b"), response).await;
        assert_eq!(outcome, ResponseOutcome::AlreadyHandled);
    }

    let snapshot = fx.engine.snapshot(&booking_id).await.unwrap();
    assert_eq!(snapshot.status, MatchStatus::Pending);
    assert_eq!(snapshot.current_offer, 0);
}

#[tokio::test]
async fn test_answer_for_unknown_booking() {
    let fx = Dispatch::new(vec![]);
    let outcome = fx
        .engine
        .respond(
            &towline_core::BookingId::new("nope"),
            agent("tower-a"),
            OfferResponse::Accept,
        )
        .await;
    assert_eq!(outcome, ResponseOutcome::AlreadyHandled);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_accepts_commit_once() {
    let towers: Vec<_> = (0..5)
        .map(|i| create_test_tower(&format!("tower-{i}"), 1.0 + i as f64))
        .collect();
    let fx = Arc::new(Dispatch::new(towers));
    let (booking_id, ride_id) = create_test_booking(&*fx.store, "cust-1").await;
    fx.engine
        .start(create_test_ticket(&booking_id, &ride_id, "cust-1"))
        .await
        .unwrap();

    // The current candidate answers several times while every other tower
    // answers too
    let mut handles = Vec::new();
    for i in 0..20 {
        let fx = Arc::clone(&fx);
        let booking_id = booking_id.clone();
        let who = if i % 4 == 0 {
            "tower-0".to_string()
        } else {
            format!("tower-{}", i % 5)
        };
        handles.push(tokio::spawn(async move {
            fx.engine
                .respond(&booking_id, ParticipantId::new(who), OfferResponse::Accept)
                .await
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            ResponseOutcome::Accepted { persisted } => {
                assert!(persisted);
                accepted += 1;
            }
            ResponseOutcome::AlreadyHandled => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(accepted, 1);

    fx.wait_settled(&booking_id).await;
    let booking = fx.store.booking(&booking_id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Accepted);
    assert_eq!(booking.provider_id, Some(agent("tower-0")));
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_pending_match_notifies_offered_tower() {
    let fx = Dispatch::new(vec![create_test_tower("tower-a", 1.0)]);
    let mut tower_a = connect(&fx.registry, Role::FieldAgent, "tower-a").await;
    let (booking_id, ride_id) = create_test_booking(&*fx.store, "cust-1").await;
    fx.engine
        .start(create_test_ticket(&booking_id, &ride_id, "cust-1"))
        .await
        .unwrap();
    assert_eq!(frame_type(&tower_a.next_frame().await), "serviceRequest");

    let outcome = fx.engine.cancel(&booking_id).await;
    assert_eq!(
        outcome,
        CancelOutcome::Cancelled {
            offered: Some(agent("tower-a"))
        }
    );

    let notice = tower_a.next_frame().await;
    assert_eq!(notice["message"], "The booking has been cancelled");

    fx.wait_settled(&booking_id).await;
    assert_eq!(
        fx.store.booking(&booking_id).await.unwrap().status,
        BookingStatus::Cancelled
    );
    assert_eq!(fx.store.ride(&ride_id).await.unwrap().status, RideStatus::Cancelled);

    // Answers after cancellation are stale, a second cancel finds nothing
    let late = fx
        .engine
        .respond(&booking_id, agent("tower-a"), OfferResponse::Accept)
        .await;
    assert_eq!(late, ResponseOutcome::AlreadyHandled);
    assert_eq!(fx.engine.cancel(&booking_id).await, CancelOutcome::NotPending);
}
