//! HTTP route handlers.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use towline_core::{Booking, BookingId, ParticipantId, Role};

use super::connection::{ConnectionHandler, MAX_MESSAGE_SIZE};
use super::AppState;
use crate::dispatch::DispatchError;
use crate::intake::{IntakeError, TowingRequest};
use crate::payments::PaymentSetup;
use crate::registry::ConnectionKey;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TowingCreated {
    message: &'static str,
    booking: Booking,
    payment_intent: PaymentSetup,
}

pub(super) async fn ws_connect(
    ws: WebSocketUpgrade,
    Path((role, identity)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Response {
    let Some(role) = Role::parse(&role) else {
        debug!(role = %role, "Rejecting connection with unknown role");
        return error_body(StatusCode::BAD_REQUEST, format!("unknown role: {role}"));
    };
    if identity.trim().is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "missing identity".to_string());
    }

    let key = ConnectionKey::new(role, ParticipantId::new(identity));
    let handler = ConnectionHandler::new(
        key,
        state.registry.clone(),
        state.router.clone(),
        state.cancel_token.clone(),
    )
    .with_keep_alive(state.keep_alive);

    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handler.run(socket))
}

pub(super) async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "connections": state.registry.connection_count().await,
        "pendingMatches": state.engine.pending_count().await,
    }))
}

pub(super) async fn create_towing(
    State(state): State<AppState>,
    Json(request): Json<TowingRequest>,
) -> Response {
    match state.intake.create(request).await {
        Ok(receipt) => (
            StatusCode::CREATED,
            Json(TowingCreated {
                message: "Booking received",
                booking: receipt.booking,
                payment_intent: receipt.payment_intent,
            }),
        )
            .into_response(),
        Err(e) => intake_error(e),
    }
}

pub(super) async fn cancel_towing(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
) -> Response {
    match state.intake.cancel(&BookingId::new(booking_id)).await {
        Ok(true) => Json(json!({ "message": "Booking cancelled successfully" })).into_response(),
        Ok(false) => error_body(StatusCode::CONFLICT, "Booking cannot be cancelled".to_string()),
        Err(e) => intake_error(e),
    }
}

fn intake_error(e: IntakeError) -> Response {
    let status = match &e {
        IntakeError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        IntakeError::Store(err) if err.is_not_found() => StatusCode::NOT_FOUND,
        IntakeError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        IntakeError::Payment(_) => StatusCode::BAD_GATEWAY,
        IntakeError::Dispatch(DispatchError::AlreadyPending(_)) => StatusCode::CONFLICT,
        IntakeError::Dispatch(DispatchError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        IntakeError::Resolving(_) => StatusCode::CONFLICT,
    };
    if status.is_server_error() {
        warn!(error = %e, "Towing request failed");
    }
    error_body(status, e.to_string())
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
