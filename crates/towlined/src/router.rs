//! Channel router.
//!
//! Decodes each inbound frame and hands it to the handler for its channel
//! and type. Frames that do not parse are logged and dropped; the sending
//! client is never told. Handler failures are logged the same way.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use towline_core::{BookingId, NewChatMessage, OfferResponse, ParticipantId, Role, Store, StoreError};
use towline_protocol::{
    parse_frame, ChatPayload, Envelope, FieldAgentMessage, InboundMessage, MessageKind,
    OutboundMessage, ParseError, RequesterMessage, StationMessage,
};

use crate::chat::ChatService;
use crate::dispatch::{DispatchEngine, ResponseOutcome};
use crate::ledger::PaymentLedger;
use crate::registry::{ConnectionKey, ConnectionRegistry};
use crate::telemetry::{LocationReport, TelemetryRelay};

/// Why a frame was dropped before reaching a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    UnknownChannel,
    UnknownType,
    Malformed,
}

/// What happened to one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The handler for `kind` ran to completion.
    Handled(MessageKind),
    /// The frame never reached a handler.
    Dropped(DropReason),
    /// The handler for `kind` ran but a storage call failed.
    Failed(MessageKind),
}

/// Dispatches inbound frames to the chat, telemetry, ledger and dispatch
/// services.
#[derive(Clone)]
pub struct Router {
    registry: ConnectionRegistry,
    chat: ChatService,
    telemetry: TelemetryRelay,
    ledger: PaymentLedger,
    engine: DispatchEngine,
}

impl Router {
    pub fn new(store: Arc<dyn Store>, registry: ConnectionRegistry, engine: DispatchEngine) -> Self {
        Self {
            chat: ChatService::new(Arc::clone(&store), registry.clone()),
            telemetry: TelemetryRelay::new(Arc::clone(&store), registry.clone()),
            ledger: PaymentLedger::new(store),
            registry,
            engine,
        }
    }

    /// Routes one text frame received on the connection `origin`.
    pub async fn route(&self, origin: &ConnectionKey, frame: &str) -> RouteOutcome {
        let envelope = match parse_frame(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                let reason = match &e {
                    ParseError::UnknownChannel(_) => DropReason::UnknownChannel,
                    ParseError::UnknownType { .. } => DropReason::UnknownType,
                    ParseError::InvalidFrame(_) | ParseError::Malformed { .. } => {
                        DropReason::Malformed
                    }
                };
                warn!(origin = %origin, error = %e, "Dropping frame");
                return RouteOutcome::Dropped(reason);
            }
        };

        let kind = envelope.kind();
        debug!(
            origin = %origin,
            channel = %envelope.channel(),
            message_type = %kind,
            "Routing frame"
        );

        match self.dispatch(origin, envelope).await {
            Ok(()) => RouteOutcome::Handled(kind),
            Err(e) => {
                error!(origin = %origin, message_type = %kind, error = %e, "Handler failed");
                RouteOutcome::Failed(kind)
            }
        }
    }

    async fn dispatch(&self, origin: &ConnectionKey, envelope: Envelope) -> Result<(), StoreError> {
        let sender = envelope.sender;

        match envelope.message {
            InboundMessage::Requester(msg) => match msg {
                RequesterMessage::Chat(chat) => {
                    // receiverType is checked during parsing
                    let receiver_role = chat.receiver_type.unwrap_or(Role::FieldAgent);
                    self.relay_chat(chat, receiver_role, Role::Requester).await
                }
                RequesterMessage::Payment(payment) => {
                    self.ledger
                        .apply(&payment.booking_id, &payment.receiver_id, payment.amount)
                        .await?;
                    Ok(())
                }
                RequesterMessage::DataUpdate(data) => {
                    log_only(origin, MessageKind::DataUpdate, &data);
                    Ok(())
                }
                RequesterMessage::Notification(data) => {
                    log_only(origin, MessageKind::Notification, &data);
                    Ok(())
                }
                RequesterMessage::ServiceRequest(data) => {
                    log_only(origin, MessageKind::ServiceRequest, &data);
                    Ok(())
                }
            },

            InboundMessage::FieldAgent(msg) => match msg {
                FieldAgentMessage::Chat(chat) => {
                    self.relay_chat(chat, Role::Requester, Role::FieldAgent).await
                }
                FieldAgentMessage::Location(update) => {
                    let agent_id = update
                        .agent_id
                        .or(sender)
                        .unwrap_or_else(|| origin.identity.clone());
                    self.telemetry
                        .update_location(LocationReport {
                            agent_id,
                            booking_id: update.booking_id,
                            ride_id: update.ride_id,
                            requester_id: update.requester_id,
                            location: update.location,
                        })
                        .await?;
                    Ok(())
                }
                FieldAgentMessage::Availability(update) => {
                    let agent_id = update
                        .agent_id
                        .or(sender)
                        .unwrap_or_else(|| origin.identity.clone());
                    self.telemetry
                        .update_availability(&agent_id, update.is_online, update.location)
                        .await
                }
                FieldAgentMessage::ServiceRequest(reply) => {
                    let agent = sender
                        .or(reply.agent_id)
                        .unwrap_or_else(|| origin.identity.clone());
                    self.answer_offer(agent, reply.booking_id, reply.response).await;
                    Ok(())
                }
                FieldAgentMessage::DataUpdate(data) => {
                    log_only(origin, MessageKind::DataUpdate, &data);
                    Ok(())
                }
                FieldAgentMessage::Notification(data) => {
                    log_only(origin, MessageKind::Notification, &data);
                    Ok(())
                }
            },

            InboundMessage::Station(msg) => match msg {
                StationMessage::Chat(chat) => {
                    self.relay_chat(chat, Role::Requester, Role::StationAgent).await
                }
                StationMessage::DataUpdate(data) => {
                    log_only(origin, MessageKind::DataUpdate, &data);
                    Ok(())
                }
                StationMessage::Notification(data) => {
                    log_only(origin, MessageKind::Notification, &data);
                    Ok(())
                }
            },
        }
    }

    async fn relay_chat(
        &self,
        chat: ChatPayload,
        receiver_role: Role,
        sender_role: Role,
    ) -> Result<(), StoreError> {
        self.chat
            .deliver(
                NewChatMessage {
                    chat_id: chat.chat_id,
                    sender_id: chat.sender_id,
                    receiver_id: chat.receiver_id,
                    text: chat.text,
                },
                receiver_role,
                sender_role,
            )
            .await?;
        Ok(())
    }

    async fn answer_offer(
        &self,
        agent: ParticipantId,
        booking_id: BookingId,
        response: OfferResponse,
    ) {
        let outcome = self.engine.respond(&booking_id, agent.clone(), response).await;
        match outcome {
            ResponseOutcome::AlreadyHandled => {
                self.registry
                    .send(Role::FieldAgent, &agent, &OutboundMessage::already_handled())
                    .await;
            }
            other => {
                info!(booking_id = %booking_id, agent = %agent, outcome = ?other, "Offer answered");
            }
        }
    }
}

fn log_only(origin: &ConnectionKey, kind: MessageKind, data: &serde_json::Value) {
    info!(origin = %origin, message_type = %kind, payload = %data, "Message received");
}
