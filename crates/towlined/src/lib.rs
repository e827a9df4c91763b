//! Towline Daemon - Connection registry, channel router and dispatch engine
//!
//! This crate provides the runtime of the towing dispatch daemon:
//! - `registry` - live connection per (role, identity)
//! - `router` - decodes frames and dispatches them by channel and type
//! - `chat`, `telemetry`, `ledger` - the channel handlers
//! - `dispatch` - per-booking match tasks with server-side offer timeouts
//! - `intake` - creation and cancellation of towing requests
//! - `server` - axum HTTP/WebSocket front end
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      towlined daemon                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  DaemonServer   │────▶│   Router                    │   │
//! │  │ (axum, WS+HTTP) │     │ (channel/type dispatch)     │   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             │                   │
//! │           │ register                    │ respond/cancel    │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ConnectionRegistry│◀───│   DispatchEngine            │   │
//! │  │ (role,identity) │send │   (one MatchTask/booking)   │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod chat;
pub mod config;
pub mod dispatch;
pub mod intake;
pub mod ledger;
pub mod payments;
pub mod registry;
pub mod router;
pub mod server;
pub mod telemetry;
