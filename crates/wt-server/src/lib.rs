//! wt-server library crate.
//!
//! A WebSocket message server: text and binary messages are echoed back to
//! their sender, pings are answered with a `"pong"` pong, and callers can push
//! messages to any live connection or close them all with a close code.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! WebSocket clients
//!         ↕
//! [wt-server]
//!   ├── domain/           Pure types: ServerConfig, error enums
//!   ├── application/      OpcodeDispatcher: one unit in, one reply out
//!   └── infrastructure/
//!         ├── server/     WebSocketServer facade + accept loop
//!         ├── session/    Per-connection reader and dispatch tasks
//!         ├── outbound/   Writer task + awaitable OutboundSender
//!         ├── registry/   Live connections by id
//!         ├── tls/        Plaintext or rustls trust policy
//!         └── config_file/ TOML loading
//!         ↕
//! [wt-core]  BridgingQueue, ConsumptionSequence, message units, state tracker
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `wt-core` only; it sends through
//!   the [`MessageSink`](application::MessageSink) trait.
//! - `infrastructure` depends on all other layers plus `tokio`,
//!   `tokio-tungstenite` and `tokio-rustls`.
//!
//! # For beginners: why this structure?
//!
//! The reply logic in `application` can be tested with a recording sink and
//! no network at all.  Everything that touches a socket sits in
//! `infrastructure`, where it is tested over in-memory pipes and loopback
//! connections.

/// Domain layer: configuration and error types (no I/O).
pub mod domain;

/// Application layer: opcode dispatch.
pub mod application;

/// Infrastructure layer: listener, sessions, transport, TLS.
pub mod infrastructure;

pub use domain::{ServerConfig, ServerError, TransportError};
pub use infrastructure::WebSocketServer;
