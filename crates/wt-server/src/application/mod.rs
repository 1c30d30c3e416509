//! Application layer for wt-server.
//!
//! The application layer knows *what* to do with a message, but delegates
//! *how* to send the reply to the infrastructure layer.
//!
//! # Responsibilities
//!
//! - Pulling inbound units from a connection's bridging queue, one at a time
//! - Deciding the reply for each opcode
//! - Defining the [`MessageSink`] seam the infrastructure implements
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or listening for connections (that is infrastructure)
//! - Tokio task spawning (that happens in the infrastructure layer)
//! - WebSocket framing (handled by tokio-tungstenite)

pub mod dispatcher;

pub use dispatcher::{DispatchError, DispatchOutcome, MessageSink, OpcodeDispatcher};
