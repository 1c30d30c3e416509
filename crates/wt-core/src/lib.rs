//! # wt-core
//!
//! Building blocks of the White-Tipped WebSocket server that do not depend on
//! any socket or transport library.
//!
//! # Architecture overview (for beginners)
//!
//! A WebSocket library delivers messages through callbacks or streams, at
//! whatever pace the network dictates.  The server wants to process them one
//! at a time, in order, and reply to each.  This crate provides the pieces in
//! between:
//!
//! - **`domain`** – what a message is ([`InboundMessageUnit`],
//!   [`OutboundMessage`], [`Opcode`]) and the listener lifecycle
//!   ([`ConnectionStateTracker`]).
//!
//! - **`queue`** – the [`BridgingQueue`], a thread-safe FIFO that the network
//!   side feeds and the processing side drains, and the
//!   [`ConsumptionSequence`] that drains it one item at a time.
//!
//! The `wt-server` crate wires these to tokio-tungstenite.

pub mod domain;
pub mod queue;

// Re-export the most-used types at the crate root so callers can write
// `wt_core::BridgingQueue` instead of `wt_core::queue::bridging::BridgingQueue`.
pub use domain::{
    CloseCode, ConnectionId, ConnectionState, ConnectionStateTracker, InboundMessageUnit,
    ListenerState, Opcode, OutboundMessage, StateError,
};
pub use queue::{BridgingQueue, Claim, ConsumptionSequence, NextResult, SequenceResult};
