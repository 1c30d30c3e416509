//! Error types shared by the application and infrastructure layers.
//!
//! The split follows the propagation rules of the server:
//!
//! - [`TransportError`] is what a send can fail with.  It travels back to
//!   whoever asked for the send.
//! - [`ServerError`] is what a public [`WebSocketServer`] operation can fail
//!   with: bind failures, unknown connections, and wrapped send failures.
//!
//! Conditions that are handled locally (a text frame that is not UTF-8, an
//! unknown opcode) are *not* errors; the dispatcher reports them as outcomes.
//!
//! [`WebSocketServer`]: crate::infrastructure::WebSocketServer

use std::net::SocketAddr;

use thiserror::Error;
use wt_core::{ConnectionId, Opcode, StateError};

/// Failure of a single outbound send.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection's writer has shut down; nothing more can be sent.
    #[error("connection closed")]
    Closed,

    /// The WebSocket library rejected or failed the write.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Continuation and reserved opcodes cannot be sent as whole messages.
    #[error("cannot send a message with opcode {0}")]
    UnsupportedOpcode(Opcode),

    /// A text message whose payload is not valid UTF-8.
    #[error("text payload is not valid UTF-8")]
    InvalidText,
}

/// Failure of a public server operation.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound (port in use, missing permission).
    #[error("failed to bind WebSocket listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// `start()` was called on a server that is already listening.
    #[error("listener already started")]
    AlreadyStarted,

    /// The TLS trust policy could not be built.
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// No live connection has this identifier.
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// A send to a live connection failed.
    #[error("send failed: {0}")]
    Send(#[from] TransportError),

    /// The listener lifecycle rejected a transition.
    #[error(transparent)]
    State(#[from] StateError),
}
