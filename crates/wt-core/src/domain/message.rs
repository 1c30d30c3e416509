//! Message units flowing into and out of a connection.
//!
//! An [`InboundMessageUnit`] is one de-framed WebSocket message as delivered
//! by the transport.  It carries everything the dispatcher needs (payload,
//! opcode, close code, and the connection it arrived on) as a single value, so
//! the queue never has to track metadata on the side.
//!
//! An [`OutboundMessage`] is the reply shape handed back to the transport.

use uuid::Uuid;

use crate::domain::opcode::{CloseCode, Opcode};

/// Identifier of one accepted WebSocket connection.
///
/// Assigned by the server when the connection is accepted and used as the key
/// of the connection registry.
pub type ConnectionId = Uuid;

/// A single inbound message as delivered by the transport.
///
/// Created once by the per-connection reader and consumed exactly once by the
/// dispatcher.  The fields are private so a unit cannot be altered after it
/// has been built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessageUnit {
    payload: Option<Vec<u8>>,
    opcode: Opcode,
    close_code: Option<CloseCode>,
    source: ConnectionId,
}

impl InboundMessageUnit {
    /// Creates a unit with an explicit payload, opcode, and close code.
    pub fn new(
        source: ConnectionId,
        opcode: Opcode,
        payload: Option<Vec<u8>>,
        close_code: Option<CloseCode>,
    ) -> Self {
        Self {
            payload,
            opcode,
            close_code,
            source,
        }
    }

    /// A text message.  `text` is stored as its UTF-8 bytes.
    pub fn text(source: ConnectionId, text: impl Into<String>) -> Self {
        Self::new(source, Opcode::Text, Some(text.into().into_bytes()), None)
    }

    /// A binary message.
    pub fn binary(source: ConnectionId, data: Vec<u8>) -> Self {
        Self::new(source, Opcode::Binary, Some(data), None)
    }

    /// A ping control frame with its application data.
    pub fn ping(source: ConnectionId, data: Vec<u8>) -> Self {
        Self::new(source, Opcode::Ping, Some(data), None)
    }

    /// A pong control frame with its application data.
    pub fn pong(source: ConnectionId, data: Vec<u8>) -> Self {
        Self::new(source, Opcode::Pong, Some(data), None)
    }

    /// A close frame.  `code` is `None` when the peer sent no status code.
    pub fn close(source: ConnectionId, code: Option<CloseCode>) -> Self {
        Self::new(source, Opcode::Close, None, code)
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn close_code(&self) -> Option<CloseCode> {
        self.close_code
    }

    pub fn source(&self) -> ConnectionId {
        self.source
    }

    /// Number of payload bytes, `0` when there is no payload.
    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map_or(0, Vec::len)
    }
}

// ── Outbound ──────────────────────────────────────────────────────────────────

/// Fixed payload sent in reply to every ping.
pub const PONG_PAYLOAD: &[u8] = b"pong";

/// A reply to be transmitted on one connection.
///
/// `context_id` is a short diagnostic tag ("text", "binary", "pong", "close")
/// that shows up in transport logs; it has no protocol meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub opcode: Opcode,
    pub payload: Vec<u8>,
    pub close_code: Option<CloseCode>,
    pub context_id: &'static str,
}

impl OutboundMessage {
    /// Builds a message with the context tag derived from the opcode.
    pub fn new(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self {
            opcode,
            payload,
            close_code: None,
            context_id: context_id_for(opcode),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Opcode::Text, text.into().into_bytes())
    }

    pub fn binary(data: Vec<u8>) -> Self {
        Self::new(Opcode::Binary, data)
    }

    /// A pong carrying [`PONG_PAYLOAD`].
    pub fn pong() -> Self {
        Self::new(Opcode::Pong, PONG_PAYLOAD.to_vec())
    }

    /// A close frame carrying `code` and no reason text.
    pub fn close(code: CloseCode) -> Self {
        Self {
            close_code: Some(code),
            ..Self::new(Opcode::Close, Vec::new())
        }
    }
}

fn context_id_for(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::Text => "text",
        Opcode::Binary => "binary",
        Opcode::Ping => "ping",
        Opcode::Pong => "pong",
        Opcode::Close => "close",
        Opcode::Continuation => "continuation",
        Opcode::Unknown(_) => "unknown",
    }
}
