//! Outbound sender and the per-connection writer task.
//!
//! # Why a writer task?
//!
//! The write half of a WebSocket stream can only be used by one task at a
//! time.  Instead of sharing it behind a lock, each connection gets a single
//! writer task that owns the sink and serves requests from an `mpsc` channel.
//!
//! Every request carries a `oneshot` completion slot.  The writer fills it
//! once the frame has been handed to the socket (or the write failed), and
//! [`OutboundSender::send`] awaits it.  This turns "submit and get called
//! back when done" into an ordinary `async fn` returning a `Result`.
//!
//! ```text
//!  dispatcher ─┐
//!  facade ─────┼─► OutboundSender ──mpsc──► writer task ──► WebSocket sink
//!              │         ▲                      │
//!              └─────────┴──────── oneshot ◄────┘
//! ```

use std::fmt::Display;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, trace};
use wt_core::{CloseCode, ConnectionId, Opcode, OutboundMessage};

use crate::application::MessageSink;
use crate::domain::TransportError;

/// Capacity of each connection's outbound request channel.
pub const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

/// One queued send: the message plus the slot its result goes into.
#[derive(Debug)]
pub struct OutboundRequest {
    message: OutboundMessage,
    done: oneshot::Sender<Result<(), TransportError>>,
}

/// Awaitable send handle for one connection.
///
/// Cheap to clone; all clones feed the same writer task.
#[derive(Debug, Clone)]
pub struct OutboundSender {
    connection: ConnectionId,
    tx: mpsc::Sender<OutboundRequest>,
}

impl OutboundSender {
    /// Creates a sender together with the receiver its writer task serves.
    pub fn channel(connection: ConnectionId) -> (Self, mpsc::Receiver<OutboundRequest>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        (Self { connection, tx }, rx)
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Builds an [`OutboundMessage`] and sends it.
    ///
    /// # Errors
    ///
    /// [`TransportError::Closed`] if the writer has shut down, or the error
    /// the writer reported for this message.
    pub async fn send(&self, opcode: Opcode, payload: Vec<u8>) -> Result<(), TransportError> {
        self.send_message(OutboundMessage::new(opcode, payload)).await
    }

    /// Sends a pre-built message and waits for the writer's verdict.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_message(&self, message: OutboundMessage) -> Result<(), TransportError> {
        let (done, completion) = oneshot::channel();
        trace!(connection = %self.connection, context = message.context_id, "queueing outbound message");
        self.tx
            .send(OutboundRequest { message, done })
            .await
            .map_err(|_| TransportError::Closed)?;
        // A dropped completion slot means the writer went away mid-request.
        completion.await.map_err(|_| TransportError::Closed)?
    }

    pub async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.send_message(OutboundMessage::text(text)).await
    }

    pub async fn send_binary(&self, data: Vec<u8>) -> Result<(), TransportError> {
        self.send_message(OutboundMessage::binary(data)).await
    }

    pub async fn send_pong(&self) -> Result<(), TransportError> {
        self.send_message(OutboundMessage::pong()).await
    }

    /// Sends a close frame carrying `code`.
    pub async fn send_close(&self, code: CloseCode) -> Result<(), TransportError> {
        self.send_message(OutboundMessage::close(code)).await
    }
}

#[async_trait]
impl MessageSink for OutboundSender {
    async fn transmit(&self, message: OutboundMessage) -> Result<(), TransportError> {
        self.send_message(message).await
    }
}

// ── Writer task ───────────────────────────────────────────────────────────────

/// Serves outbound requests for one connection until every sender is dropped.
///
/// Requests are written in the order they were queued.  A failed write is
/// reported to its requester and does not stop the loop; later requests will
/// fail on their own if the connection is really gone.
pub async fn run_writer<Si>(
    mut sink: Si,
    mut requests: mpsc::Receiver<OutboundRequest>,
    connection: ConnectionId,
) where
    Si: Sink<WsMessage> + Unpin,
    Si::Error: Display,
{
    while let Some(OutboundRequest { message, done }) = requests.recv().await {
        let context = message.context_id;
        let result = match to_ws_message(message) {
            Ok(frame) => sink
                .send(frame)
                .await
                .map_err(|e| TransportError::WebSocket(e.to_string())),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            debug!(%connection, context, "outbound send failed: {e}");
        }
        // The requester may have stopped waiting; that is not our problem.
        let _ = done.send(result);
    }
    debug!(%connection, "writer finished");
}

/// Converts an [`OutboundMessage`] to the tungstenite message type.
///
/// # Errors
///
/// [`TransportError::UnsupportedOpcode`] for continuation and reserved
/// opcodes, [`TransportError::InvalidText`] for non-UTF-8 text.
pub fn to_ws_message(message: OutboundMessage) -> Result<WsMessage, TransportError> {
    match message.opcode {
        Opcode::Text => String::from_utf8(message.payload)
            .map(WsMessage::Text)
            .map_err(|_| TransportError::InvalidText),
        Opcode::Binary => Ok(WsMessage::Binary(message.payload)),
        Opcode::Ping => Ok(WsMessage::Ping(message.payload)),
        Opcode::Pong => Ok(WsMessage::Pong(message.payload)),
        Opcode::Close => Ok(WsMessage::Close(message.close_code.map(|code| CloseFrame {
            code: WsCloseCode::from(u16::from(code)),
            reason: "".into(),
        }))),
        other @ (Opcode::Continuation | Opcode::Unknown(_)) => {
            Err(TransportError::UnsupportedOpcode(other))
        }
    }
}
