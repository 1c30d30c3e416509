//! Per-connection session: reader, dispatch tasks and writer.
//!
//! Once the WebSocket handshake is done, [`run_session`] takes over the
//! stream for the rest of the connection's life:
//!
//! ```text
//!                 ┌──────────── run_session ─────────────┐
//!  socket ──read──► reader loop ──feed──► BridgingQueue   │
//!                 │     │                      │          │
//!                 │     └─spawn─► dispatch task┘ (one per │
//!                 │                   │         delivery) │
//!                 │             OutboundSender            │
//!                 │                   │                   │
//!  socket ◄─write─┤ writer task ◄─────┘                   │
//!                 └───────────────────────────────────────┘
//! ```
//!
//! # For beginners: why spawn one dispatch task per delivery?
//!
//! The reader must never wait for a reply to be written, otherwise a slow
//! client could stall its own reads.  So the reader only feeds the queue and
//! spawns a task that dispatches *one* unit.  The queue's single-flight marker
//! makes those tasks take turns, so the replies still leave in the order the
//! messages arrived.
//!
//! Every delivery feeds exactly one unit and spawns exactly one task, so each
//! task is guaranteed a unit to work on.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use futures_util::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::{JoinError, JoinSet};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;
use wt_core::{
    BridgingQueue, CloseCode, ConnectionId, ConnectionStateTracker, InboundMessageUnit, Opcode,
};

use crate::application::{DispatchError, DispatchOutcome, OpcodeDispatcher};
use crate::infrastructure::outbound::{run_writer, OutboundSender};
use crate::infrastructure::registry::{ConnectionEntry, ConnectionRegistry};

type DispatchResult = Result<DispatchOutcome, DispatchError>;

/// Serves one upgraded connection until the peer goes away.
///
/// Registers the connection, runs the reader loop, then winds down in order:
/// outstanding dispatches are awaited, the connection is unregistered, and
/// the writer is allowed to drain before the function returns.
///
/// # Errors
///
/// Returns an error if reading from the socket failed for any reason other
/// than an orderly close (an oversized message, a protocol violation, I/O).
pub async fn run_session<S>(
    ws: WebSocketStream<S>,
    peer_addr: SocketAddr,
    registry: ConnectionRegistry,
    tracker: Arc<ConnectionStateTracker>,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let id: ConnectionId = Uuid::new_v4();
    let (sink, mut stream) = ws.split();

    let (sender, requests) = OutboundSender::channel(id);
    let writer = tokio::spawn(run_writer(sink, requests, id));

    let queue = Arc::new(BridgingQueue::new());
    let dispatcher = Arc::new(OpcodeDispatcher::new(Arc::new(sender.clone())));

    let pending_close = registry
        .insert(
            id,
            ConnectionEntry {
                peer_addr,
                sender: sender.clone(),
            },
        )
        .await;
    tracker.set_active_connection(id);
    info!(connection = %id, %peer_addr, "connection registered");

    // The server started closing while this connection was still handshaking.
    if let Some(code) = pending_close {
        match sender.send_close(code).await {
            Ok(()) => debug!(connection = %id, %peer_addr, %code, "close frame sent"),
            Err(e) => debug!(connection = %id, %peer_addr, "close frame not sent: {e}"),
        }
    }

    let mut dispatches = JoinSet::new();
    let result = read_loop(&mut stream, id, &queue, &dispatcher, &mut dispatches, &sender).await;

    // ── Wind down ─────────────────────────────────────────────────────────────
    while let Some(joined) = dispatches.join_next().await {
        log_dispatch(id, joined);
    }
    registry.remove(id).await;
    tracker.clear_active_connection(id);

    // The writer stops once the last sender is gone.
    drop(dispatcher);
    drop(sender);
    if let Err(e) = writer.await {
        warn!(connection = %id, "writer task failed: {e}");
    }
    debug!(connection = %id, "session finished");
    result
}

/// Reads messages from `stream` until it ends, feeding each one to `queue`
/// and spawning its dispatch into `dispatches`.
async fn read_loop<St>(
    stream: &mut St,
    id: ConnectionId,
    queue: &Arc<BridgingQueue<InboundMessageUnit>>,
    dispatcher: &Arc<OpcodeDispatcher>,
    dispatches: &mut JoinSet<DispatchResult>,
    sender: &OutboundSender,
) -> anyhow::Result<()>
where
    St: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    loop {
        let message = match stream.next().await {
            Some(Ok(message)) => message,
            None | Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                debug!(connection = %id, "peer closed the connection");
                return Ok(());
            }
            Some(Err(WsError::Capacity(e))) => {
                warn!(connection = %id, "rejecting oversized message: {e}");
                if let Err(send_err) = sender.send_close(CloseCode::MESSAGE_TOO_BIG).await {
                    debug!(connection = %id, "could not send close frame: {send_err}");
                }
                return Err(anyhow!("message too big: {e}"));
            }
            Some(Err(WsError::Protocol(e))) => {
                // Let the dispatcher record an unknown opcode, then give up on
                // the connection; the transport will not read past it.
                if let ProtocolError::UnknownDataFrameType(op)
                | ProtocolError::UnknownControlFrameType(op) = e
                {
                    deliver(
                        InboundMessageUnit::new(id, Opcode::Unknown(op), None, None),
                        queue,
                        dispatcher,
                        dispatches,
                    );
                }
                return Err(anyhow!(e)).context(format!("protocol violation on {id}"));
            }
            Some(Err(e)) => {
                return Err(anyhow!(e)).context(format!("read failed on {id}"));
            }
        };

        trace!(connection = %id, "received {} message", opcode_of(&message));
        deliver(to_unit(id, message), queue, dispatcher, dispatches);

        while let Some(joined) = dispatches.try_join_next() {
            log_dispatch(id, joined);
        }
    }
}

fn deliver(
    unit: InboundMessageUnit,
    queue: &Arc<BridgingQueue<InboundMessageUnit>>,
    dispatcher: &Arc<OpcodeDispatcher>,
    dispatches: &mut JoinSet<DispatchResult>,
) {
    queue.feed([unit]);
    let queue = Arc::clone(queue);
    let dispatcher = Arc::clone(dispatcher);
    dispatches.spawn(async move { dispatcher.dispatch_next(&queue).await });
}

fn log_dispatch(id: ConnectionId, joined: Result<DispatchResult, JoinError>) {
    match joined {
        Ok(Ok(outcome)) => trace!(connection = %id, ?outcome, "dispatch done"),
        Ok(Err(e)) => debug!(connection = %id, "dispatch failed: {e}"),
        Err(e) => warn!(connection = %id, "dispatch task did not finish: {e}"),
    }
}

// ── Message mapping ───────────────────────────────────────────────────────────

/// Converts a tungstenite message into an [`InboundMessageUnit`] from `source`.
pub fn to_unit(source: ConnectionId, message: WsMessage) -> InboundMessageUnit {
    match message {
        WsMessage::Text(text) => InboundMessageUnit::text(source, text),
        WsMessage::Binary(data) => InboundMessageUnit::binary(source, data),
        WsMessage::Ping(data) => InboundMessageUnit::ping(source, data),
        WsMessage::Pong(data) => InboundMessageUnit::pong(source, data),
        WsMessage::Close(frame) => {
            InboundMessageUnit::close(source, frame.map(|f| CloseCode(u16::from(f.code))))
        }
        WsMessage::Frame(frame) => {
            let opcode = Opcode::from(u8::from(frame.header().opcode));
            InboundMessageUnit::new(source, opcode, Some(frame.into_data()), None)
        }
    }
}

fn opcode_of(message: &WsMessage) -> Opcode {
    match message {
        WsMessage::Text(_) => Opcode::Text,
        WsMessage::Binary(_) => Opcode::Binary,
        WsMessage::Ping(_) => Opcode::Ping,
        WsMessage::Pong(_) => Opcode::Pong,
        WsMessage::Close(_) => Opcode::Close,
        WsMessage::Frame(frame) => Opcode::from(u8::from(frame.header().opcode)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures_util::SinkExt;
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
    use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role, WebSocketConfig};

    const WAIT: Duration = Duration::from_secs(5);

    async fn ws_pair(
        server_config: Option<WebSocketConfig>,
    ) -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(a, Role::Server, server_config).await;
        let client = WebSocketStream::from_raw_socket(b, Role::Client, None).await;
        (server, client)
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    // ── to_unit ───────────────────────────────────────────────────────────────

    #[test]
    fn test_to_unit_text() {
        let id = Uuid::new_v4();
        let unit = to_unit(id, WsMessage::Text("hello".into()));
        assert_eq!(unit.opcode(), Opcode::Text);
        assert_eq!(unit.payload(), Some(&b"hello"[..]));
        assert_eq!(unit.source(), id);
    }

    #[test]
    fn test_to_unit_binary_and_ping() {
        let id = Uuid::new_v4();
        assert_eq!(
            to_unit(id, WsMessage::Binary(vec![1, 2, 3])).payload(),
            Some(&[1u8, 2, 3][..])
        );
        assert_eq!(to_unit(id, WsMessage::Ping(vec![])).opcode(), Opcode::Ping);
        assert_eq!(to_unit(id, WsMessage::Pong(vec![])).opcode(), Opcode::Pong);
    }

    #[test]
    fn test_to_unit_close_keeps_code() {
        let id = Uuid::new_v4();
        let unit = to_unit(
            id,
            WsMessage::Close(Some(CloseFrame {
                code: WsCloseCode::Away,
                reason: "".into(),
            })),
        );
        assert_eq!(unit.opcode(), Opcode::Close);
        assert_eq!(unit.close_code(), Some(CloseCode::GOING_AWAY));
    }

    #[test]
    fn test_to_unit_close_without_frame_has_no_code() {
        let unit = to_unit(Uuid::new_v4(), WsMessage::Close(None));
        assert_eq!(unit.close_code(), None);
    }

    // ── run_session ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_session_echoes_text_and_answers_ping() {
        // Arrange
        let (server, mut client) = ws_pair(None).await;
        let registry = ConnectionRegistry::new();
        let tracker = Arc::new(ConnectionStateTracker::new());
        let session = tokio::spawn(run_session(
            server,
            peer(),
            registry.clone(),
            Arc::clone(&tracker),
        ));

        // Act
        client.send(WsMessage::Text("hello".into())).await.unwrap();
        client.send(WsMessage::Ping(b"are you there".to_vec())).await.unwrap();

        // Assert: the echo, our "pong", and the transport's own pong reply.
        let mut received = Vec::new();
        for _ in 0..3 {
            let msg = timeout(WAIT, client.next())
                .await
                .expect("reply must arrive")
                .expect("stream open")
                .expect("valid frame");
            received.push(msg);
        }
        assert!(received.contains(&WsMessage::Text("hello".into())));
        assert!(received.contains(&WsMessage::Pong(b"pong".to_vec())));
        assert_eq!(registry.len().await, 1);
        assert!(tracker.active_connection().is_some());

        client.close(None).await.unwrap();
        timeout(WAIT, session)
            .await
            .expect("session must end")
            .unwrap()
            .expect("orderly close is not an error");
        assert!(registry.is_empty().await);
        assert!(tracker.active_connection().is_none());
    }

    #[tokio::test]
    async fn test_session_replies_in_delivery_order() {
        let (server, mut client) = ws_pair(None).await;
        let session = tokio::spawn(run_session(
            server,
            peer(),
            ConnectionRegistry::new(),
            Arc::new(ConnectionStateTracker::new()),
        ));

        for i in 0..20u8 {
            client.send(WsMessage::Binary(vec![i])).await.unwrap();
        }

        for i in 0..20u8 {
            let msg = timeout(WAIT, client.next()).await.unwrap().unwrap().unwrap();
            assert_eq!(msg, WsMessage::Binary(vec![i]));
        }

        client.close(None).await.unwrap();
        let _ = timeout(WAIT, session).await;
    }

    #[tokio::test]
    async fn test_oversized_message_is_never_echoed() {
        // Arrange: a server that accepts at most 16 bytes per message.
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(16);
        config.max_frame_size = Some(16);
        let (server, mut client) = ws_pair(Some(config)).await;
        let session = tokio::spawn(run_session(
            server,
            peer(),
            ConnectionRegistry::new(),
            Arc::new(ConnectionStateTracker::new()),
        ));

        // Act
        client.send(WsMessage::Binary(vec![0; 17])).await.unwrap();

        // Assert
        let result = timeout(WAIT, session).await.expect("session must end").unwrap();
        assert!(result.is_err(), "oversized message must end the session");
        while let Ok(Some(Ok(msg))) = timeout(Duration::from_millis(200), client.next()).await {
            assert!(!matches!(msg, WsMessage::Binary(_)), "got an echo: {msg:?}");
        }
    }

    #[tokio::test]
    async fn test_reserved_opcode_ends_session_with_protocol_error() {
        // Arrange: a raw client end, so a frame tungstenite would refuse to
        // build can still be written.
        let (a, mut b) = tokio::io::duplex(1024);
        let server = WebSocketStream::from_raw_socket(a, Role::Server, None).await;
        let registry = ConnectionRegistry::new();
        let session = tokio::spawn(run_session(
            server,
            peer(),
            registry.clone(),
            Arc::new(ConnectionStateTracker::new()),
        ));

        // Act: masked, empty, final frame with reserved data opcode 0x3.
        b.write_all(&[0x83, 0x80, 0, 0, 0, 0]).await.unwrap();

        // Assert
        let result = timeout(WAIT, session).await.expect("session must end").unwrap();
        let err = result.expect_err("reserved opcode must end the session");
        assert!(format!("{err:#}").contains("protocol violation"), "{err:#}");
        assert!(registry.is_empty().await);
    }
}
