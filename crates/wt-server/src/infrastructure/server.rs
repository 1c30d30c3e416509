//! WebSocket server facade: lifecycle, accept loop, and per-connection tasks.
//!
//! [`WebSocketServer`] is the only type most callers need.  It:
//!
//! 1. Builds the TLS trust policy and WebSocket options from [`ServerConfig`].
//! 2. Binds a TCP listener and publishes the listener lifecycle through a
//!    [`ConnectionStateTracker`] (setup → waiting → ready → cancelled/failed).
//! 3. Accepts connections, upgrades each one to a WebSocket, and hands it to
//!    [`run_session`] in its own Tokio task.
//! 4. Lets callers push text or binary messages to a live connection by id,
//!    and close everything down with a close code.
//!
//! # Scalability
//!
//! Each connection runs in its own set of Tokio tasks (reader, writer, and one
//! short-lived dispatch task per message).  The accept loop never waits on a
//! connection: it spawns the handler and goes straight back to `accept()`.
//!
//! # Shutdown
//!
//! The accept loop polls a shared `AtomicBool` every 200 ms, the same way
//! Ctrl+C handling works in `main.rs`.  [`WebSocketServer::disconnect`]
//! clears the flag and waits for the loop to exit, so the port is released
//! by the time it returns.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, OnceLock,
};
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::accept_async_with_config;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, error, info, warn};
use wt_core::domain::monitor_listener_state;
use wt_core::{CloseCode, ConnectionId, ConnectionState, ConnectionStateTracker, ListenerState};

use crate::domain::{ServerConfig, ServerError};
use crate::infrastructure::registry::ConnectionRegistry;
use crate::infrastructure::session::run_session;
use crate::infrastructure::tls::TrustPolicy;

/// How long one `accept()` may block before the shutdown flag is rechecked.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Builds the WebSocket options for a connection: both the whole-message and
/// the single-frame limit are `max_message_size`.
///
/// Ping auto-reply is not an option here; tokio-tungstenite always answers
/// pings on its own.
pub fn websocket_config(max_message_size: usize) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(max_message_size);
    config.max_frame_size = Some(max_message_size);
    config
}

// ── Facade ────────────────────────────────────────────────────────────────────

/// A WebSocket message server.
///
/// Cloning is cheap and every clone controls the same server, so a Ctrl+C
/// task can hold one clone while `listen()` runs on another.
#[derive(Clone)]
pub struct WebSocketServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    config: ServerConfig,
    tracker: Arc<ConnectionStateTracker>,
    registry: ConnectionRegistry,
    running: Arc<AtomicBool>,
    started: AtomicBool,
    local_addr: OnceLock<SocketAddr>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

/// What each connection handler needs from the server.
struct AcceptContext {
    trust: TrustPolicy,
    max_message_size: usize,
    registry: ConnectionRegistry,
    tracker: Arc<ConnectionStateTracker>,
}

impl WebSocketServer {
    /// Creates a server in the setup state.  Nothing is bound until
    /// [`start`](Self::start).
    pub fn new(config: ServerConfig) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                config,
                tracker: Arc::new(ConnectionStateTracker::new()),
                registry: ConnectionRegistry::new(),
                running: Arc::new(AtomicBool::new(true)),
                started: AtomicBool::new(false),
                local_addr: OnceLock::new(),
                accept_task: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Binds the listener and starts accepting connections.
    ///
    /// Returns the bound address, which differs from the configured one when
    /// the configured port is 0.
    ///
    /// # Errors
    ///
    /// - [`ServerError::AlreadyStarted`] on a second call.
    /// - [`ServerError::Tls`] if the certificate or key cannot be loaded.
    /// - [`ServerError::Bind`] if the address cannot be bound.
    ///
    /// The last two also move the listener to [`ListenerState::Failed`].
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let inner = &self.inner;
        if inner.started.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyStarted);
        }

        tokio::spawn(monitor_listener_state(inner.tracker.subscribe()));

        let addr = inner.config.bind_addr;
        inner
            .tracker
            .update_listener_state(ListenerState::Waiting(format!("binding {addr}")))?;

        let trust = match TrustPolicy::from_files(inner.config.tls.as_ref()) {
            Ok(trust) => trust,
            Err(e) => {
                self.fail(format!("TLS setup failed: {e}"));
                return Err(ServerError::Tls(e.to_string()));
            }
        };

        let bound = match TcpListener::bind(addr).await {
            Ok(listener) => listener.local_addr().map(|local| (listener, local)),
            Err(e) => Err(e),
        };
        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(source) => {
                self.fail(format!("bind {addr}: {source}"));
                return Err(ServerError::Bind { addr, source });
            }
        };

        inner.tracker.update_listener_state(ListenerState::Ready)?;
        let _ = inner.local_addr.set(local_addr);
        info!(
            "WebSocket server listening on {}://{local_addr}",
            trust.scheme()
        );

        let ctx = Arc::new(AcceptContext {
            trust,
            max_message_size: inner.config.max_message_size,
            registry: inner.registry.clone(),
            tracker: Arc::clone(&inner.tracker),
        });
        let handle = tokio::spawn(run_accept_loop(
            listener,
            ctx,
            Arc::clone(&inner.running),
        ));
        *inner.accept_task.lock().await = Some(handle);

        Ok(local_addr)
    }

    /// Starts the server and waits until it is cancelled or fails.
    ///
    /// Returns the terminal listener state.
    ///
    /// # Errors
    ///
    /// Any error from [`start`](Self::start).
    pub async fn listen(&self) -> Result<ListenerState, ServerError> {
        self.start().await?;
        Ok(self.stopped().await)
    }

    /// Waits until the listener reaches a terminal state and returns it.
    pub async fn stopped(&self) -> ListenerState {
        let mut rx = self.inner.tracker.subscribe();
        let state = match rx.wait_for(|s| s.listener_state.is_terminal()).await {
            Ok(state) => state.listener_state.clone(),
            // Only possible once the tracker is gone.
            Err(_) => self.inner.tracker.listener_state(),
        };
        state
    }

    /// Stops the server.
    ///
    /// With [`CloseCode::NORMAL_CLOSURE`] only the listener is cancelled and
    /// live connections are left alone.  With any other code, every live
    /// connection first receives one close frame carrying `code`.
    ///
    /// Calling it again once the listener has stopped is a no-op.  A close
    /// frame that cannot be written (the peer is already gone) is logged and
    /// skipped.  A connection still in its handshake when `disconnect` runs
    /// receives the close frame as soon as it is registered.
    pub async fn disconnect(&self, code: CloseCode) -> Result<(), ServerError> {
        let inner = &self.inner;
        if inner.tracker.listener_state().is_terminal() {
            debug!(%code, "listener already stopped; nothing to disconnect");
            return Ok(());
        }

        if !code.is_normal() {
            for (id, entry) in inner.registry.begin_close(code).await.unwrap_or_default() {
                let peer = entry.peer_addr;
                match entry.sender.send_close(code).await {
                    Ok(()) => debug!(connection = %id, %peer, %code, "close frame sent"),
                    Err(e) => debug!(connection = %id, %peer, "close frame not sent: {e}"),
                }
            }
        }

        inner.running.store(false, Ordering::Relaxed);
        let accept_task = inner.accept_task.lock().await.take();
        if let Some(handle) = accept_task {
            if let Err(e) = handle.await {
                warn!("accept loop did not finish cleanly: {e}");
            }
        }

        match inner.tracker.update_listener_state(ListenerState::Cancelled) {
            Ok(()) => info!(%code, "listener cancelled"),
            Err(e) => debug!("listener already stopped: {e}"),
        }
        Ok(())
    }

    /// Sends a text message to connection `id` and waits until it is written.
    ///
    /// # Errors
    ///
    /// [`ServerError::ConnectionNotFound`] for an unknown id,
    /// [`ServerError::Send`] if the write failed.
    pub async fn send_text(&self, id: ConnectionId, text: &str) -> Result<(), ServerError> {
        let sender = self
            .inner
            .registry
            .sender(id)
            .await
            .ok_or(ServerError::ConnectionNotFound(id))?;
        sender.send_text(text).await?;
        Ok(())
    }

    /// Sends a binary message to connection `id` and waits until it is
    /// written.
    ///
    /// # Errors
    ///
    /// See [`send_text`](Self::send_text).
    pub async fn send_binary(&self, id: ConnectionId, data: Vec<u8>) -> Result<(), ServerError> {
        let sender = self
            .inner
            .registry
            .sender(id)
            .await
            .ok_or(ServerError::ConnectionNotFound(id))?;
        sender.send_binary(data).await?;
        Ok(())
    }

    /// Ids of every live connection, in no particular order.
    pub async fn connection_ids(&self) -> Vec<ConnectionId> {
        self.inner.registry.ids().await
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.tracker.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.tracker.subscribe()
    }

    /// The bound address, once [`start`](Self::start) has succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr.get().copied()
    }

    fn fail(&self, reason: String) {
        error!("listener failed: {reason}");
        if let Err(e) = self
            .inner
            .tracker
            .update_listener_state(ListenerState::Failed(reason))
        {
            debug!("could not record failure: {e}");
        }
    }
}

impl std::fmt::Debug for WebSocketServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketServer")
            .field("bind_addr", &self.inner.config.bind_addr)
            .field("local_addr", &self.local_addr())
            .field("state", &self.inner.tracker.listener_state())
            .finish()
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

/// Accepts connections until `running` is cleared.
async fn run_accept_loop(listener: TcpListener, ctx: Arc<AcceptContext>, running: Arc<AtomicBool>) {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Bounded wait so the flag is rechecked even when nobody connects.
        match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new TCP connection from {peer_addr}");
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, ctx).await;
                });
            }
            Ok(Err(e)) => {
                // Transient (e.g. out of file descriptors); keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Runs one connection and logs how it ended.
async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, ctx: Arc<AcceptContext>) {
    match run_connection(stream, peer_addr, ctx).await {
        Ok(()) => info!("connection {peer_addr} closed normally"),
        Err(e) => warn!("connection {peer_addr} closed with error: {e:#}"),
    }
}

/// Performs the TLS (if configured) and WebSocket handshakes, then serves the
/// session.
async fn run_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    ctx: Arc<AcceptContext>,
) -> anyhow::Result<()> {
    let config = Some(websocket_config(ctx.max_message_size));
    let registry = ctx.registry.clone();
    let tracker = Arc::clone(&ctx.tracker);

    match &ctx.trust {
        TrustPolicy::Plaintext => {
            let ws = accept_async_with_config(stream, config)
                .await
                .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
            run_session(ws, peer_addr, registry, tracker).await
        }
        TrustPolicy::Tls(acceptor) => {
            let tls = acceptor
                .accept(stream)
                .await
                .with_context(|| format!("TLS handshake failed with {peer_addr}"))?;
            let ws = accept_async_with_config(tls, config)
                .await
                .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
            run_session(ws, peer_addr, registry, tracker).await
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
