//! Listener lifecycle state and the observable tracker that holds it.
//!
//! # State machine
//!
//! ```text
//!            ┌──────────► Waiting(reason) ──┐
//!            │               │  ▲  │        │
//!  Setup ────┼──────────► Ready ◄──┘        │
//!            │               │              ▼
//!            └──────────► Failed(reason) / Cancelled   (terminal)
//! ```
//!
//! `Failed` and `Cancelled` are terminal for a listener instance: once the
//! tracker has reported either, every further update is rejected.
//!
//! # Observation
//!
//! The tracker is backed by a `tokio::sync::watch` channel.  Any number of
//! tasks can [`subscribe`](ConnectionStateTracker::subscribe); each receiver
//! always sees the *latest* value, which is exactly what a lifecycle monitor
//! needs (intermediate values it was too slow to observe do not matter).

use std::fmt;

use thiserror::Error;
use tokio::sync::watch;
use tracing::trace;

use crate::domain::message::ConnectionId;

/// Errors returned by [`ConnectionStateTracker`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// The requested listener transition is not allowed from the current state.
    #[error("invalid listener transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

/// Lifecycle state of the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerState {
    /// Parameters configured, not yet bound.
    Setup,
    /// Bound but temporarily unable to accept; carries the reason.
    Waiting(String),
    /// Accepting connections.
    Ready,
    /// Irrecoverably failed; carries the reason.
    Failed(String),
    /// Cancelled by the owner.
    Cancelled,
}

impl ListenerState {
    /// `true` for `Failed` and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ListenerState::Failed(_) | ListenerState::Cancelled)
    }

    /// Returns whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: &ListenerState) -> bool {
        use ListenerState::*;
        match (self, next) {
            (Setup, Waiting(_) | Ready | Failed(_) | Cancelled) => true,
            (Waiting(_), Waiting(_) | Ready | Failed(_) | Cancelled) => true,
            (Ready, Failed(_) | Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerState::Setup => f.write_str("setup"),
            ListenerState::Waiting(reason) => write!(f, "waiting ({reason})"),
            ListenerState::Ready => f.write_str("ready"),
            ListenerState::Failed(reason) => write!(f, "failed ({reason})"),
            ListenerState::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Snapshot of everything the tracker holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub listener_state: ListenerState,
    /// The most recently accepted connection, if it is still open.
    pub active_connection: Option<ConnectionId>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            listener_state: ListenerState::Setup,
            active_connection: None,
        }
    }
}

// ── Tracker ───────────────────────────────────────────────────────────────────

/// Observable holder of the listener state and the active connection.
///
/// All mutation goes through `&self` methods; the underlying watch channel
/// serialises writers, so the tracker can be shared behind an `Arc` by the
/// accept loop, the session tasks, and the server facade.
#[derive(Debug)]
pub struct ConnectionStateTracker {
    tx: watch::Sender<ConnectionState>,
}

impl ConnectionStateTracker {
    /// Creates a tracker in [`ListenerState::Setup`] with no active connection.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::default());
        Self { tx }
    }

    /// Moves the listener to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidTransition`] when the state machine does
    /// not allow the move; the stored state is left unchanged and subscribers
    /// are not notified.
    pub fn update_listener_state(&self, next: ListenerState) -> Result<(), StateError> {
        let mut result = Ok(());
        self.tx.send_if_modified(|state| {
            if !state.listener_state.can_transition_to(&next) {
                result = Err(StateError::InvalidTransition {
                    from: state.listener_state.to_string(),
                    to: next.to_string(),
                });
                return false;
            }
            trace!(from = %state.listener_state, to = %next, "listener state transition");
            state.listener_state = next;
            true
        });
        result
    }

    /// Records `id` as the active connection, replacing any previous one.
    pub fn set_active_connection(&self, id: ConnectionId) {
        self.tx.send_modify(|state| {
            trace!(connection = %id, "active connection set");
            state.active_connection = Some(id);
        });
    }

    /// Clears the active connection if it is still `id`.
    ///
    /// A newer connection that replaced `id` is left in place.
    pub fn clear_active_connection(&self, id: ConnectionId) {
        self.tx.send_if_modified(|state| {
            if state.active_connection == Some(id) {
                state.active_connection = None;
                true
            } else {
                false
            }
        });
    }

    /// Returns a receiver that observes every subsequent change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> ConnectionState {
        self.tx.borrow().clone()
    }

    pub fn listener_state(&self) -> ListenerState {
        self.tx.borrow().listener_state.clone()
    }

    pub fn active_connection(&self) -> Option<ConnectionId> {
        self.tx.borrow().active_connection
    }
}

impl Default for ConnectionStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ── Monitors ──────────────────────────────────────────────────────────────────

/// Logs every listener transition until a terminal state is observed.
///
/// Returns the terminal state, or `None` if the tracker was dropped first.
/// Changes to the active connection alone are not logged.
pub async fn monitor_listener_state(
    mut rx: watch::Receiver<ConnectionState>,
) -> Option<ListenerState> {
    let mut last: Option<ListenerState> = None;
    loop {
        let state = rx.borrow_and_update().listener_state.clone();
        if last.as_ref() != Some(&state) {
            log_listener_state(&state);
            if state.is_terminal() {
                return Some(state);
            }
            last = Some(state);
        }
        if rx.changed().await.is_err() {
            return None;
        }
    }
}

/// Waits for the next change published by the tracker, logs the listener
/// state at that moment, and stops observing.
///
/// Only changes made after `rx` was created count; use
/// [`monitor_listener_state`] for continuous observation.
pub async fn first_transition(mut rx: watch::Receiver<ConnectionState>) -> Option<ListenerState> {
    rx.changed().await.ok()?;
    let state = rx.borrow_and_update().listener_state.clone();
    log_listener_state(&state);
    Some(state)
}

fn log_listener_state(state: &ListenerState) {
    match state {
        ListenerState::Setup => trace!("listener setup"),
        ListenerState::Waiting(reason) => trace!(%reason, "listener waiting"),
        ListenerState::Ready => trace!("listener ready"),
        ListenerState::Failed(reason) => trace!(%reason, "listener failed"),
        ListenerState::Cancelled => trace!("listener cancelled"),
    }
}
