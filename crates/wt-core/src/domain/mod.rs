//! Domain types shared by every layer of the server.
//!
//! Nothing in here touches a socket.  The types describe *what* travels
//! through a connection ([`message`], [`opcode`]) and *where the listener is*
//! in its lifecycle ([`state`]).

pub mod message;
pub mod opcode;
pub mod state;

pub use message::{ConnectionId, InboundMessageUnit, OutboundMessage, PONG_PAYLOAD};
pub use opcode::{CloseCode, Opcode};
pub use state::{
    first_transition, monitor_listener_state, ConnectionState, ConnectionStateTracker,
    ListenerState, StateError,
};
