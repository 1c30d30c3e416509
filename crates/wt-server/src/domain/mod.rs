//! Domain layer for wt-server.
//!
//! The domain layer contains plain types with no dependencies on I/O,
//! networking, or async runtimes.  Message units, opcodes and the listener
//! state machine live one level further down, in `wt-core`; this module adds
//! what only the server needs.
//!
//! # What belongs in the domain layer?
//!
//! - Configuration structures
//! - Error types that describe what can go wrong for a caller
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - File I/O or environment variable reading

pub mod config;
pub mod error;

pub use config::{ServerConfig, TlsFiles, DEFAULT_PORT, MAX_MESSAGE_SIZE};
pub use error::{ServerError, TransportError};
