//! Infrastructure layer for wt-server.
//!
//! The infrastructure layer handles all I/O: the TCP listener, TLS, the
//! WebSocket transport, and the tasks that serve each connection.
//!
//! # Responsibilities
//!
//! - Binding a TCP listener and running the accept loop
//! - Wrapping accepted streams in TLS when a trust policy is configured
//! - Performing the WebSocket HTTP upgrade handshake
//! - Turning inbound frames into message units and feeding the bridging queue
//! - Writing replies through one writer task per connection
//! - Reading the configuration file
//!
//! # What does NOT belong here?
//!
//! - Deciding how to answer a message (that is the application layer)
//! - Configuration and error type definitions (that is the domain layer)

pub mod config_file;
pub mod outbound;
pub mod registry;
pub mod server;
pub mod session;
pub mod tls;

// Re-export the primary entry points so `main.rs` can use them concisely.
pub use config_file::{load_config, ConfigError};
pub use outbound::OutboundSender;
pub use registry::{ConnectionEntry, ConnectionRegistry};
pub use server::{websocket_config, WebSocketServer};
pub use session::run_session;
pub use tls::{TlsError, TrustPolicy};
