//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for all runtime settings.
//! It can be constructed from defaults, a TOML file (see
//! [`crate::infrastructure::config_file`]), and CLI overrides (see `main.rs`).
//!
//! # Design rationale
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! variable reads inside the domain) makes the server easy to embed in tests.
//! Tests bind to port 0 and let the OS pick a free port.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default TCP port the listener binds to.
pub const DEFAULT_PORT: u16 = 8080;

/// Largest single WebSocket message the transport accepts, in bytes.
///
/// Anything above this is rejected by tokio-tungstenite while reading and
/// never reaches the dispatcher.
pub const MAX_MESSAGE_SIZE: usize = 16_000_000;

/// Paths to the PEM files that make up the TLS trust policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsFiles {
    /// Certificate chain, leaf first.
    pub cert_path: PathBuf,
    /// PKCS#8, PKCS#1 or SEC1 private key matching the leaf certificate.
    pub key_path: PathBuf,
}

/// All runtime configuration for the server.
///
/// Every field has a default, so a TOML file only needs the keys it wants to
/// change:
///
/// ```toml
/// bind_addr = "127.0.0.1:9000"
///
/// [tls]
/// cert_path = "/etc/wt/cert.pem"
/// key_path = "/etc/wt/key.pem"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address and port the listener binds to.
    pub bind_addr: SocketAddr,

    /// Maximum size of one WebSocket message (and of one frame), in bytes.
    pub max_message_size: usize,

    /// TLS certificate and key.  `None` serves plain `ws://`.
    pub tls: Option<TlsFiles>,

    /// `tracing` filter used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for ServerConfig {
    /// | Field            | Default        |
    /// |------------------|----------------|
    /// | bind_addr        | `0.0.0.0:8080` |
    /// | max_message_size | 16,000,000     |
    /// | tls              | none           |
    /// | log_level        | `info`         |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_message_size: MAX_MESSAGE_SIZE,
            tls: None,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Parses a configuration from TOML text.  Missing keys keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns the TOML error for malformed input or unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// A configuration bound to `127.0.0.1:0`, used by tests.
    pub fn loopback_ephemeral() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..Self::default()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
