//! White-Tipped WebSocket server: entry point.
//!
//! This binary accepts WebSocket connections and answers every message on the
//! connection it came from:
//!
//! - text and binary messages are echoed back unchanged;
//! - a ping is answered with a pong carrying `"pong"`;
//! - messages larger than 16,000,000 bytes are refused by the transport.
//!
//! # Usage
//!
//! ```text
//! wt-server [OPTIONS]
//!
//! Options:
//!   --port      <PORT>  TCP port to listen on [default: 8080]
//!   --bind      <IP>    Address to bind to [default: 0.0.0.0]
//!   --config    <FILE>  TOML configuration file
//!   --tls-cert  <FILE>  PEM certificate chain (enables wss://)
//!   --tls-key   <FILE>  PEM private key (required with --tls-cert)
//!   --log-level <LEVEL> Log filter used when RUST_LOG is unset [default: info]
//! ```
//!
//! # Where settings come from
//!
//! Lowest to highest precedence: built-in defaults, the `--config` file, then
//! command-line flags (or their environment variables).
//!
//! | Variable      | Flag          |
//! |---------------|---------------|
//! | `WT_PORT`     | `--port`      |
//! | `WT_BIND`     | `--bind`      |
//! | `WT_CONFIG`   | `--config`    |
//! | `WT_TLS_CERT` | `--tls-cert`  |
//! | `WT_TLS_KEY`  | `--tls-key`   |
//! | `WT_LOG`      | `--log-level` |
//!
//! # Shutdown
//!
//! Ctrl+C cancels the listener with a normal-closure code; the process exits
//! once `listen()` returns.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wt_core::CloseCode;
use wt_server::domain::{ServerConfig, TlsFiles};
use wt_server::infrastructure::{load_config, WebSocketServer};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// White-Tipped WebSocket message server.
///
/// Every flag is optional: anything left out keeps the value from the
/// configuration file, or the built-in default when there is no file.
#[derive(Debug, Parser)]
#[command(
    name = "wt-server",
    about = "WebSocket message server: echoes text and binary, answers pings",
    version
)]
struct Cli {
    /// TCP port for the WebSocket listener.
    #[arg(long, env = "WT_PORT")]
    port: Option<u16>,

    /// IP address to bind to.
    ///
    /// Use `0.0.0.0` to accept connections on every interface, or
    /// `127.0.0.1` to accept only local connections.
    #[arg(long, env = "WT_BIND")]
    bind: Option<String>,

    /// Path to a TOML configuration file.
    #[arg(long, env = "WT_CONFIG")]
    config: Option<PathBuf>,

    /// PEM certificate chain.  Serves `wss://` when given.
    #[arg(long, env = "WT_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// PEM private key matching `--tls-cert`.
    #[arg(long, env = "WT_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    /// `tracing` filter used when `RUST_LOG` is not set (e.g. `debug`).
    #[arg(long, env = "WT_LOG")]
    log_level: Option<String>,
}

impl Cli {
    /// Merges defaults, the optional config file, and the CLI flags into a
    /// [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded or `--bind` is not
    /// a valid IP address.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => ServerConfig::default(),
        };

        let ip: IpAddr = match &self.bind {
            Some(bind) => bind
                .parse()
                .with_context(|| format!("invalid bind address: '{bind}'"))?,
            None => config.bind_addr.ip(),
        };
        let port = self.port.unwrap_or(config.bind_addr.port());
        config.bind_addr = SocketAddr::new(ip, port);

        if let (Some(cert_path), Some(key_path)) = (self.tls_cert, self.tls_key) {
            config.tls = Some(TlsFiles {
                cert_path,
                key_path,
            });
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed with `clap` and merged into a [`ServerConfig`].
/// 2. `tracing_subscriber` is initialised.  `RUST_LOG` wins when set;
///    otherwise the configured log level is used.
/// 3. A Ctrl+C handler is spawned; it calls `disconnect(NORMAL_CLOSURE)`.
/// 4. [`WebSocketServer::listen`] binds the port and serves connections until
///    the listener is cancelled.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.into_server_config()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        "wt-server starting: bind={}, max_message_size={}, tls={}",
        config.bind_addr,
        config.max_message_size,
        config.tls.is_some()
    );

    let server = WebSocketServer::new(config);

    // ── Graceful shutdown ─────────────────────────────────────────────────────
    let shutdown = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                if let Err(e) = shutdown.disconnect(CloseCode::NORMAL_CLOSURE).await {
                    error!("shutdown failed: {e}");
                }
            }
            Err(e) => {
                error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Main server loop ──────────────────────────────────────────────────────
    let terminal = server.listen().await.context("server failed to start")?;

    info!("wt-server stopped ({terminal})");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard};

    const ENV_VARS: [&str; 6] = [
        "WT_PORT",
        "WT_BIND",
        "WT_CONFIG",
        "WT_TLS_CERT",
        "WT_TLS_KEY",
        "WT_LOG",
    ];

    /// Serialises tests that read or write the `WT_*` variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Takes the environment lock and clears every `WT_*` variable, so flag
    /// parsing only sees the arguments a test passes.
    fn clean_env() -> MutexGuard<'static, ()> {
        let guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
        guard
    }

    fn parse(args: &[&str]) -> Cli {
        let _env = clean_env();
        Cli::parse_from(args.iter().copied())
    }

    #[test]
    fn test_cli_defaults_produce_port_8080() {
        // Arrange: parse with no arguments (all defaults apply)
        let cli = parse(&["wt-server"]);

        // Act
        let config = cli.into_server_config().unwrap();

        // Assert
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.bind_addr.ip().is_unspecified());
        assert!(config.tls.is_none());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_cli_port_override() {
        let cli = parse(&["wt-server", "--port", "9999"]);
        let config = cli.into_server_config().unwrap();
        assert_eq!(config.bind_addr.port(), 9999);
    }

    #[test]
    fn test_cli_bind_override() {
        let cli = parse(&["wt-server", "--bind", "127.0.0.1"]);
        let config = cli.into_server_config().unwrap();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn test_cli_log_level_override() {
        let cli = parse(&["wt-server", "--log-level", "debug"]);
        let config = cli.into_server_config().unwrap();
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_cli_tls_pair_sets_tls_files() {
        let cli = parse(&[
            "wt-server",
            "--tls-cert",
            "cert.pem",
            "--tls-key",
            "key.pem",
        ]);
        let config = cli.into_server_config().unwrap();
        let tls = config.tls.expect("tls must be configured");
        assert_eq!(tls.cert_path, PathBuf::from("cert.pem"));
        assert_eq!(tls.key_path, PathBuf::from("key.pem"));
    }

    #[test]
    fn test_cli_tls_cert_without_key_is_rejected() {
        let _env = clean_env();
        let result = Cli::try_parse_from(["wt-server", "--tls-cert", "cert.pem"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_flags_override_config_file() {
        // Arrange: a file that sets both bind address and log level
        let path = std::env::temp_dir().join(format!("wt-main-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "bind_addr = \"127.0.0.1:7000\"\nlog_level = \"warn\"\n",
        )
        .unwrap();
        let cli = parse(&[
            "wt-server",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "7001",
        ]);

        // Act
        let config = cli.into_server_config().unwrap();

        // Assert: port from the flag, everything else from the file
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:7001");
        assert_eq!(config.log_level, "warn");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_invalid_bind_returns_error() {
        // Arrange: an address that is not an IP
        let cli = Cli {
            port: None,
            bind: Some("not.an.ip".to_string()),
            config: None,
            tls_cert: None,
            tls_key: None,
            log_level: None,
        };

        // Act
        let result = cli.into_server_config();

        // Assert: must return an error, not panic
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_config_file_returns_error() {
        let cli = parse(&["wt-server", "--config", "/nonexistent/wt/server.toml"]);
        assert!(cli.into_server_config().is_err());
    }

    #[test]
    fn test_environment_variables_fill_missing_flags() {
        // Arrange
        let _env = clean_env();
        std::env::set_var("WT_PORT", "9123");
        std::env::set_var("WT_BIND", "127.0.0.1");

        // Act
        let cli = Cli::parse_from(["wt-server"]);
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
        let config = cli.into_server_config().unwrap();

        // Assert
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:9123");
    }

    #[test]
    fn test_flag_wins_over_environment_variable() {
        let _env = clean_env();
        std::env::set_var("WT_PORT", "9123");

        let cli = Cli::parse_from(["wt-server", "--port", "9124"]);
        std::env::remove_var("WT_PORT");

        assert_eq!(cli.into_server_config().unwrap().bind_addr.port(), 9124);
    }
}
