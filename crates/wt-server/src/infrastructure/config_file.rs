//! Loading [`ServerConfig`] from a TOML file.
//!
//! Parsing lives in the domain ([`ServerConfig::from_toml_str`]); this module
//! only adds the file I/O and a path-aware error.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::domain::ServerConfig;

/// Error type for configuration file loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Reads and parses the configuration file at `path`.
///
/// Keys missing from the file keep their defaults.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if it is not a valid configuration.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = ServerConfig::from_toml_str(&text)?;
    debug!("loaded configuration from {}", path.display());
    Ok(config)
}
