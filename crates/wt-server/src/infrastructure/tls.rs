//! Trust policy for accepted connections.
//!
//! The server either speaks plain `ws://` or wraps every accepted TCP stream
//! in TLS (`wss://`) before the WebSocket handshake.  Certificate handling and
//! the handshake itself are rustls' business; this module only loads the PEM
//! files and builds the acceptor.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio_rustls::rustls;
use tokio_rustls::TlsAcceptor;

use crate::domain::TlsFiles;

/// Error type for loading the TLS trust policy.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),
    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),
    #[error("rustls rejected the certificate/key pair: {0}")]
    Rustls(#[from] rustls::Error),
}

/// How accepted TCP streams are secured.
#[derive(Clone)]
pub enum TrustPolicy {
    /// No TLS; plain WebSocket.
    Plaintext,
    /// TLS terminated by rustls with the given acceptor.
    Tls(TlsAcceptor),
}

impl TrustPolicy {
    /// Builds the policy described by `files`: TLS when present, plaintext
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`TlsError`] if either PEM file cannot be read or parsed, or if
    /// rustls rejects the pair.
    pub fn from_files(files: Option<&TlsFiles>) -> Result<Self, TlsError> {
        match files {
            Some(files) => Self::from_pem_files(&files.cert_path, &files.key_path),
            None => Ok(TrustPolicy::Plaintext),
        }
    }

    /// Loads a certificate chain and private key and builds a TLS acceptor.
    ///
    /// # Errors
    ///
    /// See [`from_files`](Self::from_files).
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Self, TlsError> {
        let certs = rustls_pemfile::certs(&mut open(cert_path)?)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| TlsError::Io {
                path: cert_path.to_path_buf(),
                source,
            })?;
        if certs.is_empty() {
            return Err(TlsError::NoCertificates(cert_path.to_path_buf()));
        }

        let key = rustls_pemfile::private_key(&mut open(key_path)?)
            .map_err(|source| TlsError::Io {
                path: key_path.to_path_buf(),
                source,
            })?
            .ok_or_else(|| TlsError::NoPrivateKey(key_path.to_path_buf()))?;

        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
        Ok(TrustPolicy::Tls(TlsAcceptor::from(Arc::new(config))))
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, TrustPolicy::Tls(_))
    }

    /// URL scheme clients should use: `"wss"` or `"ws"`.
    pub fn scheme(&self) -> &'static str {
        if self.is_tls() {
            "wss"
        } else {
            "ws"
        }
    }
}

impl std::fmt::Debug for TrustPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrustPolicy::Plaintext => f.write_str("Plaintext"),
            TrustPolicy::Tls(_) => f.write_str("Tls(..)"),
        }
    }
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })
}
