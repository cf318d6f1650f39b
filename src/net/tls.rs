//! TLS context construction and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use thiserror::Error;

use crate::config::TlsConfig;

/// Error type for TLS context construction.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(String),

    #[error("no private key found in {0}")]
    NoPrivateKey(String),

    #[error("rejected certificate or key: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Server-side TLS configuration used to wrap the listening socket.
///
/// Holds certificate/key material and protocol parameters. The server uses
/// it once at construction; accepted connections then perform the handshake
/// against the shared `rustls::ServerConfig`.
#[derive(Debug, Clone)]
pub struct TlsContext {
    config: Arc<rustls::ServerConfig>,
}

impl TlsContext {
    /// Build a context from an existing rustls server config.
    pub fn new(config: Arc<rustls::ServerConfig>) -> Self {
        Self { config }
    }

    /// Build a context from PEM-encoded certificate chain and key files.
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Self, TlsError> {
        let certs = load_certs(cert_path)?;
        let key = load_key(key_path)?;

        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;

        tracing::debug!(
            cert_path = %cert_path.display(),
            key_path = %key_path.display(),
            "TLS context loaded"
        );

        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Build a context from the TLS section of a server config file.
    pub fn from_config(config: &TlsConfig) -> Result<Self, TlsError> {
        Self::from_pem_files(Path::new(&config.cert_path), Path::new(&config.key_path))
    }

    pub(crate) fn server_config(&self) -> Arc<rustls::ServerConfig> {
        Arc::clone(&self.config)
    }
}

fn open_pem(path: &Path) -> Result<BufReader<File>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::ReadFile {
        path: path.display().to_string(),
        source,
    })?;
    Ok(BufReader::new(file))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open_pem(path)?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<_, _>>()
        .map_err(|source| TlsError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.display().to_string()));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open_pem(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::ReadFile {
            path: path.display().to_string(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.display().to_string()))
}
