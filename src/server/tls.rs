//! TLS acceptor construction from PEM material on disk.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tracing::debug;

use crate::config::SslSection;

/// TLS setup error types.
#[derive(Debug)]
pub enum TlsError {
    Io(io::Error),
    /// The key file contains no private key.
    MissingKey,
    /// The material was read but rejected by the TLS backend.
    Material(tokio_rustls::rustls::Error),
}

impl std::fmt::Display for TlsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsError::Io(e) => write!(f, "I/O error: {}", e),
            TlsError::MissingKey => write!(f, "no private key found in key file"),
            TlsError::Material(e) => write!(f, "invalid TLS material: {}", e),
        }
    }
}

impl std::error::Error for TlsError {}

impl From<io::Error> for TlsError {
    fn from(e: io::Error) -> Self {
        TlsError::Io(e)
    }
}

/// Builds a TLS acceptor from the configured certificate chain and
/// private key.
///
/// The key must be unencrypted PEM (PKCS#8, RSA or SEC1). rustls
/// negotiates TLS 1.3 with a 1.2 fallback and brings its own key-exchange
/// groups, so `ssl.tmp_dh` is not consumed.
pub fn build_acceptor(ssl: &SslSection) -> Result<TlsAcceptor, TlsError> {
    let certs = load_certs(&ssl.certificate)?;
    let key = load_key(&ssl.private_key)?;
    debug!(
        "key-exchange groups are built into the TLS backend; {} is not loaded",
        ssl.tmp_dh.display()
    );

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(TlsError::Material)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = BufReader::new(File::open(path)?);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(TlsError::Io)?;
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)?.ok_or(TlsError::MissingKey)
}
