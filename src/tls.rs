//! TLS material for the MFA listener.
//!
//! Reads PEM-encoded certificate chains and private keys from disk and builds
//! the rustls server config used by the HTTPS accept loop. The same PEM reader
//! backs CA certificate loading in the configuration layer.

use anyhow::{anyhow, Context, Result};
use rustls::{
    pki_types::{CertificateDer, PrivateKeyDer},
    ServerConfig,
};
use rustls_pemfile::{certs, private_key};
use std::{fs::File, io::BufReader, path::Path, sync::Arc};
use tokio_rustls::TlsAcceptor;

/// Read every certificate from a PEM file.
///
/// # Errors
/// Returns an error if the file cannot be read or contains no certificate.
pub fn load_cert_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open TLS certificate: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let certs = certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read TLS certificate: {}", path.display()))?;
    if certs.is_empty() {
        return Err(anyhow!("TLS certificate is empty: {}", path.display()));
    }
    Ok(certs)
}

/// Read the first PKCS#8, PKCS#1 or SEC1 private key from a PEM file.
///
/// # Errors
/// Returns an error if the file cannot be read or contains no private key.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open TLS key: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    private_key(&mut reader)
        .with_context(|| format!("Failed to read TLS key: {}", path.display()))?
        .ok_or_else(|| anyhow!("TLS private key not found: {}", path.display()))
}

/// Build the rustls server config for the listener.
///
/// # Errors
/// Returns an error if the certificate or key cannot be loaded or do not match.
pub fn load_server_config(cert: &Path, key: &Path) -> Result<ServerConfig> {
    let cert_chain = load_cert_chain(cert)?;
    let key = load_private_key(key)?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .context("Failed to build TLS server config")?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}

/// # Errors
/// Returns an error if the server config cannot be built.
pub fn acceptor(cert: &Path, key: &Path) -> Result<TlsAcceptor> {
    Ok(TlsAcceptor::from(Arc::new(load_server_config(cert, key)?)))
}
