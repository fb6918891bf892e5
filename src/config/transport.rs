use super::error::{ConfigError, Result};
use crate::{tls, APP_USER_AGENT};
use reqwest::Client;
use rustls::{pki_types::CertificateDer, RootCertStore};
use std::{fmt, path::Path, time::Duration};

/// A CA certificate accepted as a trust anchor.
#[derive(Clone, PartialEq, Eq)]
pub struct CaCertificate(CertificateDer<'static>);

impl CaCertificate {
    /// Parse a DER-encoded certificate.
    ///
    /// # Errors
    /// Returns an error if the bytes are not a certificate usable as a trust anchor.
    pub fn from_der(der: impl Into<Vec<u8>>) -> Result<Self> {
        let der = CertificateDer::from(der.into());
        let mut store = RootCertStore::empty();
        store
            .add(der.clone())
            .map_err(|err| ConfigError::CaCertificate(err.to_string()))?;
        Ok(Self(der))
    }

    /// Read every certificate of a PEM bundle.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, holds no certificate, or
    /// holds a certificate that is not a valid trust anchor.
    pub fn from_pem_file(path: &Path) -> Result<Vec<Self>> {
        let chain =
            tls::load_cert_chain(path).map_err(|err| ConfigError::CaCertificateFile {
                path: path.to_path_buf(),
                reason: format!("{err:#}"),
            })?;

        chain
            .into_iter()
            .map(|der| {
                Self::from_der(der.to_vec()).map_err(|err| ConfigError::CaCertificateFile {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                })
            })
            .collect()
    }

    #[must_use]
    pub fn der(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// # Errors
    /// Returns an error if reqwest rejects the certificate.
    pub fn to_reqwest(&self) -> reqwest::Result<reqwest::Certificate> {
        reqwest::Certificate::from_der(self.der())
    }

    /// # Errors
    /// Returns an error if the native TLS backend rejects the certificate.
    pub fn to_native_tls(&self) -> native_tls::Result<native_tls::Certificate> {
        native_tls::Certificate::from_der(self.der())
    }
}

impl fmt::Debug for CaCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaCertificate")
            .field("der_len", &self.0.len())
            .finish()
    }
}

/// Outbound HTTP transport used for the secret store.
///
/// When root certificates are set, they replace the built-in roots entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpTransport {
    root_certificates: Vec<CaCertificate>,
}

impl HttpTransport {
    pub fn trust_only(&mut self, certificates: Vec<CaCertificate>) {
        self.root_certificates = certificates;
    }

    #[must_use]
    pub fn root_certificates(&self) -> &[CaCertificate] {
        &self.root_certificates
    }

    /// Build the reqwest client for this transport.
    ///
    /// # Errors
    /// Returns an error if the client cannot be built.
    pub fn client(&self, timeout: Duration) -> reqwest::Result<Client> {
        let mut builder = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout);

        if !self.root_certificates.is_empty() {
            builder = builder.tls_built_in_root_certs(false);
            for certificate in &self.root_certificates {
                builder = builder.add_root_certificate(certificate.to_reqwest()?);
            }
        }

        builder.build()
    }
}
