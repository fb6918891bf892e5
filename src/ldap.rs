//! Primary-password verification with an LDAP simple bind.

use crate::config::{expand_user_dn, Configuration};
use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings, LdapError};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// LDAP result code for a failed bind.
const INVALID_CREDENTIALS: u32 = 49;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory is not configured: missing {0}")]
    NotConfigured(&'static str),
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("bind rejected: {0}")]
    Rejected(String),
    #[error("directory connection failed: {0}")]
    Connection(#[from] LdapError),
    #[error("could not build TLS connector: {0}")]
    Tls(#[from] native_tls::Error),
    #[error("directory did not answer within {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait DirectoryAuthenticator: Send + Sync {
    /// Succeeds only if `username` can bind with `password`.
    async fn authenticate(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<(), DirectoryError>;
}

#[derive(Debug, Clone)]
pub struct LdapAuthenticator {
    url: String,
    user_dn: String,
    connector: Option<native_tls::TlsConnector>,
    timeout: Duration,
}

impl LdapAuthenticator {
    /// # Errors
    /// Returns `NotConfigured` when no directory endpoint or bind DN template is
    /// set, and `Tls` if the trusted CA certificates cannot be loaded.
    pub fn new(config: &Configuration) -> Result<Self, DirectoryError> {
        let settings = config.directory();

        let address = settings
            .address()
            .ok_or(DirectoryError::NotConfigured("LDAP EndPoint"))?;
        let user_dn = settings
            .user_dn()
            .ok_or(DirectoryError::NotConfigured("LDAP UserDN"))?;

        let scheme = if settings.use_tls() { "ldaps" } else { "ldap" };

        let connector = if settings.trust_ca_certs().is_empty() {
            None
        } else {
            let mut builder = native_tls::TlsConnector::builder();
            for certificate in settings.trust_ca_certs() {
                builder.add_root_certificate(certificate.to_native_tls()?);
            }
            Some(builder.build()?)
        };

        Ok(Self {
            url: format!("{scheme}://{address}"),
            user_dn: user_dn.to_string(),
            connector,
            timeout: config.server().request_timeout(),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Bind DN for `username` with DN metacharacters escaped.
    #[must_use]
    pub fn bind_dn(&self, username: &str) -> String {
        expand_user_dn(&self.user_dn, username)
    }

    async fn bind(&self, bind_dn: &str, password: &str) -> Result<(), DirectoryError> {
        let mut settings = LdapConnSettings::new().set_conn_timeout(self.timeout);
        if let Some(connector) = &self.connector {
            settings = settings.set_connector(connector.clone());
        }

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.url).await?;
        tokio::spawn(async move {
            if let Err(err) = conn.drive().await {
                warn!("LDAP connection error: {}", err);
            }
        });

        let result = ldap.simple_bind(bind_dn, password).await?;
        let _ = ldap.unbind().await;

        match result.rc {
            0 => Ok(()),
            INVALID_CREDENTIALS => Err(DirectoryError::InvalidCredentials),
            rc => Err(DirectoryError::Rejected(format!("rc={rc} {}", result.text))),
        }
    }
}

#[async_trait]
impl DirectoryAuthenticator for LdapAuthenticator {
    #[instrument(skip(self, password), fields(url = %self.url))]
    async fn authenticate(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<(), DirectoryError> {
        // an empty password is an unauthenticated bind, which most servers accept
        if password.expose_secret().is_empty() {
            return Err(DirectoryError::EmptyPassword);
        }

        let bind_dn = self.bind_dn(username);
        debug!("binding as {}", bind_dn);

        tokio::time::timeout(self.timeout, self.bind(&bind_dn, password.expose_secret()))
            .await
            .map_err(|_| DirectoryError::Timeout(self.timeout))?
    }
}
