//! Secret store gateway backed by HashiCorp Vault.
//!
//! Secrets live in a key/value engine under
//! `<MFASecretsPath>/<issuer>/<domain>/<username>` in a single `mfa` field.
//! Every operation logs in with the legacy App-ID backend first: the read
//! App-ID for lookups and the write App-ID for stores.

pub mod kv;

pub use kv::VaultStore;

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::{collections::HashMap, fmt};
use thiserror::Error;
use tracing::{debug, info_span, Instrument};
use url::Url;

/// Field holding the TOTP secret inside a stored entry.
pub const SECRET_FIELD: &str = "mfa";

#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("secret not found")]
    NotFound,
    #[error("secret already exists")]
    AlreadyExists,
    #[error("secret store is not configured: missing {0}")]
    NotConfigured(&'static str),
    #[error("invalid secret store URL: {0}")]
    Url(String),
    #[error("secret store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{url} - {status}, {message}")]
    Status {
        url: String,
        status: StatusCode,
        message: String,
    },
    #[error("Error parsing JSON response: {0}")]
    Response(&'static str),
}

/// Identity a secret belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretKey {
    issuer: String,
    domain: String,
    username: String,
}

impl SecretKey {
    /// Build the key; components are kept verbatim (case-sensitive, untrimmed).
    #[must_use]
    pub fn new(issuer: &str, domain: &str, username: &str) -> Self {
        Self {
            issuer: issuer.to_string(),
            domain: domain.to_string(),
            username: username.to_string(),
        }
    }

    #[must_use]
    pub fn segments(&self) -> [&str; 3] {
        [&self.issuer, &self.domain, &self.username]
    }

    /// Components that would be reinterpreted as path navigation.
    #[must_use]
    pub fn is_addressable(&self) -> bool {
        self.segments()
            .iter()
            .all(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
    }
}

impl fmt::Display for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}/{}", self.issuer, self.domain, self.username)
    }
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Write `field = value` at `key`, replacing any existing entry.
    async fn store(
        &self,
        key: &SecretKey,
        field: &str,
        value: &SecretString,
    ) -> Result<(), SecretStoreError>;

    /// Write `field = value` only if nothing is stored at `key`.
    ///
    /// Stores without a conditional write fall back to [`SecretStore::store`],
    /// so callers must still check for an existing entry first.
    async fn create(
        &self,
        key: &SecretKey,
        field: &str,
        value: &SecretString,
    ) -> Result<(), SecretStoreError> {
        self.store(key, field, value).await
    }

    /// Read every string field stored at `key`.
    async fn read(&self, key: &SecretKey) -> Result<HashMap<String, String>, SecretStoreError>;
}

pub(crate) fn vault_error_message(json_response: &Value) -> String {
    json_response
        .get("errors")
        .and_then(|v| v.get(0))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

/// Normalize `url` to `scheme://host:port` and append `path`.
///
/// # Errors
/// Returns an error if `url` cannot be parsed, has no host, or uses an unsupported scheme.
pub fn endpoint_url(url: &str, path: &str) -> anyhow::Result<String> {
    let url = Url::parse(url)?;

    let scheme = url.scheme();

    let host = url
        .host()
        .ok_or_else(|| anyhow!("Error parsing URL: no host specified"))?
        .to_owned();

    let port = match url.port() {
        Some(p) => p,
        None => match scheme {
            "http" => 80,
            "https" => 443,
            _ => return Err(anyhow!("Error parsing URL: unsupported scheme {scheme}")),
        },
    };

    let endpoint_url = format!("{scheme}://{host}:{port}{path}");

    debug!("endpoint URL: {}", endpoint_url);

    Ok(endpoint_url)
}

/// Login to Vault with the App-ID backend.
///
/// # Errors
/// Returns an error if the request fails, Vault rejects the identity, or the
/// response carries no client token.
pub async fn app_id_login(
    client: &Client,
    url: &str,
    app_id: &str,
    user_id: &SecretString,
) -> Result<SecretString, SecretStoreError> {
    let login_url = endpoint_url(url, "/v1/auth/app-id/login")
        .map_err(|err| SecretStoreError::Url(err.to_string()))?;

    let login_payload = json!({
        "app_id": app_id,
        "user_id": user_id.expose_secret(),
    });

    debug!("login URL: {}, app ID: {}", login_url, app_id);

    let span = info_span!(
        "vault.app_id_login",
        http.method = "POST",
        url = %login_url
    );
    let response = client
        .post(&login_url)
        .json(&login_payload)
        .send()
        .instrument(span)
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let json_response: Value = response.json().await.unwrap_or_default();

        return Err(SecretStoreError::Status {
            url: login_url,
            status,
            message: vault_error_message(&json_response),
        });
    }

    let json_response: Value = response.json().await?;
    let token = json_response
        .get("auth")
        .and_then(|auth| auth.get("client_token"))
        .and_then(Value::as_str)
        .ok_or(SecretStoreError::Response("no client_token found"))?;

    Ok(SecretString::from(token.to_string()))
}
