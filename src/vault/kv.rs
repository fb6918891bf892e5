use super::{app_id_login, endpoint_url, vault_error_message, SecretKey, SecretStore, SecretStoreError};
use crate::config::{Configuration, KvVersion};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::{debug, info_span, instrument, Instrument};
use url::Url;

const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";

/// Vault key/value engine holding one entry per enrolled identity.
#[derive(Debug, Clone)]
pub struct VaultStore {
    client: Client,
    endpoint: String,
    app_id_read: String,
    app_id_write: String,
    user_id: SecretString,
    secrets_path: String,
    kv_version: KvVersion,
}

impl VaultStore {
    /// Build the store from the secret store settings.
    ///
    /// The HTTP client is created once here, trusting exactly the configured
    /// CA certificates when any are set.
    ///
    /// # Errors
    /// Returns `NotConfigured` when the endpoint, either App-ID, the User-ID or
    /// the secrets path is missing, and `Request` if the client cannot be built.
    pub fn new(config: &Configuration) -> Result<Self, SecretStoreError> {
        let settings = config.secret_store();

        let endpoint = settings
            .endpoint()
            .ok_or(SecretStoreError::NotConfigured("Vault EndPoint"))?;
        let app_id_read = settings
            .app_id_read()
            .ok_or(SecretStoreError::NotConfigured("Vault AppIDRead"))?;
        let app_id_write = settings
            .app_id_write()
            .ok_or(SecretStoreError::NotConfigured("Vault AppIDWrite"))?;
        let user_id = settings
            .user_id()
            .ok_or(SecretStoreError::NotConfigured("Vault UserID"))?;
        let secrets_path = settings
            .secrets_path()
            .ok_or(SecretStoreError::NotConfigured("Vault MFASecretsPath"))?;

        let client = settings
            .transport()
            .client(config.server().request_timeout())?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            app_id_read: app_id_read.to_string(),
            app_id_write: app_id_write.to_string(),
            user_id: SecretString::from(user_id.to_string()),
            secrets_path: secrets_path.to_string(),
            kv_version: settings.kv_version(),
        })
    }

    /// URL of the entry for `key`.
    ///
    /// KV v1: `/v1/<prefix>/<issuer>/<domain>/<username>`.
    /// KV v2: `/v1/<mount>/data/<rest>/<issuer>/<domain>/<username>`.
    ///
    /// # Errors
    /// Returns an error if a key component is empty, `.` or `..`, or if the
    /// endpoint is not a usable base URL.
    pub fn secret_url(&self, key: &SecretKey) -> Result<Url, SecretStoreError> {
        if !key.is_addressable() {
            return Err(SecretStoreError::Url(format!("invalid secret key {key}")));
        }

        let base = endpoint_url(&self.endpoint, "/v1")
            .map_err(|err| SecretStoreError::Url(err.to_string()))?;
        let mut url = Url::parse(&base).map_err(|err| SecretStoreError::Url(err.to_string()))?;

        let mut prefix = self.secrets_path.split('/').filter(|s| !s.is_empty());
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| SecretStoreError::Url(base.clone()))?;
            segments.pop_if_empty();
            match self.kv_version {
                KvVersion::V1 => {
                    segments.extend(prefix);
                }
                KvVersion::V2 => {
                    if let Some(mount) = prefix.next() {
                        segments.push(mount);
                    }
                    segments.push("data");
                    segments.extend(prefix);
                }
            }
            segments.extend(key.segments());
        }

        Ok(url)
    }

    fn write_body(&self, field: &str, value: &SecretString, create_only: bool) -> Value {
        let mut data = Map::new();
        data.insert(field.to_string(), Value::from(value.expose_secret()));

        match self.kv_version {
            KvVersion::V1 => Value::Object(data),
            KvVersion::V2 if create_only => json!({ "options": { "cas": 0 }, "data": data }),
            KvVersion::V2 => json!({ "data": data }),
        }
    }

    async fn write(
        &self,
        key: &SecretKey,
        field: &str,
        value: &SecretString,
        create_only: bool,
    ) -> Result<(), SecretStoreError> {
        let url = self.secret_url(key)?;
        let token = app_id_login(&self.client, &self.endpoint, &self.app_id_write, &self.user_id)
            .await?;

        let span = info_span!(
            "vault.kv.write",
            http.method = "POST",
            url = %url
        );
        let response = self
            .client
            .post(url.as_str())
            .header(VAULT_TOKEN_HEADER, token.expose_secret())
            .json(&self.write_body(field, value, create_only))
            .send()
            .instrument(span)
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!("secret written: {}", key);
            return Ok(());
        }

        let json_response: Value = response.json().await.unwrap_or_default();
        let message = vault_error_message(&json_response);

        if create_only && status == StatusCode::BAD_REQUEST && message.contains("check-and-set") {
            return Err(SecretStoreError::AlreadyExists);
        }

        Err(SecretStoreError::Status {
            url: url.to_string(),
            status,
            message,
        })
    }
}

#[async_trait]
impl SecretStore for VaultStore {
    #[instrument(skip(self, key, value), fields(key = %key))]
    async fn store(
        &self,
        key: &SecretKey,
        field: &str,
        value: &SecretString,
    ) -> Result<(), SecretStoreError> {
        self.write(key, field, value, false).await
    }

    /// KV v2 creates atomically with `cas=0`; KV v1 has no conditional write
    /// and degrades to a plain store.
    #[instrument(skip(self, key, value), fields(key = %key))]
    async fn create(
        &self,
        key: &SecretKey,
        field: &str,
        value: &SecretString,
    ) -> Result<(), SecretStoreError> {
        match self.kv_version {
            KvVersion::V1 => self.write(key, field, value, false).await,
            KvVersion::V2 => self.write(key, field, value, true).await,
        }
    }

    #[instrument(skip(self, key), fields(key = %key))]
    async fn read(&self, key: &SecretKey) -> Result<HashMap<String, String>, SecretStoreError> {
        let url = self.secret_url(key)?;
        let token =
            app_id_login(&self.client, &self.endpoint, &self.app_id_read, &self.user_id).await?;

        let span = info_span!(
            "vault.kv.read",
            http.method = "GET",
            url = %url
        );
        let response = self
            .client
            .get(url.as_str())
            .header(VAULT_TOKEN_HEADER, token.expose_secret())
            .send()
            .instrument(span)
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SecretStoreError::NotFound);
        }
        if !status.is_success() {
            let json_response: Value = response.json().await.unwrap_or_default();
            return Err(SecretStoreError::Status {
                url: url.to_string(),
                status,
                message: vault_error_message(&json_response),
            });
        }

        let json_response: Value = response.json().await?;
        let data = match self.kv_version {
            KvVersion::V1 => json_response.get("data"),
            KvVersion::V2 => json_response.get("data").and_then(|data| data.get("data")),
        };

        // KV v2 reports a deleted version with `data: null`
        let fields = data
            .and_then(Value::as_object)
            .ok_or(SecretStoreError::NotFound)?;

        Ok(fields
            .iter()
            .filter_map(|(name, value)| value.as_str().map(|v| (name.clone(), v.to_string())))
            .collect())
    }
}
