#![allow(clippy::unwrap_used)]

use crate::{
    config::Configuration,
    ldap::{DirectoryAuthenticator, DirectoryError},
    mfa::{router, MfaState},
    vault::{SecretKey, SecretStore, SecretStoreError},
};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use secrecy::{ExposeSecret, SecretString};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tower::ServiceExt;

pub const VALID_USER: &str = "validuser";
pub const VALID_PASSWORD: &str = "validpassword";

/// Accepts exactly one username/password pair.
pub struct StaticDirectory {
    users: HashMap<String, String>,
}

impl Default for StaticDirectory {
    fn default() -> Self {
        Self {
            users: HashMap::from([(VALID_USER.to_string(), VALID_PASSWORD.to_string())]),
        }
    }
}

#[async_trait]
impl DirectoryAuthenticator for StaticDirectory {
    async fn authenticate(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<(), DirectoryError> {
        if password.expose_secret().is_empty() {
            return Err(DirectoryError::EmptyPassword);
        }
        match self.users.get(username) {
            Some(expected) if expected == password.expose_secret() => Ok(()),
            _ => Err(DirectoryError::InvalidCredentials),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<SecretKey, HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn secret(&self, key: &SecretKey, field: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()?
            .get(key)
            .and_then(|fields| fields.get(field).cloned())
    }

    pub fn insert(&self, key: SecretKey, field: &str, value: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries
                .entry(key)
                .or_default()
                .insert(field.to_string(), value.to_string());
        }
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn store(
        &self,
        key: &SecretKey,
        field: &str,
        value: &SecretString,
    ) -> Result<(), SecretStoreError> {
        self.insert(key.clone(), field, value.expose_secret());
        Ok(())
    }

    async fn create(
        &self,
        key: &SecretKey,
        field: &str,
        value: &SecretString,
    ) -> Result<(), SecretStoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| SecretStoreError::Response("poisoned"))?;
        if entries.contains_key(key) {
            return Err(SecretStoreError::AlreadyExists);
        }
        entries.insert(
            key.clone(),
            HashMap::from([(field.to_string(), value.expose_secret().to_string())]),
        );
        Ok(())
    }

    async fn read(&self, key: &SecretKey) -> Result<HashMap<String, String>, SecretStoreError> {
        self.entries
            .lock()
            .map_err(|_| SecretStoreError::Response("poisoned"))?
            .get(key)
            .cloned()
            .ok_or(SecretStoreError::NotFound)
    }
}

pub fn app(secrets: Arc<MemoryStore>) -> Router {
    app_with(
        Configuration::new(),
        Arc::new(StaticDirectory::default()),
        secrets,
    )
}

pub fn app_with(
    config: Configuration,
    directory: Arc<dyn DirectoryAuthenticator>,
    secrets: Arc<dyn SecretStore>,
) -> Router {
    router(Arc::new(MfaState::new(Arc::new(config), directory, secrets)))
}

/// Directory that never answers in time.
pub struct StalledDirectory;

#[async_trait]
impl DirectoryAuthenticator for StalledDirectory {
    async fn authenticate(
        &self,
        _username: &str,
        _password: &SecretString,
    ) -> Result<(), DirectoryError> {
        std::future::pending().await
    }
}

pub async fn post_json(app: &Router, uri: &str, body: &str) -> (StatusCode, Vec<u8>) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

/// Secret store whose reads or writes fail with a backend error.
#[derive(Default)]
pub struct FailingStore {
    pub fail_read: bool,
    pub fail_create: bool,
}

impl FailingStore {
    fn backend_error() -> SecretStoreError {
        SecretStoreError::Status {
            url: "https://vault.tld/v1/secret/mfa".to_string(),
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            message: "Vault is sealed".to_string(),
        }
    }
}

#[async_trait]
impl SecretStore for FailingStore {
    async fn store(
        &self,
        _key: &SecretKey,
        _field: &str,
        _value: &SecretString,
    ) -> Result<(), SecretStoreError> {
        Err(SecretStoreError::Response("permission denied"))
    }

    async fn create(
        &self,
        key: &SecretKey,
        field: &str,
        value: &SecretString,
    ) -> Result<(), SecretStoreError> {
        if self.fail_create {
            self.store(key, field, value).await
        } else {
            Ok(())
        }
    }

    async fn read(&self, _key: &SecretKey) -> Result<HashMap<String, String>, SecretStoreError> {
        if self.fail_read {
            Err(Self::backend_error())
        } else {
            Err(SecretStoreError::NotFound)
        }
    }
}
