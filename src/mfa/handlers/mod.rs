pub mod enrol;
pub use self::enrol::enrol;

pub mod health;
pub use self::health::health;

pub mod validate;
pub use self::validate::validate;

#[cfg(test)]
pub(crate) mod test_support;

// common functions for the handlers
use crate::{
    ldap::DirectoryError,
    otp::OtpError,
    vault::{SecretKey, SecretStoreError},
};
use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{
        header::{ACCEPT, ACCEPT_ENCODING},
        HeaderMap, StatusCode,
    },
};
use serde::de::DeserializeOwned;
use std::{net::SocketAddr, time::Duration};
use thiserror::Error;

/// Largest request body either handler reads.
pub const MAX_BODY_BYTES: usize = 1024;

pub const IMAGE_PNG: &str = "image/png";

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("could not parse request body: {0}")]
    Decode(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("field {0} is not a valid path segment")]
    InvalidField(&'static str),
    #[error("directory authentication failed: {0}")]
    Directory(#[from] DirectoryError),
    #[error("identity is already enrolled")]
    AlreadyEnrolled,
    #[error("secret store: {0}")]
    SecretStore(#[from] SecretStoreError),
    #[error("OTP: {0}")]
    Otp(#[from] OtpError),
    #[error("request did not complete within {0:?}")]
    Timeout(Duration),
}

impl RequestError {
    /// Status returned by the enrolment handler.
    #[must_use]
    pub const fn enrol_status(&self) -> StatusCode {
        match self {
            Self::Decode(_) | Self::MissingField(_) | Self::InvalidField(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Directory(_) => StatusCode::UNAUTHORIZED,
            Self::AlreadyEnrolled => StatusCode::FORBIDDEN,
            Self::SecretStore(_) | Self::Otp(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Status returned by the validation handler; everything but a missing
    /// field is a rejection.
    #[must_use]
    pub const fn validate_status(&self) -> StatusCode {
        match self {
            Self::MissingField(_) | Self::InvalidField(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Read at most [`MAX_BODY_BYTES`] and parse them as JSON.
///
/// # Errors
/// Returns `Decode` when the body is too large, unreadable or not the expected JSON.
pub async fn decode_body<T: DeserializeOwned>(body: Body) -> Result<T, RequestError> {
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|err| RequestError::Decode(err.to_string()))?;

    serde_json::from_slice(&bytes).map_err(|err| RequestError::Decode(err.to_string()))
}

pub fn require(field: &'static str, value: &str) -> Result<(), RequestError> {
    if value.is_empty() {
        Err(RequestError::MissingField(field))
    } else {
        Ok(())
    }
}

/// Key shared by enrolment and validation. Components are used verbatim;
/// `.` and `..` are refused since they would change the storage path.
pub fn secret_key(issuer: &str, domain: &str, username: &str) -> Result<SecretKey, RequestError> {
    for (field, value) in [("issuer", issuer), ("domain", domain), ("username", username)] {
        if matches!(value, "." | "..") {
            return Err(RequestError::InvalidField(field));
        }
    }
    Ok(SecretKey::new(issuer, domain, username))
}

/// The client asked for a QR code instead of JSON.
#[must_use]
pub fn wants_image(headers: &HeaderMap) -> bool {
    // Accept-Encoding is what older clients send
    [ACCEPT, ACCEPT_ENCODING].iter().any(|name| {
        headers
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .any(|item| {
                item.split(';')
                    .next()
                    .is_some_and(|media| media.trim().eq_ignore_ascii_case(IMAGE_PNG))
            })
    })
}

#[must_use]
pub fn remote_addr(connect_info: Option<&ConnectInfo<SocketAddr>>) -> String {
    connect_info.map_or_else(|| "unknown".to_string(), |info| info.0.to_string())
}
