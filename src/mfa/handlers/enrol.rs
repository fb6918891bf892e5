use super::{decode_body, remote_addr, require, secret_key, wants_image, RequestError, IMAGE_PNG};
use crate::{
    mfa::MfaState,
    otp,
    vault::{SecretStoreError, SECRET_FIELD},
};
use axum::{
    body::Body,
    extract::{ConnectInfo, Extension},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize, Default)]
#[serde(default)]
pub struct EnrolmentRequest {
    issuer: String,
    domain: String,
    username: String,
    #[schema(format = Password)]
    password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EnrolmentResponse {
    secret: String,
}

#[utoipa::path(
    post,
    path= "/enrol",
    request_body = EnrolmentRequest,
    responses (
        (status = 201, description = "Secret created; JSON by default, QR code with `Accept: image/png`", body = EnrolmentResponse),
        (status = 400, description = "Malformed body or missing field"),
        (status = 401, description = "Directory authentication failed"),
        (status = 403, description = "Identity is already enrolled"),
        (status = 500, description = "Secret could not be generated or stored"),
        (status = 504, description = "Request deadline exceeded"),
    ),
    tag= "mfa"
)]
// axum handler for enrolment
pub async fn enrol(
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Extension(state): Extension<Arc<MfaState>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let remote = remote_addr(connect_info.as_ref());
    let timeout = state.config().server().request_timeout();

    let result = tokio::time::timeout(timeout, process(&state, &remote, &headers, body))
        .await
        .unwrap_or(Err(RequestError::Timeout(timeout)));

    match result {
        Ok(response) => response,
        Err(err) => {
            if let RequestError::Timeout(_) = err {
                state
                    .config()
                    .server()
                    .loggers()
                    .error
                    .log(format_args!("{remote}, OTP enrolment aborted: {err}"));
            }
            err.enrol_status().into_response()
        }
    }
}

async fn process(
    state: &MfaState,
    remote: &str,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response, RequestError> {
    let loggers = state.config().server().loggers();

    let request: EnrolmentRequest = decode_body(body).await.map_err(|err| {
        loggers.error.log(format_args!(
            "{remote}, could not parse data posted to the enrolment API: {err}"
        ));
        err
    })?;

    let EnrolmentRequest {
        issuer,
        domain,
        username,
        password,
    } = request;

    let key = require("domain", &domain)
        .and_then(|()| require("username", &username))
        .and_then(|()| require("issuer", &issuer))
        .and_then(|()| require("password", &password))
        .and_then(|()| secret_key(&issuer, &domain, &username))
        .map_err(|err| {
            loggers
                .warning
                .log(format_args!("{remote}, invalid enrolment request: {err}"));
            err
        })?;

    loggers.info.log(format_args!(
        "{remote}, OTP enrolment request received for {domain}/{username}"
    ));

    if let Err(err) = state
        .directory()
        .authenticate(&username, &SecretString::from(password))
        .await
    {
        loggers.info.log(format_args!(
            "{remote}, OTP enrolment failed for {domain}/{username}. LDAP authentication failed: {err}"
        ));
        return Err(err.into());
    }

    match state.secrets().read(&key).await {
        Ok(fields) if fields.contains_key(SECRET_FIELD) => {
            loggers.warning.log(format_args!(
                "{remote}, OTP enrolment refused for {domain}/{username}: already enrolled"
            ));
            return Err(RequestError::AlreadyEnrolled);
        }
        Ok(_) | Err(SecretStoreError::NotFound) => {}
        Err(err) => {
            loggers.error.log(format_args!(
                "{remote}, OTP enrolment failed for {domain}/{username} whilst checking for an existing secret: {err}"
            ));
            return Err(err.into());
        }
    }

    let secret = otp::generate_secret(otp::SECRET_BYTES).map_err(|err| {
        loggers.error.log(format_args!(
            "{remote}, OTP enrolment failed for {domain}/{username} whilst generating secret: {err}"
        ));
        err
    })?;

    match state
        .secrets()
        .create(&key, SECRET_FIELD, &SecretString::from(secret.clone()))
        .await
    {
        Ok(()) => {}
        Err(SecretStoreError::AlreadyExists) => {
            loggers.warning.log(format_args!(
                "{remote}, OTP enrolment refused for {domain}/{username}: enrolled concurrently"
            ));
            return Err(RequestError::AlreadyEnrolled);
        }
        Err(err) => {
            loggers.error.log(format_args!(
                "{remote}, OTP enrolment failed for {domain}/{username} whilst storing secret: {err}"
            ));
            return Err(err.into());
        }
    }

    loggers.info.log(format_args!(
        "{remote}, successfully created and stored secret for {domain}/{username}"
    ));

    if wants_image(headers) {
        let uri = otp::authenticator_uri(&issuer, &username, &domain, &secret);
        let png = otp::qr_png(&uri).map_err(|err| {
            loggers.error.log(format_args!(
                "{remote}, OTP enrolment failed for {domain}/{username} whilst generating QR code: {err}"
            ));
            err
        })?;

        return Ok((StatusCode::CREATED, [(CONTENT_TYPE, IMAGE_PNG)], png).into_response());
    }

    Ok((StatusCode::CREATED, Json(EnrolmentResponse { secret })).into_response())
}
