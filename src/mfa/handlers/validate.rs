use super::{decode_body, remote_addr, require, secret_key, RequestError};
use crate::{
    mfa::MfaState,
    otp::{self, Algorithm},
    vault::{SecretStoreError, SECRET_FIELD},
};
use axum::{
    body::Body,
    extract::{ConnectInfo, Extension},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use secrecy::SecretString;
use serde::Deserialize;
use std::{net::SocketAddr, sync::Arc};
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize, Default)]
#[serde(default)]
pub struct ValidationRequest {
    issuer: String,
    domain: String,
    username: String,
    #[schema(format = Password)]
    password: String,
    otp: String,
}

/// Outcome of a validation that got as far as comparing codes.
enum Verdict {
    Pass,
    Fail,
}

#[utoipa::path(
    post,
    path= "/validate",
    request_body = ValidationRequest,
    responses (
        (status = 204, description = "Password and one-time code are valid"),
        (status = 400, description = "Missing field"),
        (status = 401, description = "Rejected: malformed body, bad credentials, unknown identity or wrong code"),
    ),
    tag= "mfa"
)]
// axum handler for validation
pub async fn validate(
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Extension(state): Extension<Arc<MfaState>>,
    body: Body,
) -> Response {
    let remote = remote_addr(connect_info.as_ref());
    let timeout = state.config().server().request_timeout();
    let loggers = state.config().server().loggers();

    let result = tokio::time::timeout(timeout, process(&state, &remote, body))
        .await
        .unwrap_or(Err(RequestError::Timeout(timeout)));

    match result {
        Ok(Verdict::Pass) => StatusCode::NO_CONTENT.into_response(),
        Ok(Verdict::Fail) => StatusCode::UNAUTHORIZED.into_response(),
        Err(err) => {
            if let RequestError::Timeout(_) = err {
                loggers
                    .error
                    .log(format_args!("{remote}, OTP validation aborted: {err}"));
            }
            err.validate_status().into_response()
        }
    }
}

async fn process(state: &MfaState, remote: &str, body: Body) -> Result<Verdict, RequestError> {
    let loggers = state.config().server().loggers();

    let request: ValidationRequest = decode_body(body).await.map_err(|err| {
        loggers.error.log(format_args!(
            "{remote}, could not parse data posted to the validation API: {err}"
        ));
        err
    })?;

    let ValidationRequest {
        issuer,
        domain,
        username,
        password,
        otp: submitted,
    } = request;

    let key = require("domain", &domain)
        .and_then(|()| require("username", &username))
        .and_then(|()| require("otp", &submitted))
        .and_then(|()| require("issuer", &issuer))
        .and_then(|()| secret_key(&issuer, &domain, &username))
        .map_err(|err| {
            loggers.warning.log(format_args!(
                "{remote}, could not extract values from the validation request: {err}"
            ));
            err
        })?;

    loggers.info.log(format_args!(
        "{remote}, OTP validation request received for {domain}/{username}"
    ));

    if let Err(err) = state
        .directory()
        .authenticate(&username, &SecretString::from(password))
        .await
    {
        loggers.info.log(format_args!(
            "{remote}, OTP validation failed for {domain}/{username}. LDAP authentication failed: {err}"
        ));
        return Err(err.into());
    }

    let secret = state
        .secrets()
        .read(&key)
        .await
        .and_then(|mut fields| {
            fields
                .remove(SECRET_FIELD)
                .ok_or(SecretStoreError::NotFound)
        })
        .map_err(|err| {
            loggers.error.log(format_args!(
                "{remote}, error during the validation of OTP for {domain}/{username}: {err}"
            ));
            err
        })?;

    let (expected, _) = otp::current_code(&secret, Algorithm::SHA1, otp::DIGITS).map_err(|err| {
        loggers.error.log(format_args!(
            "{remote}, error during the validation of OTP for {domain}/{username}: {err}"
        ));
        err
    })?;

    if otp::codes_match(&expected, &submitted) {
        loggers.info.log(format_args!(
            "{remote}, OTP validation passed for {domain}/{username}"
        ));
        Ok(Verdict::Pass)
    } else {
        loggers.info.log(format_args!(
            "{remote}, OTP validation failed for {domain}/{username}"
        ));
        Ok(Verdict::Fail)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{
        config::Configuration,
        mfa::handlers::test_support::{
            app, app_with, post_json, FailingStore, MemoryStore, StalledDirectory,
            StaticDirectory, VALID_PASSWORD, VALID_USER,
        },
        vault::SecretKey,
    };
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use totp_rs::{Secret, TOTP};

    const SECRET: &str = "JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP";

    fn enrolled() -> Arc<MemoryStore> {
        let secrets = Arc::new(MemoryStore::default());
        secrets.insert(
            SecretKey::new("testapp", "testdom", VALID_USER),
            SECRET_FIELD,
            SECRET,
        );
        secrets
    }

    fn body(username: &str, password: &str, otp: &str) -> String {
        format!(
            r#"{{"issuer": "testapp", "domain": "testdom", "username": "{username}", "password": "{password}", "otp": "{otp}"}}"#
        )
    }

    fn current() -> String {
        otp::current_code(SECRET, Algorithm::SHA1, otp::DIGITS).unwrap().0
    }

    fn wrong(code: &str) -> String {
        code.chars()
            .map(|c| if c == '0' { '1' } else { '0' })
            .collect()
    }

    #[tokio::test]
    async fn validate_current_code() {
        let app = app(enrolled());
        let (status, response) =
            post_json(&app, "/validate", &body(VALID_USER, VALID_PASSWORD, &current())).await;
        // a code generated on a step boundary can expire before the request runs
        if status != StatusCode::NO_CONTENT {
            let (status, _) =
                post_json(&app, "/validate", &body(VALID_USER, VALID_PASSWORD, &current())).await;
            assert_eq!(status, StatusCode::NO_CONTENT);
        }
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn validate_wrong_code() {
        let app = app(enrolled());
        let (status, _) = post_json(
            &app,
            "/validate",
            &body(VALID_USER, VALID_PASSWORD, &wrong(&current())),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn validate_wrong_credentials() {
        let app = app(enrolled());
        for (username, password) in [(VALID_USER, "invalidpassword"), ("invaliduser", VALID_PASSWORD)]
        {
            let (status, _) =
                post_json(&app, "/validate", &body(username, password, &current())).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{username}/{password}");
        }
    }

    #[tokio::test]
    async fn validate_malformed_body_is_unauthorized() {
        let app = app(enrolled());
        let (status, _) = post_json(
            &app,
            "/validate",
            r#""issuer": "testapp", "domain": "testdom", "username": "validuser"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn validate_missing_field() {
        let app = app(enrolled());
        let tests = [
            r#"{"domain": "testdom", "username": "validuser", "password": "validpassword", "otp": "123456"}"#,
            r#"{"issuer": "testapp", "username": "validuser", "password": "validpassword", "otp": "123456"}"#,
            r#"{"issuer": "testapp", "domain": "testdom", "password": "validpassword", "otp": "123456"}"#,
            r#"{"issuer": "testapp", "domain": "testdom", "username": "validuser", "password": "validpassword"}"#,
        ];
        for body in tests {
            let (status, _) = post_json(&app, "/validate", body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "post data {body}");
        }
    }

    #[tokio::test]
    async fn validate_unknown_identity() {
        let app = app(Arc::new(MemoryStore::default()));
        let (status, _) =
            post_json(&app, "/validate", &body(VALID_USER, VALID_PASSWORD, &current())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn validate_entry_without_secret_field() {
        let secrets = Arc::new(MemoryStore::default());
        secrets.insert(
            SecretKey::new("testapp", "testdom", VALID_USER),
            "other",
            SECRET,
        );
        let app = app(secrets);
        let (status, _) =
            post_json(&app, "/validate", &body(VALID_USER, VALID_PASSWORD, &current())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn validate_timeout_is_unauthorized() {
        let mut config = Configuration::new();
        config
            .with_request_timeout(Duration::from_millis(50))
            .unwrap();
        let app = app_with(config, Arc::new(StalledDirectory), enrolled());

        let (status, _) =
            post_json(&app, "/validate", &body(VALID_USER, VALID_PASSWORD, &current())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn enrol_then_validate() {
        let secrets = Arc::new(MemoryStore::default());
        let app = app(secrets.clone());

        let (status, _) = post_json(
            &app,
            "/enrol",
            r#"{"issuer": "testapp", "domain": "testdom", "username": "validuser", "password": "validpassword"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let secret = secrets
            .secret(&SecretKey::new("testapp", "testdom", VALID_USER), SECRET_FIELD)
            .unwrap();
        let code = otp::current_code(&secret, Algorithm::SHA1, otp::DIGITS)
            .unwrap()
            .0;
        let (status, _) =
            post_json(&app, "/validate", &body(VALID_USER, VALID_PASSWORD, &code)).await;
        assert!(
            status == StatusCode::NO_CONTENT || status == StatusCode::UNAUTHORIZED,
            "unexpected {status}"
        );
        if status == StatusCode::UNAUTHORIZED {
            // crossed a 30 second step; the fresh code must pass
            let code = otp::current_code(&secret, Algorithm::SHA1, otp::DIGITS)
                .unwrap()
                .0;
            let (status, _) =
                post_json(&app, "/validate", &body(VALID_USER, VALID_PASSWORD, &code)).await;
            assert_eq!(status, StatusCode::NO_CONTENT);
        }
    }

    #[tokio::test]
    async fn validate_store_failure_is_unauthorized() {
        let app = app_with(
            Configuration::new(),
            Arc::new(StaticDirectory::default()),
            Arc::new(FailingStore {
                fail_read: true,
                fail_create: false,
            }),
        );
        let (status, _) =
            post_json(&app, "/validate", &body(VALID_USER, VALID_PASSWORD, &current())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn validate_previous_step_code_is_rejected() {
        let totp = TOTP::new_unchecked(
            Algorithm::SHA1,
            otp::DIGITS,
            0,
            otp::STEP_SECONDS,
            Secret::Encoded(SECRET.to_string()).to_bytes().unwrap(),
            None,
            String::new(),
        );
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        let previous = totp.generate(now - otp::STEP_SECONDS);
        if previous == current() {
            // same digits in two consecutive steps
            return;
        }

        let app = app(enrolled());
        let (status, _) =
            post_json(&app, "/validate", &body(VALID_USER, VALID_PASSWORD, &previous)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
