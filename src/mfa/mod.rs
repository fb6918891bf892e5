//! HTTP surface of the MFA server.
//!
//! Routes:
//! - `POST /enrol` creates a TOTP secret for an identity.
//! - `POST /validate` checks a password and a one-time code.
//! - `GET /health` reports build metadata.
//! - `GET /openapi.json` serves the API description.
//!
//! Every response carries an `x-request-id` (ULID) that is also recorded on the
//! request span.

use crate::{
    config::{Configuration, DEFAULT_LISTENER_SOCKET},
    ldap::{DirectoryAuthenticator, LdapAuthenticator},
    tls,
    vault::{SecretStore, VaultStore},
};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::{ConnectInfo, MatchedPath},
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Extension, Router,
};
use hyper_util::{rt::TokioExecutor, rt::TokioIo, server::conn::auto};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug, error, info, info_span, Span};
use ulid::Ulid;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

const REQUEST_ID: &str = "x-request-id";

/// Shared, read-only state handed to every handler.
pub struct MfaState {
    config: Arc<Configuration>,
    directory: Arc<dyn DirectoryAuthenticator>,
    secrets: Arc<dyn SecretStore>,
}

impl MfaState {
    #[must_use]
    pub fn new(
        config: Arc<Configuration>,
        directory: Arc<dyn DirectoryAuthenticator>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            config,
            directory,
            secrets,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    #[must_use]
    pub fn directory(&self) -> &dyn DirectoryAuthenticator {
        self.directory.as_ref()
    }

    #[must_use]
    pub fn secrets(&self) -> &dyn SecretStore {
        self.secrets.as_ref()
    }
}

/// Build the router with request-id and trace layers.
pub fn router(state: Arc<MfaState>) -> Router {
    Router::new()
        .route("/enrol", post(handlers::enrol))
        .route("/validate", post(handlers::validate))
        .route("/health", get(handlers::health))
        .route("/openapi.json", get(openapi::openapi_json))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

/// Start the server
/// # Errors
/// Return error if the gateways cannot be built or the listener fails
pub async fn new(config: Configuration) -> Result<()> {
    let config = Arc::new(config);

    let directory =
        LdapAuthenticator::new(&config).context("Failed to configure the LDAP directory")?;
    let secrets = VaultStore::new(&config).context("Failed to configure the Vault secret store")?;

    let state = Arc::new(MfaState::new(
        config.clone(),
        Arc::new(directory),
        Arc::new(secrets),
    ));
    let app = router(state);

    let socket = bind_address(
        config
            .server()
            .listener_socket()
            .unwrap_or(DEFAULT_LISTENER_SOCKET),
    );
    let listener = TcpListener::bind(&socket)
        .await
        .with_context(|| format!("Failed to bind {socket}"))?;

    let tls_settings = config.server().tls();
    if tls_settings.enabled() {
        let (cert, key) = tls_settings
            .certificate_file()
            .zip(tls_settings.key_file())
            .ok_or_else(|| anyhow!("TLS is enabled without certificate and key files"))?;
        let acceptor = tls::acceptor(cert, key)?;

        info!("Listening on https://{}", listener.local_addr()?);

        serve_tls(listener, acceptor, app).await
    } else {
        info!("Listening on http://{}", listener.local_addr()?);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        Ok(())
    }
}

async fn serve_tls(listener: TcpListener, acceptor: TlsAcceptor, app: Router) -> Result<()> {
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let (stream, addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    error!("Failed to accept connection: {}", err);
                    continue;
                }
            },
            () = &mut shutdown => break,
        };

        let acceptor = acceptor.clone();
        let app = app.clone();

        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(tls_stream) => tls_stream,
                Err(err) => {
                    debug!("TLS handshake failed from {}: {}", addr, err);
                    return;
                }
            };

            let service =
                hyper::service::service_fn(move |mut request: Request<hyper::body::Incoming>| {
                    request.extensions_mut().insert(ConnectInfo(addr));
                    app.clone().oneshot(request)
                });

            if let Err(err) = auto::Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(tls_stream), service)
                .await
            {
                debug!("Error serving connection from {}: {}", addr, err);
            }
        });
    }

    Ok(())
}

/// `:8443` binds every IPv4 interface.
fn bind_address(socket: &str) -> String {
    if socket.starts_with(':') {
        format!("0.0.0.0{socket}")
    } else {
        socket.to_string()
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
