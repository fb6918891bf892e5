//! Layered configuration for the MFA server.
//!
//! A [`Configuration`] starts from documented defaults, is optionally
//! overridden through validating `with_*` mutators or bulk-loaded from a JSON
//! file, and is then shared read-only (behind an `Arc`) by every handler.
//!
//! Every mutator validates its input before touching any state, so a rejected
//! value leaves the configuration exactly as it was:
//!
//! ```no_run
//! # fn main() -> Result<(), mfaserver::config::ConfigError> {
//! let mut config = mfaserver::config::Configuration::new();
//! config
//!     .with_listener_socket("127.0.0.1:7443")?
//!     .with_log_level("WARNING")?
//!     .with_secret_store_endpoint("https://vault.tld:8200")?;
//! # Ok(())
//! # }
//! ```

mod error;
mod file;
mod logging;
mod transport;

pub use error::{ConfigError, Result};
pub use logging::{LogLevel, Logger, Loggers};
pub use transport::{CaCertificate, HttpTransport};

use crate::tls;
use file::{ConfigFile, LdapSection, ServerSection, UserIdFile, VaultSection};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::{
    fs::{self, OpenOptions},
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

pub const DEFAULT_LISTENER_SOCKET: &str = "0.0.0.0:8443";
pub const DEFAULT_SECRETS_PATH: &str = "secret/mfa";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const USERNAME_PLACEHOLDER: &str = "{username}";

const LDAP_PORT: u16 = 389;
const LDAPS_PORT: u16 = 636;

#[derive(Debug, Clone)]
pub struct Configuration {
    server: ServerSettings,
    secret_store: SecretStoreSettings,
    directory: DirectorySettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    listener_socket: Option<String>,
    tls: TlsSettings,
    log_file: Option<PathBuf>,
    log_level: Option<LogLevel>,
    loggers: Loggers,
    request_timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    enabled: bool,
    certificate_file: Option<PathBuf>,
    key_file: Option<PathBuf>,
}

/// Layout of the Vault key/value engine holding the secrets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KvVersion {
    #[default]
    V1,
    /// Versioned engine; supports check-and-set writes.
    V2,
}

#[derive(Debug, Clone)]
pub struct SecretStoreSettings {
    endpoint: Option<String>,
    trust_ca_cert_file: Option<PathBuf>,
    transport: HttpTransport,
    app_id_read: Option<String>,
    app_id_write: Option<String>,
    user_id_file: Option<PathBuf>,
    user_id: Option<SecretString>,
    secrets_path: Option<String>,
    kv_version: KvVersion,
}

#[derive(Debug, Clone, Default)]
pub struct DirectorySettings {
    endpoint: Option<String>,
    address: Option<String>,
    use_tls: bool,
    trust_ca_cert_file: Option<PathBuf>,
    trust_ca_certs: Vec<CaCertificate>,
    user_dn: Option<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl Configuration {
    /// Baseline configuration: listener `0.0.0.0:8443`, secrets under `secret/mfa`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            server: ServerSettings {
                listener_socket: Some(DEFAULT_LISTENER_SOCKET.to_string()),
                tls: TlsSettings::default(),
                log_file: None,
                log_level: None,
                loggers: Loggers::default(),
                request_timeout: DEFAULT_REQUEST_TIMEOUT,
            },
            secret_store: SecretStoreSettings {
                endpoint: None,
                trust_ca_cert_file: None,
                transport: HttpTransport::default(),
                app_id_read: None,
                app_id_write: None,
                user_id_file: None,
                user_id: None,
                secrets_path: Some(DEFAULT_SECRETS_PATH.to_string()),
                kv_version: KvVersion::default(),
            },
            directory: DirectorySettings::default(),
        }
    }

    /// Load a configuration file on top of the defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or if any present
    /// field fails the same validation its mutator applies.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile =
            serde_json::from_str(&raw).map_err(|source| ConfigError::FileParse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut config = Self::new();
        if let Some(section) = file.mfa_server {
            config.apply_server(section)?;
        }
        if let Some(section) = file.vault {
            config.apply_vault(section)?;
        }
        if let Some(section) = file.ldap {
            config.apply_ldap(section)?;
        }

        Ok(config)
    }

    fn apply_server(&mut self, section: ServerSection) -> Result<()> {
        if let Some(socket) = section.listener_socket {
            self.with_listener_socket(&socket)?;
        }
        if let Some(tls) = section.tls {
            if tls.enabled {
                match (tls.certificate_file, tls.key_file) {
                    (Some(cert), Some(key)) => {
                        self.with_tls(cert, key)?;
                    }
                    _ => return Err(ConfigError::TlsPathsIncomplete),
                }
            } else {
                self.without_tls();
            }
        }
        if let Some(log_file) = section.log_file {
            self.with_log_file(log_file)?;
        }
        if let Some(level) = section.log_level {
            self.with_log_level(&level)?;
        }
        if let Some(seconds) = section.request_timeout {
            self.with_request_timeout(Duration::from_secs(seconds))?;
        }
        Ok(())
    }

    fn apply_vault(&mut self, section: VaultSection) -> Result<()> {
        if let Some(connection) = section.vault_connection {
            if let Some(endpoint) = connection.end_point {
                self.with_secret_store_endpoint(&endpoint)?;
            }
            if let Some(ca) = connection.trust_ca_cert {
                self.with_secret_store_ca_file(ca)?;
            }
        }
        if let Some(id) = section.app_id_read {
            self.with_secret_store_read_id(&id)?;
        }
        if let Some(id) = section.app_id_write {
            self.with_secret_store_write_id(&id)?;
        }
        if let Some(user_id) = section.user_id {
            self.with_secret_store_identity(&user_id)?;
        }
        if let Some(user_id_file) = section.user_id_file {
            self.with_secret_store_identity_file(user_id_file)?;
        }
        if let Some(path) = section.mfa_secrets_path {
            self.with_secrets_path_prefix(&path)?;
        }
        if let Some(version) = section.kv_version {
            self.with_kv_version(version)?;
        }
        Ok(())
    }

    fn apply_ldap(&mut self, section: LdapSection) -> Result<()> {
        let LdapSection {
            end_point,
            trust_ca_cert,
            user_dn,
        } = section;

        match (end_point, user_dn) {
            (Some(endpoint), Some(user_dn)) => {
                self.with_directory(&endpoint, trust_ca_cert.as_deref(), &user_dn)?;
                Ok(())
            }
            (None, None) if trust_ca_cert.is_none() => Ok(()),
            (None, _) => Err(ConfigError::Empty("LDAP EndPoint")),
            (Some(_), None) => Err(ConfigError::Empty("LDAP UserDN")),
        }
    }

    #[must_use]
    pub const fn server(&self) -> &ServerSettings {
        &self.server
    }

    #[must_use]
    pub const fn secret_store(&self) -> &SecretStoreSettings {
        &self.secret_store
    }

    #[must_use]
    pub const fn directory(&self) -> &DirectorySettings {
        &self.directory
    }

    /// # Errors
    /// Returns an error if `socket` is not a valid `host:port` pair.
    pub fn with_listener_socket(&mut self, socket: &str) -> Result<&mut Self> {
        validate_listener_socket(socket).map_err(|reason| ConfigError::ListenerSocket {
            value: socket.to_string(),
            reason,
        })?;
        self.server.listener_socket = Some(socket.to_string());
        Ok(self)
    }

    /// Enable TLS with the given PEM certificate chain and private key.
    ///
    /// # Errors
    /// Returns an error if either file is missing or holds no usable PEM material.
    pub fn with_tls(
        &mut self,
        certificate_file: impl Into<PathBuf>,
        key_file: impl Into<PathBuf>,
    ) -> Result<&mut Self> {
        let certificate_file = certificate_file.into();
        let key_file = key_file.into();
        if certificate_file.as_os_str().is_empty() || key_file.as_os_str().is_empty() {
            return Err(ConfigError::TlsPathsIncomplete);
        }

        tls::load_cert_chain(&certificate_file).map_err(|err| ConfigError::TlsCertificate {
            path: certificate_file.clone(),
            reason: format!("{err:#}"),
        })?;
        tls::load_private_key(&key_file).map_err(|err| ConfigError::TlsKey {
            path: key_file.clone(),
            reason: format!("{err:#}"),
        })?;

        self.server.tls = TlsSettings {
            enabled: true,
            certificate_file: Some(certificate_file),
            key_file: Some(key_file),
        };
        Ok(self)
    }

    pub fn without_tls(&mut self) -> &mut Self {
        self.server.tls = TlsSettings::default();
        self
    }

    /// # Errors
    /// Returns an error if the log file cannot be created or opened for append.
    pub fn with_log_file(&mut self, path: impl Into<PathBuf>) -> Result<&mut Self> {
        let path = path.into();
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| ConfigError::LogFile {
                path: path.clone(),
                source,
            })?;
        self.server.log_file = Some(path);
        Ok(self)
    }

    /// Accepts exactly `DEBUG`, `INFO`, `WARNING` or `ERROR`.
    ///
    /// # Errors
    /// Returns an error for any other value; the loggers are left untouched.
    pub fn with_log_level(&mut self, level: &str) -> Result<&mut Self> {
        let level: LogLevel = level.parse()?;
        self.server.log_level = Some(level);
        self.server.loggers = Loggers::with_threshold(level);
        Ok(self)
    }

    /// # Errors
    /// Returns an error if `timeout` is zero.
    pub fn with_request_timeout(&mut self, timeout: Duration) -> Result<&mut Self> {
        if timeout.is_zero() {
            return Err(ConfigError::RequestTimeout);
        }
        self.server.request_timeout = timeout;
        Ok(self)
    }

    /// Configure the LDAP directory used for primary-password checks.
    ///
    /// The scheme decides TLS (`ldaps`) or plain (`ldap`); `user_dn` must carry
    /// the `{username}` placeholder.
    ///
    /// # Errors
    /// Returns an error if the URL, the CA certificate file or the DN template
    /// is invalid.
    pub fn with_directory(
        &mut self,
        endpoint: &str,
        trust_ca_cert: Option<&Path>,
        user_dn: &str,
    ) -> Result<&mut Self> {
        let (address, use_tls) = parse_ldap_endpoint(endpoint)?;

        if !user_dn.contains(USERNAME_PLACEHOLDER) {
            return Err(ConfigError::UserDnTemplate(user_dn.to_string()));
        }

        let trust_ca_cert = trust_ca_cert.filter(|path| !path.as_os_str().is_empty());
        let trust_ca_certs = match trust_ca_cert {
            Some(path) => CaCertificate::from_pem_file(path)?,
            None => Vec::new(),
        };

        self.directory = DirectorySettings {
            endpoint: Some(endpoint.to_string()),
            address: Some(address),
            use_tls,
            trust_ca_cert_file: trust_ca_cert.map(Path::to_path_buf),
            trust_ca_certs,
            user_dn: Some(user_dn.to_string()),
        };
        Ok(self)
    }

    /// # Errors
    /// Returns an error unless `endpoint` is an `http(s)` URL with a host.
    pub fn with_secret_store_endpoint(&mut self, endpoint: &str) -> Result<&mut Self> {
        let invalid = |reason: String| ConfigError::Endpoint {
            which: "Vault",
            value: endpoint.to_string(),
            reason,
        };
        let url = Url::parse(endpoint).map_err(|err| invalid(err.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", url.scheme())));
        }
        if url.host_str().filter(|host| !host.is_empty()).is_none() {
            return Err(invalid("no host specified".to_string()));
        }

        self.secret_store.endpoint = Some(endpoint.to_string());
        Ok(self)
    }

    /// Trust exactly `certificate` for secret store connections.
    pub fn with_secret_store_ca_cert(&mut self, certificate: CaCertificate) -> &mut Self {
        self.secret_store.transport.trust_only(vec![certificate]);
        self.secret_store.trust_ca_cert_file = None;
        self
    }

    /// Trust exactly the certificates of a PEM file for secret store connections.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or holds no valid certificate.
    pub fn with_secret_store_ca_file(&mut self, path: impl Into<PathBuf>) -> Result<&mut Self> {
        let path = path.into();
        let certificates = CaCertificate::from_pem_file(&path)?;
        self.secret_store.transport.trust_only(certificates);
        self.secret_store.trust_ca_cert_file = Some(path);
        Ok(self)
    }

    /// # Errors
    /// Returns an error if `id` is empty.
    pub fn with_secret_store_read_id(&mut self, id: &str) -> Result<&mut Self> {
        self.secret_store.app_id_read = Some(non_empty("Vault AppIDRead", id)?);
        Ok(self)
    }

    /// # Errors
    /// Returns an error if `id` is empty.
    pub fn with_secret_store_write_id(&mut self, id: &str) -> Result<&mut Self> {
        self.secret_store.app_id_write = Some(non_empty("Vault AppIDWrite", id)?);
        Ok(self)
    }

    /// # Errors
    /// Returns an error if `user_id` is empty.
    pub fn with_secret_store_identity(&mut self, user_id: &str) -> Result<&mut Self> {
        let user_id = non_empty("Vault UserID", user_id)?;
        self.secret_store.user_id = Some(SecretString::from(user_id));
        Ok(self)
    }

    /// Read the identity from a `{"UserId": "..."}` file.
    ///
    /// # Errors
    /// Returns `UserIdFileOpen` if the file cannot be read and `UserIdFileParse`
    /// if it is not the expected JSON object.
    pub fn with_secret_store_identity_file(
        &mut self,
        path: impl Into<PathBuf>,
    ) -> Result<&mut Self> {
        let path = path.into();
        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::UserIdFileOpen {
            path: path.clone(),
            source,
        })?;
        let parsed: UserIdFile =
            serde_json::from_str(&raw).map_err(|err| ConfigError::UserIdFileParse {
                path: path.clone(),
                reason: err.to_string(),
            })?;
        if parsed.user_id.is_empty() {
            return Err(ConfigError::UserIdFileParse {
                path,
                reason: "UserId is empty".to_string(),
            });
        }

        self.secret_store.user_id = Some(SecretString::from(parsed.user_id));
        self.secret_store.user_id_file = Some(path);
        Ok(self)
    }

    /// # Errors
    /// Returns an error if `path` is empty or only slashes.
    pub fn with_secrets_path_prefix(&mut self, path: &str) -> Result<&mut Self> {
        if path.trim_matches('/').is_empty() {
            return Err(ConfigError::Empty("Vault MFASecretsPath"));
        }
        self.secret_store.secrets_path = Some(path.to_string());
        Ok(self)
    }

    /// # Errors
    /// Returns an error unless `version` is 1 or 2.
    pub fn with_kv_version(&mut self, version: u8) -> Result<&mut Self> {
        self.secret_store.kv_version = match version {
            1 => KvVersion::V1,
            2 => KvVersion::V2,
            other => return Err(ConfigError::KvVersion(other)),
        };
        Ok(self)
    }
}

impl ServerSettings {
    #[must_use]
    pub fn listener_socket(&self) -> Option<&str> {
        self.listener_socket.as_deref()
    }

    #[must_use]
    pub const fn tls(&self) -> &TlsSettings {
        &self.tls
    }

    #[must_use]
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    #[must_use]
    pub const fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    #[must_use]
    pub const fn loggers(&self) -> &Loggers {
        &self.loggers
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

impl TlsSettings {
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn certificate_file(&self) -> Option<&Path> {
        self.certificate_file.as_deref()
    }

    #[must_use]
    pub fn key_file(&self) -> Option<&Path> {
        self.key_file.as_deref()
    }
}

impl SecretStoreSettings {
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    #[must_use]
    pub fn trust_ca_cert_file(&self) -> Option<&Path> {
        self.trust_ca_cert_file.as_deref()
    }

    #[must_use]
    pub const fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    #[must_use]
    pub fn app_id_read(&self) -> Option<&str> {
        self.app_id_read.as_deref()
    }

    #[must_use]
    pub fn app_id_write(&self) -> Option<&str> {
        self.app_id_write.as_deref()
    }

    #[must_use]
    pub fn user_id_file(&self) -> Option<&Path> {
        self.user_id_file.as_deref()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_ref().map(ExposeSecret::expose_secret)
    }

    #[must_use]
    pub fn secrets_path(&self) -> Option<&str> {
        self.secrets_path.as_deref()
    }

    #[must_use]
    pub const fn kv_version(&self) -> KvVersion {
        self.kv_version
    }
}

impl DirectorySettings {
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// `host:port` taken from the endpoint authority.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    #[must_use]
    pub const fn use_tls(&self) -> bool {
        self.use_tls
    }

    #[must_use]
    pub fn trust_ca_cert_file(&self) -> Option<&Path> {
        self.trust_ca_cert_file.as_deref()
    }

    #[must_use]
    pub fn trust_ca_certs(&self) -> &[CaCertificate] {
        &self.trust_ca_certs
    }

    #[must_use]
    pub fn user_dn(&self) -> Option<&str> {
        self.user_dn.as_deref()
    }

    /// Bind DN for `username`, escaped so it cannot alter the DN structure.
    #[must_use]
    pub fn bind_dn(&self, username: &str) -> Option<String> {
        self.user_dn
            .as_deref()
            .map(|template| expand_user_dn(template, username))
    }
}

/// Substitute `username`, DN-escaped, for every `{username}` in `template`.
#[must_use]
pub fn expand_user_dn(template: &str, username: &str) -> String {
    template.replace(USERNAME_PLACEHOLDER, &ldap3::dn_escape(username))
}

fn non_empty(field: &'static str, value: &str) -> Result<String> {
    if value.is_empty() {
        Err(ConfigError::Empty(field))
    } else {
        Ok(value.to_string())
    }
}

fn valid_hostname(host: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*\.?$")
        .is_ok_and(|re| re.is_match(host))
}

fn validate_listener_socket(socket: &str) -> std::result::Result<(), String> {
    if socket.parse::<SocketAddr>().is_ok() {
        return Ok(());
    }

    let (host, port) = socket
        .rsplit_once(':')
        .ok_or_else(|| "expected host:port".to_string())?;

    if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("port {port:?} is not numeric"));
    }
    port.parse::<u16>()
        .map_err(|_| format!("port {port} is outside 0-65535"))?;

    if host.is_empty() {
        // ":8443" binds every interface
        return Ok(());
    }
    if host.starts_with('[') || host.contains(':') {
        return Err(format!("{host} is not a valid IPv6 address"));
    }
    if host.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return host
            .parse::<Ipv4Addr>()
            .map(|_| ())
            .map_err(|_| format!("{host} is not a valid IPv4 address"));
    }
    if valid_hostname(host) {
        Ok(())
    } else {
        Err(format!("{host} is not a valid host name"))
    }
}

fn parse_ldap_endpoint(endpoint: &str) -> Result<(String, bool)> {
    let invalid = |reason: String| ConfigError::Endpoint {
        which: "LDAP",
        value: endpoint.to_string(),
        reason,
    };

    let url = Url::parse(endpoint).map_err(|err| invalid(err.to_string()))?;
    let (use_tls, default_port) = match url.scheme() {
        "ldap" => (false, LDAP_PORT),
        "ldaps" => (true, LDAPS_PORT),
        other => return Err(invalid(format!("unsupported scheme {other}"))),
    };
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| invalid("no host specified".to_string()))?;
    let port = url.port().unwrap_or(default_port);

    Ok((format!("{host}:{port}"), use_tls))
}
