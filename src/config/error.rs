use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while validating or loading configuration.
///
/// Messages keep a stable prefix so callers can match on it.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not open configuration file at {}: {source}", path.display())]
    FileOpen {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration file could not be parsed ({}): {source}", path.display())]
    FileParse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid listener socket {value:?}: {reason}")]
    ListenerSocket { value: String, reason: String },
    #[error("TLS requires both a certificate file and a key file")]
    TlsPathsIncomplete,
    #[error("TLS certificate file {} is not usable: {reason}", path.display())]
    TlsCertificate { path: PathBuf, reason: String },
    #[error("TLS key file {} is not usable: {reason}", path.display())]
    TlsKey { path: PathBuf, reason: String },
    #[error("Invalid log level {0:?}: expected one of DEBUG, INFO, WARNING, ERROR")]
    LogLevel(String),
    #[error("Could not open log file at {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid {which} endpoint {value:?}: {reason}")]
    Endpoint {
        which: &'static str,
        value: String,
        reason: String,
    },
    #[error("Invalid CA certificate: {0}")]
    CaCertificate(String),
    #[error("Could not load CA certificate from {}: {reason}", path.display())]
    CaCertificateFile { path: PathBuf, reason: String },
    #[error("Could not open UserId file at {}: {source}", path.display())]
    UserIdFileOpen {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("UserId file could not be parsed ({}): {reason}", path.display())]
    UserIdFileParse { path: PathBuf, reason: String },
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("LDAP user DN template {0:?} must contain {{username}}")]
    UserDnTemplate(String),
    #[error("Unsupported KV engine version {0}: expected 1 or 2")]
    KvVersion(u8),
    #[error("Request timeout must be greater than zero")]
    RequestTimeout,
}

pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
