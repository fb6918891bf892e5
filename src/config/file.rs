//! On-disk JSON layout. Every field is optional; absent fields keep defaults.

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ConfigFile {
    #[serde(rename = "MFAServer")]
    pub mfa_server: Option<ServerSection>,
    pub vault: Option<VaultSection>,
    #[serde(rename = "LDAP")]
    pub ldap: Option<LdapSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ServerSection {
    pub listener_socket: Option<String>,
    #[serde(rename = "TLS")]
    pub tls: Option<TlsSection>,
    pub log_file: Option<PathBuf>,
    pub log_level: Option<String>,
    pub request_timeout: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct TlsSection {
    #[serde(default)]
    pub enabled: bool,
    pub certificate_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct VaultSection {
    pub vault_connection: Option<VaultConnection>,
    #[serde(rename = "AppIDRead")]
    pub app_id_read: Option<String>,
    #[serde(rename = "AppIDWrite")]
    pub app_id_write: Option<String>,
    #[serde(rename = "UserIDFile")]
    pub user_id_file: Option<PathBuf>,
    #[serde(rename = "UserID")]
    pub user_id: Option<String>,
    #[serde(rename = "MFASecretsPath")]
    pub mfa_secrets_path: Option<String>,
    #[serde(rename = "KVVersion")]
    pub kv_version: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct VaultConnection {
    pub end_point: Option<String>,
    #[serde(rename = "TrustCACert")]
    pub trust_ca_cert: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct LdapSection {
    pub end_point: Option<String>,
    #[serde(rename = "TrustCACert")]
    pub trust_ca_cert: Option<PathBuf>,
    #[serde(rename = "UserDN")]
    pub user_dn: Option<String>,
}

/// Content of the Vault identity file: `{"UserId": "..."}`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct UserIdFile {
    #[serde(rename = "UserId")]
    pub user_id: String,
}
