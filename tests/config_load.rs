#![allow(clippy::unwrap_used)]

use mfaserver::config::{Configuration, KvVersion, LogLevel};
use std::{io::Write, path::Path, time::Duration};
use tempfile::{NamedTempFile, TempDir};

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn load_full_configuration_file() {
    let dir = TempDir::new().unwrap();

    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert = write(dir.path(), "server.crt", &certified.cert.pem());
    let key = write(dir.path(), "server.key", &certified.key_pair.serialize_pem());
    let ca = write(dir.path(), "ca.pem", &certified.cert.pem());
    let user_id = write(
        dir.path(),
        "user-id.json",
        r#"{"UserId": "0ecd7b5d-4885-45c1-a03f-5949e485c6bf"}"#,
    );
    let log_file = dir.path().join("mfaserver.log");

    let json = serde_json::json!({
        "MFAServer": {
            "ListenerSocket": "127.0.0.1:7443",
            "TLS": {
                "Enabled": true,
                "CertificateFile": cert,
                "KeyFile": key,
            },
            "LogFile": log_file,
            "LogLevel": "WARNING",
            "RequestTimeout": 5,
        },
        "Vault": {
            "VaultConnection": {
                "EndPoint": "https://vault.tld:8200",
                "TrustCACert": ca,
            },
            "AppIDRead": "mfa-read",
            "AppIDWrite": "mfa-write",
            "UserIDFile": user_id,
            "MFASecretsPath": "kv/mfa",
            "KVVersion": 2,
        },
        "LDAP": {
            "EndPoint": "ldaps://ldap.tld:1636",
            "TrustCACert": ca,
            "UserDN": "uid={username},ou=people,dc=example,dc=com",
        },
    });
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.to_string().as_bytes()).unwrap();

    let config = Configuration::load(file.path()).unwrap();

    let server = config.server();
    assert_eq!(server.listener_socket(), Some("127.0.0.1:7443"));
    assert!(server.tls().enabled());
    assert_eq!(server.tls().certificate_file(), Some(cert.as_path()));
    assert_eq!(server.tls().key_file(), Some(key.as_path()));
    assert_eq!(server.log_file(), Some(log_file.as_path()));
    assert!(log_file.exists());
    assert_eq!(server.log_level(), Some(LogLevel::Warning));
    assert!(!server.loggers().info.is_enabled());
    assert!(server.loggers().warning.is_enabled());
    assert_eq!(server.request_timeout(), Duration::from_secs(5));

    let vault = config.secret_store();
    assert_eq!(vault.endpoint(), Some("https://vault.tld:8200"));
    assert_eq!(vault.trust_ca_cert_file(), Some(ca.as_path()));
    assert_eq!(vault.transport().root_certificates().len(), 1);
    assert_eq!(
        vault.transport().root_certificates()[0].der(),
        certified.cert.der().as_ref()
    );
    assert_eq!(vault.app_id_read(), Some("mfa-read"));
    assert_eq!(vault.app_id_write(), Some("mfa-write"));
    assert_eq!(vault.user_id_file(), Some(user_id.as_path()));
    assert_eq!(vault.user_id(), Some("0ecd7b5d-4885-45c1-a03f-5949e485c6bf"));
    assert_eq!(vault.secrets_path(), Some("kv/mfa"));
    assert_eq!(vault.kv_version(), KvVersion::V2);

    let ldap = config.directory();
    assert_eq!(ldap.endpoint(), Some("ldaps://ldap.tld:1636"));
    assert_eq!(ldap.address(), Some("ldap.tld:1636"));
    assert!(ldap.use_tls());
    assert_eq!(ldap.trust_ca_certs(), vault.transport().root_certificates());
    assert_eq!(
        ldap.bind_dn("alice").as_deref(),
        Some("uid=alice,ou=people,dc=example,dc=com")
    );
}

#[test]
fn load_stops_at_first_invalid_field() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(
        br#"{"MFAServer": {"ListenerSocket": "127.0.0.1:7443", "LogLevel": "verbose"}}"#,
    )
    .unwrap();

    let err = Configuration::load(file.path()).unwrap_err();
    assert!(err.to_string().contains("verbose"), "{err}");
}

#[test]
fn load_plain_ldap_defaults_port() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(
        br#"{"LDAP": {"EndPoint": "ldap://ldap.tld", "UserDN": "cn={username},dc=tld"}}"#,
    )
    .unwrap();

    let config = Configuration::load(file.path()).unwrap();
    assert_eq!(config.directory().address(), Some("ldap.tld:389"));
    assert!(!config.directory().use_tls());
    assert_eq!(config.server().listener_socket(), Some("0.0.0.0:8443"));
}
