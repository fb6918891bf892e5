//! # mfaserver
//!
//! TOTP multi-factor enrolment and validation for third-party applications.
//!
//! An application enrols a user by posting the user's directory credentials to
//! `/enrol`: the password is checked with an LDAP bind, a random secret is
//! generated and stored in Vault under `/<issuer>/<domain>/<username>`, and the
//! secret is returned as JSON or as a QR code for an authenticator app. Later
//! logins post the password and the current one-time code to `/validate`,
//! which answers `204` or `401`.
//!
//! Validation fails closed: malformed bodies, directory errors, missing
//! secrets and timeouts are all reported as `401`.

pub mod cli;
pub mod config;
pub mod ldap;
pub mod mfa;
pub mod otp;
pub mod tls;
pub mod vault;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
