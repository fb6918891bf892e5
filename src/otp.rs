//! TOTP secrets, codes and authenticator enrolment artefacts.

use rand::RngCore;
use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;
use totp_rs::{Secret, TOTP};

pub use totp_rs::Algorithm;

/// Random bytes in a freshly generated secret.
pub const SECRET_BYTES: usize = 32;
pub const DIGITS: usize = 6;
pub const STEP_SECONDS: u64 = 30;

#[derive(Debug, Error)]
pub enum OtpError {
    #[error("secret length must be greater than zero")]
    EmptySecret,
    #[error("secret could not be encoded")]
    Encoding,
    #[error("secret is not valid base32: {0}")]
    Decode(String),
    #[error("system clock is before the unix epoch")]
    Clock(#[from] std::time::SystemTimeError),
    #[error("could not render QR code: {0}")]
    QrCode(String),
}

/// Generate a random secret of `byte_length` bytes, base32 encoded (RFC 4648, unpadded).
///
/// # Errors
/// Returns an error if `byte_length` is zero or encoding fails.
pub fn generate_secret(byte_length: usize) -> Result<String, OtpError> {
    if byte_length == 0 {
        return Err(OtpError::EmptySecret);
    }

    let mut bytes = vec![0u8; byte_length];
    rand::thread_rng().fill_bytes(&mut bytes);

    match Secret::Raw(bytes).to_encoded() {
        Secret::Encoded(encoded) => Ok(encoded),
        Secret::Raw(_) => Err(OtpError::Encoding),
    }
}

/// Current code for `secret` and how long it stays valid.
///
/// # Errors
/// Returns an error if the secret is not base32 or the clock is unusable.
pub fn current_code(
    secret: &str,
    algorithm: Algorithm,
    digits: usize,
) -> Result<(String, Duration), OtpError> {
    let bytes = Secret::Encoded(secret.to_string())
        .to_bytes()
        .map_err(|err| OtpError::Decode(format!("{err:?}")))?;

    // Stored secrets are validated at generation time; skip the length check here.
    let totp = TOTP::new_unchecked(algorithm, digits, 0, STEP_SECONDS, bytes, None, String::new());

    let code = totp.generate_current()?;
    let ttl = totp.ttl()?;

    Ok((code, Duration::from_secs(ttl)))
}

/// `otpauth://` URI understood by authenticator apps.
#[must_use]
pub fn authenticator_uri(issuer: &str, username: &str, domain: &str, secret: &str) -> String {
    let issuer = query_escape(issuer);
    format!(
        "otpauth://totp/{issuer}:{username}@{domain}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits={DIGITS}&period={STEP_SECONDS}"
    )
}

/// Render `uri` as a PNG QR code.
///
/// # Errors
/// Returns an error if the payload does not fit in a QR code.
pub fn qr_png(uri: &str) -> Result<Vec<u8>, OtpError> {
    qrcodegen_image::draw_png(uri).map_err(OtpError::QrCode)
}

fn query_escape(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Constant-time comparison of a submitted code with the expected one.
#[must_use]
pub fn codes_match(expected: &str, submitted: &str) -> bool {
    expected.as_bytes().ct_eq(submitted.as_bytes()).into()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn generated_secret_is_unpadded_base32() {
        let secret = generate_secret(SECRET_BYTES).unwrap();
        // 32 bytes -> ceil(256 / 5) characters
        assert_eq!(secret.len(), 52);
        assert!(secret
            .chars()
            .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)));
        assert_ne!(secret, generate_secret(SECRET_BYTES).unwrap());
    }

    #[test]
    fn zero_length_secret_is_rejected() {
        assert!(matches!(generate_secret(0), Err(OtpError::EmptySecret)));
    }

    #[test]
    fn current_code_has_six_digits() {
        let secret = generate_secret(SECRET_BYTES).unwrap();
        let (code, validity) = current_code(&secret, Algorithm::SHA1, DIGITS).unwrap();
        assert_eq!(code.len(), DIGITS);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
        assert!(validity <= Duration::from_secs(STEP_SECONDS));
    }

    #[test]
    fn current_code_rejects_non_base32() {
        assert!(current_code("not base32!", Algorithm::SHA1, DIGITS).is_err());
    }

    #[test]
    fn uri_escapes_issuer() {
        let uri = authenticator_uri("Acme Corp&Co", "alice", "example", "ABC");
        assert_eq!(
            uri,
            "otpauth://totp/Acme+Corp%26Co:alice@example?secret=ABC&issuer=Acme+Corp%26Co&algorithm=SHA1&digits=6&period=30"
        );
    }

    #[test]
    fn qr_png_has_png_signature() {
        let png = qr_png(&authenticator_uri("testapp", "validuser", "testdom", "ABC")).unwrap();
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n']));
    }

    #[test]
    fn codes_match_is_exact() {
        assert!(codes_match("123456", "123456"));
        assert!(!codes_match("123456", "123457"));
        assert!(!codes_match("123456", "12345"));
        assert!(!codes_match("123456", ""));
    }
}
