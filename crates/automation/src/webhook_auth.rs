//! Dispatcher authentication: static token/API-key comparison plus
//! optional HMAC-SHA256 of `timestamp + "." + raw_body`, within a
//! configurable timestamp tolerance window.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingCredential,
    BadToken,
    BadSignature,
    StaleTimestamp,
}

/// Constant-time comparison of an API key or verification token against
/// the configured value.
pub fn check_static_token(provided: Option<&str>, expected: &str) -> Result<(), AuthFailure> {
    let provided = provided.ok_or(AuthFailure::MissingCredential)?;
    if provided.as_bytes().ct_eq(expected.as_bytes()).unwrap_u8() == 1 {
        Ok(())
    } else {
        Err(AuthFailure::BadToken)
    }
}

/// Verify `X-Signature: sha256=<hex>` against `timestamp + "." + body`,
/// rejecting requests whose timestamp is outside `tolerance_seconds` of
/// now.
pub fn verify_hmac(
    secret: &str,
    timestamp: i64,
    now: i64,
    tolerance_seconds: i64,
    body: &[u8],
    signature_header: &str,
) -> Result<(), AuthFailure> {
    if (now - timestamp).abs() > tolerance_seconds {
        return Err(AuthFailure::StaleTimestamp);
    }
    let sig_hex = signature_header.strip_prefix("sha256=").unwrap_or(signature_header);

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    let computed = hex::encode(mac.finalize().into_bytes());

    if computed.as_bytes().ct_eq(sig_hex.as_bytes()).unwrap_u8() == 1 {
        Ok(())
    } else {
        Err(AuthFailure::BadSignature)
    }
}
