//! GitHub webhook signature verification (`X-Hub-Signature`, HMAC-SHA1).

use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::{HookError, Result};

type HmacSha1 = Hmac<Sha1>;

/// Header carrying the `sha1=<hex>` digest of the body.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";
/// Algorithm tag prepended to the hex digest.
pub const SIGNATURE_PREFIX: &str = "sha1=";

/// Computes `sha1=<hex(HMAC-SHA1(secret, payload))>`.
pub fn compute_signature(secret: &str, payload: &[u8]) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|e| HookError::ConfigError(format!("invalid webhook secret: {}", e)))?;
    mac.update(payload);
    Ok(format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Verifies the raw request body against the signature header value.
///
/// The body is only borrowed, so it stays available for parsing afterwards.
/// The computed and provided values are compared as whole strings in constant
/// time; a header with a different length is rejected up front, which only
/// reveals the length of a public digest format.
pub fn verify_signature(secret: &str, payload: &[u8], signature: Option<&str>) -> Result<()> {
    if payload.is_empty() {
        return Err(HookError::BadRequest("empty body".to_string()));
    }

    let signature = match signature {
        Some(s) if !s.is_empty() => s,
        _ => return Err(HookError::MissingSignature),
    };

    let expected = compute_signature(secret, payload)?;
    let matches: bool = expected.as_bytes().ct_eq(signature.as_bytes()).into();

    if !matches {
        warn!(
            expected_length = expected.len(),
            actual_length = signature.len(),
            "sha1 signature didn't match"
        );
        return Err(HookError::InvalidSignature);
    }

    Ok(())
}
