//! X-Line-Signature verification: base64(HMAC-SHA256(channel secret, raw body)).

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header LINE puts the body signature in.
pub const SIGNATURE_HEADER: &str = "X-Line-Signature";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("channel secret not configured")]
    NotConfigured,
    #[error("signature header missing")]
    Missing,
    #[error("signature is not valid base64")]
    Malformed,
    #[error("signature does not match body")]
    Mismatch,
}

/// Verifies webhook bodies against the channel secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    channel_secret: Option<String>,
}

impl SignatureVerifier {
    pub fn new(channel_secret: Option<String>) -> Self {
        Self { channel_secret }
    }

    /// Check `signature` (the header value) against `body`. Comparison is constant-time.
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), SignatureError> {
        let secret = self
            .channel_secret
            .as_deref()
            .ok_or(SignatureError::NotConfigured)?;
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(SignatureError::Missing)?;
        let expected = base64::engine::general_purpose::STANDARD
            .decode(signature.as_bytes())
            .map_err(|_| SignatureError::Malformed)?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| SignatureError::NotConfigured)?;
        mac.update(body);
        mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
    }
}

/// Signature LINE would send for `body`. Used by tests and local tooling that replays payloads.
pub fn sign_body(channel_secret: &str, body: &[u8]) -> Result<String, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(channel_secret.as_bytes())
        .map_err(|_| SignatureError::NotConfigured)?;
    mac.update(body);
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}
