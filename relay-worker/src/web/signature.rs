//! `X-Hub-Signature-256` verification.
//!
//! The platform signs every POST body with HMAC-SHA256 keyed by the app
//! secret and sends `sha256=<lowercase hex digest>`. Verification must run
//! on the body exactly as received.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Verifies webhook bodies against a shared secret.
///
/// A verifier built without a secret rejects every request.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Option<String>,
}

impl SignatureVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Check `header` against the signature of `body`.
    pub fn verify(&self, body: &[u8], header: Option<&str>) -> bool {
        let Some(secret) = self.secret.as_deref() else {
            warn!(has_signature = header.is_some(), "signature_secret_not_configured");
            return false;
        };

        let Some(header) = header else {
            warn!(body_length = body.len(), "signature_header_missing");
            return false;
        };

        verify_signature(secret, body, header)
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("configured", &self.is_configured())
            .finish()
    }
}

/// Compute the header value the platform would send for `body`.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature header value against `body`.
///
/// Returns `false` on an empty secret or any mismatch.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        return false;
    }

    let expected = sign_payload(secret, body);
    let valid = constant_time_compare(&expected, signature);

    if !valid {
        warn!(
            expected_length = expected.len(),
            actual_length = signature.len(),
            has_prefix = signature.starts_with(SIGNATURE_PREFIX),
            "signature_mismatch"
        );
    }

    valid
}

/// Constant-time string comparison to prevent timing attacks.
///
/// Only the length is allowed to short-circuit; it is not secret.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
