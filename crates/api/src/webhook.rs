// SPDX-License-Identifier: MIT

//! Webhook ingress authentication (spec.md #6): the body is authenticated by
//! an HMAC-SHA256 signature compared in constant time, the same way the
//! teacher reaches for a purpose-built crate (`sha2`, used there for runbook
//! content hashing) rather than hand-rolling the digest or the compare.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("signature is not valid hex: {0}")]
    MalformedSignature(#[from] hex::FromHexError),

    #[error("hmac key of invalid length")]
    InvalidKeyLength,

    #[error("signature does not match the computed digest")]
    SignatureMismatch,
}

/// Verify `body` against a hex-encoded HMAC-SHA256 `signature`, using
/// `secret` as the HMAC key. Comparison is constant-time regardless of where
/// the mismatch occurs, so response timing cannot leak the valid prefix.
pub fn verify(secret: &[u8], body: &[u8], signature: &str) -> Result<(), WebhookError> {
    let expected_bytes = hex::decode(signature)?;

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| WebhookError::InvalidKeyLength)?;
    mac.update(body);
    let computed = mac.finalize().into_bytes();

    if computed.ct_eq(&expected_bytes).unwrap_u8() == 1 {
        Ok(())
    } else {
        Err(WebhookError::SignatureMismatch)
    }
}

/// Compute a hex-encoded HMAC-SHA256 signature, used by tests and by any
/// trusted caller that needs to sign a request the same way a webhook
/// producer would.
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| WebhookError::InvalidKeyLength)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_correctly_signed_body_verifies() {
        let secret = b"top-secret";
        let body = br#"{"pr": 42}"#;
        let signature = sign(secret, body).unwrap();
        assert!(verify(secret, body, &signature).is_ok());
    }

    #[test]
    fn a_tampered_body_fails_verification() {
        let secret = b"top-secret";
        let signature = sign(secret, br#"{"pr": 42}"#).unwrap();
        let err = verify(secret, br#"{"pr": 43}"#, &signature).unwrap_err();
        assert!(matches!(err, WebhookError::SignatureMismatch));
    }

    #[test]
    fn a_malformed_signature_is_rejected() {
        let err = verify(b"secret", b"body", "not-hex").unwrap_err();
        assert!(matches!(err, WebhookError::MalformedSignature(_)));
    }
}
