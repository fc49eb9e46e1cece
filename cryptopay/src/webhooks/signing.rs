//! HMAC-SHA256 verification of inbound Crypto Pay webhooks.
//!
//! Crypto Pay signs each webhook request as follows:
//! - The key is `SHA-256(api_token)`
//! - The signature is computed over the raw request body
//! - The hex-encoded HMAC-SHA256 is sent in the `crypto-pay-api-signature` header

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex signature
pub const SIGNATURE_HEADER: &str = "crypto-pay-api-signature";

/// Signing key derived once from the app's API token.
#[derive(Clone)]
pub struct WebhookSecret {
    digest: [u8; 32],
}

impl std::fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WebhookSecret(..)")
    }
}

impl WebhookSecret {
    pub fn from_token(token: &str) -> Self {
        Self {
            digest: Sha256::digest(token.as_bytes()).into(),
        }
    }

    fn mac(&self) -> Option<HmacSha256> {
        HmacSha256::new_from_slice(&self.digest).ok()
    }

    /// Sign a raw body, returning the lowercase hex signature.
    pub fn sign(&self, body: &[u8]) -> Option<String> {
        let mut mac = self.mac()?;
        mac.update(body);
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    /// Verify a hex `signature` over `body`.
    ///
    /// Returns `false` for non-hex input. The digest comparison is constant-time.
    pub fn verify(&self, body: &[u8], signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };

        let Some(mut mac) = self.mac() else {
            return false;
        };
        mac.update(body);
        mac.verify_slice(&expected).is_ok()
    }
}
