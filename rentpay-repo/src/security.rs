//! Security utilities for API key hashing and gateway webhook signatures.

use hmac::{Hmac, Mac};
use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Hashes an API key using SHA-256.
pub fn hash_api_key(key: &str) -> String {
    let hash = Sha256::digest(key.as_bytes());
    hex::encode(hash)
}

/// Verifies an API key against a stored hash using constant-time comparison.
pub fn verify_api_key(input: &str, stored_hash: &str) -> bool {
    let input_hash = hash_api_key(input);
    input_hash.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

/// Generates a new admin key. Returns `(raw_key, hash)`; only the hash is stored.
pub fn generate_api_key() -> (String, String) {
    let raw: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    let key = format!("sk_{}", raw);
    let hash = hash_api_key(&key);
    (key, hash)
}

/// Signs a webhook body using HMAC-SHA256 (hex encoded).
pub fn sign_webhook(payload: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a gateway webhook signature using constant-time comparison.
///
/// Accepts the bare hex digest or a `sha256=` prefixed one.
pub fn verify_webhook_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    let signature = signature.trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let expected = sign_webhook(payload, secret);
    expected
        .as_bytes()
        .ct_eq(signature.to_ascii_lowercase().as_bytes())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_hashing() {
        let key = "sk_test_abc123";
        let hash = hash_api_key(key);

        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_api_key(key));
    }

    #[test]
    fn test_api_key_verification() {
        let key = "sk_test_abc123";
        let hash = hash_api_key(key);

        assert!(verify_api_key(key, &hash));
        assert!(!verify_api_key("wrong_key", &hash));
    }

    #[test]
    fn test_generated_key_matches_hash() {
        let (key, hash) = generate_api_key();
        assert!(key.starts_with("sk_"));
        assert_eq!(key.len(), 35);
        assert!(verify_api_key(&key, &hash));
    }

    #[test]
    fn test_webhook_signature() {
        let payload = br#"{"entityId":"sess_1","state":"COMPLETED"}"#;
        let secret = "gateway_secret_123";

        let signature = sign_webhook(payload, secret);
        assert!(verify_webhook_signature(payload, &signature, secret));
        assert!(verify_webhook_signature(
            payload,
            &format!("sha256={}", signature.to_uppercase()),
            secret
        ));
        assert!(!verify_webhook_signature(
            payload,
            &signature,
            "wrong_secret"
        ));
        assert!(!verify_webhook_signature(b"tampered", &signature, secret));
    }
}
