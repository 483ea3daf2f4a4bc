//! Keyed identifier hashing for deletion tombstones.

use hmac::{Hmac, Mac};
use lodge_application::IdentityHasher;
use lodge_core::{AppError, AppResult};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 over normalised identifiers, keyed by `SERVER_SECRET`.
///
/// Tombstones store only this digest, so the table never retains the
/// deleted email or username in the clear.
#[derive(Clone)]
pub struct HmacIdentityHasher {
    key: Vec<u8>,
}

impl HmacIdentityHasher {
    /// Creates a hasher from a hex-encoded 32-byte secret.
    pub fn from_hex(hex_key: &str) -> AppResult<Self> {
        let key = hex::decode(hex_key)
            .map_err(|error| AppError::Validation(format!("invalid SERVER_SECRET hex: {error}")))?;
        if key.len() != 32 {
            return Err(AppError::Validation(
                "SERVER_SECRET must be exactly 32 bytes (64 hex chars)".to_owned(),
            ));
        }
        Ok(Self { key })
    }
}

impl IdentityHasher for HmacIdentityHasher {
    fn hash_identifier(&self, identifier: &str) -> String {
        // Key length was validated at construction; Hmac::new_from_slice
        // accepts any length for SHA-256 anyway.
        let mut mac = match HmacSha256::new_from_slice(&self.key) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(identifier.trim().to_lowercase().as_bytes());
        let digest = mac.finalize().into_bytes();
        hex::encode(digest)
    }
}

#[cfg(test)]
mod tests {
    use lodge_application::IdentityHasher as _;

    use super::*;

    fn hasher() -> HmacIdentityHasher {
        match HmacIdentityHasher::from_hex(&"ab".repeat(32)) {
            Ok(hasher) => hasher,
            Err(error) => panic!("hasher construction failed: {error}"),
        }
    }

    #[test]
    fn digest_is_stable_and_normalised() {
        let hasher = hasher();
        let lower = hasher.hash_identifier("alice@example.com");
        let upper = hasher.hash_identifier("  ALICE@EXAMPLE.COM ");
        assert_eq!(lower, upper);
        assert_eq!(lower.len(), 64);
    }

    #[test]
    fn different_keys_give_different_digests() -> AppResult<()> {
        let first = hasher();
        let second = HmacIdentityHasher::from_hex(&"cd".repeat(32))?;
        assert_ne!(
            first.hash_identifier("alice@example.com"),
            second.hash_identifier("alice@example.com")
        );
        Ok(())
    }

    #[test]
    fn key_length_is_enforced() {
        assert!(HmacIdentityHasher::from_hex("abcd").is_err());
    }
}
