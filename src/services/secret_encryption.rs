//! Secret-at-rest encryption for service auth material (`AuthType`'s
//! `token_value`/`secret` fields), using AES-256-GCM with a unique nonce per
//! secret.
//!
//! The master key comes from `MARCHPROXY_SECRET_ENCRYPTION_KEY`
//! (base64-encoded 32 bytes), wired through [`crate::config::SecretsConfig`].

use base64::Engine;
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::errors::{MarchProxyError, Result};

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

struct SingleNonce {
    nonce: Option<[u8; NONCE_SIZE]>,
}

impl SingleNonce {
    fn new(nonce_bytes: [u8; NONCE_SIZE]) -> Self {
        Self { nonce: Some(nonce_bytes) }
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.nonce.take().map(Nonce::assume_unique_for_key).ok_or(ring::error::Unspecified)
    }
}

/// Encrypts and decrypts service auth secrets with a single master key.
#[derive(Clone)]
pub struct SecretEncryption {
    key_bytes: Arc<[u8; 32]>,
    rng: Arc<SystemRandom>,
}

impl SecretEncryption {
    /// Decodes a base64 32-byte master key.
    pub fn new(master_key_base64: &str) -> Result<Self> {
        let key_bytes = base64::engine::general_purpose::STANDARD.decode(master_key_base64).map_err(|e| {
            MarchProxyError::config(format!("invalid base64 in MARCHPROXY_SECRET_ENCRYPTION_KEY: {e}"))
        })?;

        if key_bytes.len() != 32 {
            return Err(MarchProxyError::config(format!(
                "MARCHPROXY_SECRET_ENCRYPTION_KEY must be 32 bytes, got {}",
                key_bytes.len()
            )));
        }

        let mut key_array = [0u8; 32];
        key_array.copy_from_slice(&key_bytes);

        Ok(Self { key_bytes: Arc::new(key_array), rng: Arc::new(SystemRandom::new()) })
    }

    /// A deterministic key for development when no encryption key is
    /// configured. Never used once a store already holds secrets from a real
    /// key, since [`crate::config::AppConfig::validate`] refuses to start
    /// against a non-empty store without `MARCHPROXY_SECRET_ENCRYPTION_KEY`.
    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self::new(&base64::engine::general_purpose::STANDARD.encode([0x42u8; 32])).unwrap()
    }

    /// A freshly generated random key, for startup against a store that
    /// [`crate::startup::handle_first_time_startup`] has just confirmed holds
    /// no services yet. Never persisted -- restarting without a fixed
    /// `MARCHPROXY_SECRET_ENCRYPTION_KEY` generates a new key every time, so
    /// this is only safe while nothing has been encrypted under the last one.
    pub fn ephemeral() -> Result<Self> {
        let rng = SystemRandom::new();
        let mut key_bytes = [0u8; 32];
        rng.fill(&mut key_bytes)
            .map_err(|_| MarchProxyError::internal("failed to generate random secret encryption key"))?;
        Ok(Self { key_bytes: Arc::new(key_bytes), rng: Arc::new(rng) })
    }

    /// Encrypts plaintext, returning `(ciphertext_with_tag, nonce)`.
    #[instrument(skip(self, plaintext), fields(plaintext_len = plaintext.len()))]
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.rng.fill(&mut nonce_bytes).map_err(|_| {
            error!("failed to generate random nonce");
            MarchProxyError::internal("failed to generate random nonce for encryption")
        })?;

        let unbound_key = UnboundKey::new(&AES_256_GCM, &*self.key_bytes)
            .map_err(|_| MarchProxyError::internal("failed to create encryption key"))?;
        let mut sealing_key = aead::SealingKey::new(unbound_key, SingleNonce::new(nonce_bytes));

        let mut ciphertext = plaintext.to_vec();
        ciphertext.reserve(TAG_SIZE);
        sealing_key
            .seal_in_place_append_tag(Aad::empty(), &mut ciphertext)
            .map_err(|_| MarchProxyError::internal("failed to encrypt secret data"))?;

        debug!(ciphertext_len = ciphertext.len(), "encrypted secret");
        Ok((ciphertext, nonce_bytes.to_vec()))
    }

    /// Decrypts ciphertext produced by [`Self::encrypt`].
    #[instrument(skip(self, ciphertext, nonce), fields(ciphertext_len = ciphertext.len()))]
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>> {
        if nonce.len() != NONCE_SIZE {
            return Err(MarchProxyError::internal(format!(
                "invalid nonce length: expected {NONCE_SIZE} bytes, got {}",
                nonce.len()
            )));
        }
        if ciphertext.len() < TAG_SIZE {
            return Err(MarchProxyError::internal("ciphertext too short (missing authentication tag)"));
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(nonce);

        let unbound_key = UnboundKey::new(&AES_256_GCM, &*self.key_bytes)
            .map_err(|_| MarchProxyError::internal("failed to create decryption key"))?;
        let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce::new(nonce_bytes));

        let mut plaintext = ciphertext.to_vec();
        let decrypted = opening_key
            .open_in_place(Aad::empty(), &mut plaintext)
            .map_err(|_| MarchProxyError::internal("failed to decrypt secret data - authentication failed"))?;

        Ok(decrypted.to_vec())
    }

    /// Convenience wrapper: encrypts a UTF-8 secret and base64-encodes both
    /// parts so they fit in a single JSON field alongside `auth_type_json`.
    pub fn encrypt_to_string(&self, plaintext: &str) -> Result<String> {
        let (ciphertext, nonce) = self.encrypt(plaintext.as_bytes())?;
        Ok(format!(
            "{}.{}",
            base64::engine::general_purpose::STANDARD.encode(nonce),
            base64::engine::general_purpose::STANDARD.encode(ciphertext),
        ))
    }

    /// Inverse of [`Self::encrypt_to_string`].
    pub fn decrypt_from_string(&self, encoded: &str) -> Result<String> {
        let (nonce_b64, ciphertext_b64) = encoded
            .split_once('.')
            .ok_or_else(|| MarchProxyError::internal("malformed encrypted secret: missing separator"))?;
        let nonce = base64::engine::general_purpose::STANDARD
            .decode(nonce_b64)
            .map_err(|_| MarchProxyError::internal("malformed encrypted secret: bad nonce encoding"))?;
        let ciphertext = base64::engine::general_purpose::STANDARD
            .decode(ciphertext_b64)
            .map_err(|_| MarchProxyError::internal("malformed encrypted secret: bad ciphertext encoding"))?;
        let plaintext = self.decrypt(&ciphertext, &nonce)?;
        String::from_utf8(plaintext).map_err(|_| MarchProxyError::internal("decrypted secret was not valid UTF-8"))
    }
}

impl std::fmt::Debug for SecretEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretEncryption").field("key_bytes", &"[REDACTED]").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let encryption = SecretEncryption::for_testing();
        let plaintext = b"my-secret-token";

        let (ciphertext, nonce) = encryption.encrypt(plaintext).unwrap();
        assert!(ciphertext.len() > plaintext.len());
        assert_eq!(nonce.len(), NONCE_SIZE);

        let decrypted = encryption.decrypt(&ciphertext, &nonce).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn different_nonces_produce_different_ciphertext() {
        let encryption = SecretEncryption::for_testing();
        let plaintext = b"same-plaintext";

        let (ciphertext1, nonce1) = encryption.encrypt(plaintext).unwrap();
        let (ciphertext2, nonce2) = encryption.encrypt(plaintext).unwrap();

        assert_ne!(nonce1, nonce2);
        assert_ne!(ciphertext1, ciphertext2);
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let encryption = SecretEncryption::for_testing();
        let (mut ciphertext, nonce) = encryption.encrypt(b"sensitive").unwrap();
        ciphertext[0] ^= 0xFF;
        assert!(encryption.decrypt(&ciphertext, &nonce).is_err());
    }

    #[test]
    fn string_roundtrip() {
        let encryption = SecretEncryption::for_testing();
        let encoded = encryption.encrypt_to_string("shared-secret-value").unwrap();
        assert!(encoded.contains('.'));
        assert_eq!(encryption.decrypt_from_string(&encoded).unwrap(), "shared-secret-value");
    }

    #[test]
    fn invalid_key_length_is_rejected() {
        let bad_key = base64::engine::general_purpose::STANDARD.encode(vec![0u8; 16]);
        assert!(SecretEncryption::new(&bad_key).is_err());
    }
}
