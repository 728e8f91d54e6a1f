//! Secret sealing for the vault
//!
//! AES-256-GCM under an Argon2id-derived key. Stored blobs are laid out
//! as `nonce(12) || tag(16) || ciphertext` with a fresh random nonce per
//! seal. A tag mismatch always means the master secret no longer matches
//! the key that sealed the data.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use rand::RngCore;
use s3browser_common::{Error, Result};

/// Salt length the KDF expects, in bytes.
pub const SALT_LEN: usize = 16;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Derived key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Canary sealed at first initialization; decrypting it proves the
/// current key matches the key that sealed the stored secrets.
pub const KEY_CHECK_CANARY: &[u8] = b"s3browser-key-check-v1";

/// Seals and opens vault secrets with a key derived once at startup.
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

impl SecretCipher {
    /// Derive the data key from the master secret and per-database salt.
    pub fn derive(master_secret: &str, salt: &[u8]) -> Result<Self> {
        if salt.len() != SALT_LEN {
            return Err(Error::configuration(format!(
                "malformed encryption salt: expected {SALT_LEN} bytes, got {}",
                salt.len()
            )));
        }
        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(master_secret.as_bytes(), salt, &mut key)
            .map_err(|e| Error::configuration(format!("key derivation failed: {e}")))?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| Error::configuration(format!("cipher init failed: {e}")))?;
        Ok(Self { cipher })
    }

    /// Generate a fresh random salt for a new database.
    #[must_use]
    pub fn generate_salt() -> [u8; SALT_LEN] {
        let mut salt = [0u8; SALT_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        salt
    }

    /// Seal a plaintext secret into `nonce || tag || ciphertext`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let sealed = self
            .cipher
            .encrypt(nonce, Payload::from(plaintext))
            .map_err(|_| Error::internal("encryption failed"))?;
        // RustCrypto appends the tag; reorder into nonce || tag || ct.
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        let mut blob = Vec::with_capacity(NONCE_LEN + TAG_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(tag);
        blob.extend_from_slice(ciphertext);
        Ok(blob)
    }

    /// Open a sealed blob. A tag mismatch is reported as a key mismatch.
    pub fn open(&self, blob: &[u8]) -> Result<Vec<u8>> {
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::configuration(
                "stored ciphertext is truncated".to_string(),
            ));
        }
        let (nonce_bytes, rest) = blob.split_at(NONCE_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);
        let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LEN);
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, Payload::from(sealed.as_slice()))
            .map_err(|_| Error::configuration("encryption key mismatch"))
    }
}
