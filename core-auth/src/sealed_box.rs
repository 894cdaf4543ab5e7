//! AES-256-GCM sealed box for hosts without their own key service.
//!
//! Blob layout: 12-byte random nonce followed by ciphertext and tag.

use crate::error::{AuthError, Result};
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::SealedBox;
use sha2::{Digest, Sha256};
use std::fmt;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// 256-bit key for [`AesGcmSealedBox`].
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    key_bytes: [u8; 32],
}

impl EncryptionKey {
    /// Random key from the OS generator.
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&key);
        Self { key_bytes }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key_bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            AuthError::InvalidKey(format!(
                "expected 32 bytes for AES-256, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { key_bytes })
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| AuthError::InvalidKey(format!("invalid hex key: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// SHA-256 of a configured secret string.
    ///
    /// Only suitable for high-entropy secrets (a deployment key from the
    /// environment); this is not a password KDF.
    pub fn derive_from_secret(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(AuthError::InvalidKey("secret must not be empty".to_string()));
        }
        let digest = Sha256::digest(secret.as_bytes());
        Self::from_bytes(&digest)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.key_bytes)
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("key_bytes", &"[REDACTED]")
            .finish()
    }
}

/// [`SealedBox`] backed by AES-256-GCM with a local key.
pub struct AesGcmSealedBox {
    cipher: Aes256Gcm,
}

impl AesGcmSealedBox {
    pub fn new(key: &EncryptionKey) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(&key.key_bytes);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }
}

impl fmt::Debug for AesGcmSealedBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmSealedBox").finish_non_exhaustive()
    }
}

#[async_trait]
impl SealedBox for AesGcmSealedBox {
    async fn seal(&self, plaintext: &[u8]) -> BridgeResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| BridgeError::Crypto(format!("Encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    async fn open(&self, sealed: &[u8]) -> BridgeResult<Vec<u8>> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(BridgeError::Crypto("Invalid ciphertext: too short".to_string()));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| BridgeError::Crypto(format!("Decryption failed: {}", e)))
    }
}
