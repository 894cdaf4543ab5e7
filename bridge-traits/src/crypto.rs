//! Sealed-box abstraction for credential material.
//!
//! The core never implements a cipher itself. Hosts inject a [`SealedBox`]
//! (a local AEAD key, an RSA keypair, a remote KMS) and the credential vault
//! only ever stores what `seal` returns.

use crate::error::Result;
use async_trait::async_trait;

/// Authenticated encryption of small secrets.
///
/// `open` must fail (rather than return garbage) when the ciphertext was
/// produced under different key material or has been tampered with.
#[async_trait]
pub trait SealedBox: Send + Sync {
    /// Encrypt `plaintext`, returning an opaque blob safe to persist.
    async fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt a blob previously returned by [`SealedBox::seal`].
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Crypto`](crate::error::BridgeError::Crypto) when
    /// the key is missing, rotated, or the blob is corrupt.
    async fn open(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}
