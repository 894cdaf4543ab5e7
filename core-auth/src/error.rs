use core_library::LibraryError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// No binding exists for the local account.
    #[error("Account {local_id} is not bound")]
    NotBound { local_id: String },

    /// The external service rejected the token; the account must re-bind.
    #[error("Invalid token: {0}")]
    AuthInvalid(String),

    /// Stored credential could not be opened (rotated or missing key material).
    #[error("Failed to decrypt stored credential: {0}")]
    DecryptionFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    /// Transport or upstream failure talking to the external service.
    #[error("Provider request failed: {0}")]
    Provider(String),

    #[error("Operation timed out: {operation} after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Storage error: {0}")]
    Storage(#[from] LibraryError),
}

impl AuthError {
    /// Whether the caller should ask the user to bind again.
    pub fn requires_rebind(&self) -> bool {
        matches!(
            self,
            AuthError::NotBound { .. } | AuthError::AuthInvalid(_) | AuthError::DecryptionFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
