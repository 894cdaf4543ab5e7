use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// The upstream service rejected the presented credential.
    #[error("Credential rejected: {0}")]
    Unauthorized(String),

    #[error("Bridge operation timed out: {0}")]
    Timeout(String),

    #[error("Sealed box error: {0}")]
    Crypto(String),
}

impl BridgeError {
    /// Whether the failure means the credential itself is no longer usable.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, BridgeError::Unauthorized(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
