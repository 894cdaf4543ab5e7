use core_auth::AuthError;
use crate::scheduler::SchedulerError;
use core_library::LibraryError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The local account has no binding.
    #[error("Account {0} is not bound")]
    NotBound(String),

    /// The external service rejected the stored token; re-binding is required.
    #[error("Credential rejected: {0}")]
    AuthInvalid(String),

    /// Transport, upstream or storage failure during a sync pass.
    #[error("Sync failed: {0}")]
    SyncFailed(String),

    #[error("Stored credential could not be decrypted: {0}")]
    DecryptionFailed(String),

    #[error("{command} is on cooldown for another {remaining:?}")]
    OnCooldown { command: String, remaining: Duration },

    /// The account had nothing tracked for the kind.
    #[error("Nothing to wipe")]
    NothingToWipe,

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl SyncError {
    /// Whether the user has to bind the account again before retrying.
    pub fn requires_rebind(&self) -> bool {
        matches!(
            self,
            SyncError::NotBound(_) | SyncError::AuthInvalid(_) | SyncError::DecryptionFailed(_)
        )
    }

    /// Storage failures inside a sync pass are reported as `SyncFailed`.
    pub(crate) fn from_store(err: LibraryError) -> Self {
        SyncError::SyncFailed(format!("store failure: {}", err))
    }
}

impl From<AuthError> for SyncError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NotBound { local_id } => SyncError::NotBound(local_id),
            AuthError::AuthInvalid(reason) => SyncError::AuthInvalid(reason),
            AuthError::DecryptionFailed(reason) => SyncError::DecryptionFailed(reason),
            AuthError::Storage(e) => SyncError::from_store(e),
            other => SyncError::SyncFailed(other.to_string()),
        }
    }
}

impl From<LibraryError> for SyncError {
    fn from(err: LibraryError) -> Self {
        SyncError::Database(err.to_string())
    }
}

impl From<SchedulerError> for SyncError {
    fn from(err: SchedulerError) -> Self {
        SyncError::Scheduler(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_store_failure_is_a_sync_failure() {
        let err = SyncError::from(AuthError::Storage(LibraryError::CacheError("disk full".to_string())));
        assert!(matches!(err, SyncError::SyncFailed(ref msg) if msg.contains("disk full")));
        assert!(!err.requires_rebind());
    }

    #[test]
    fn test_rebind_errors_pass_through() {
        let err = SyncError::from(AuthError::NotBound {
            local_id: "u1".to_string(),
        });
        assert!(matches!(err, SyncError::NotBound(ref id) if id == "u1"));
        assert!(err.requires_rebind());
    }
}
