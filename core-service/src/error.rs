use core_auth::AuthError;
use core_sync::SyncError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] core_sync::SchedulerError),
}

impl CoreError {
    /// Whether the front-end should ask the user to bind the account again.
    pub fn requires_rebind(&self) -> bool {
        match self {
            CoreError::Auth(e) => e.requires_rebind(),
            CoreError::Sync(e) => e.requires_rebind(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
