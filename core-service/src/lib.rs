//! Core service facade and bootstrap.
//!
//! This crate wires the host-provided bridges carried by
//! [`CoreConfig`](core_runtime::CoreConfig) (list provider, sealed box,
//! clock) into the storage, auth and sync crates, starts the fleet
//! scheduler, and exposes the operations a front-end calls per user
//! interaction through [`ListSyncService`].

pub mod error;
pub mod service;

pub use error::{CoreError, Result};
pub use service::{
    Housekeeping, ListSyncService, ListsSyncReport, UnbindReport, SYNC_LISTS_COMMAND,
};

pub use core_auth::{AccessToken, AesGcmSealedBox, BindOutcome, EncryptionKey};
pub use core_library::{ListSnapshot, LocalAccountId, MediaDocument, Tracker};
pub use core_runtime::{CacheBackend, CoreConfig, CoreConfigBuilder, CoreEvent, SyncSettings};
pub use core_sync::{SchedulerStatus, SyncError, SyncOutcome, SyncReport, TickOutcome, WipeReport};
