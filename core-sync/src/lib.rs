//! # Sync Module
//!
//! Pulls users' media lists from the external service into the reverse index
//! and the cache, and keeps every bound account fresh on a schedule.
//!
//! ## Components
//!
//! - **List Synchronizer** (`synchronizer`): one account, one media kind
//! - **Wipe Flow** (`wipe`): removes an account's trackers and snapshot
//! - **Fleet Synchronizer** (`fleet`): every bound account, every kind
//! - **Scheduler** (`scheduler`): periodic, non-overlapping fleet passes
//! - **Rate Limiter** (`rate_limiter`): cooldowns for on-demand commands

pub mod error;
pub mod fleet;
pub mod rate_limiter;
pub mod scheduler;
pub mod synchronizer;
pub mod wipe;

pub use error::{Result, SyncError};
pub use fleet::{FleetFailure, FleetJob, FleetReport, FleetRunId, FleetSynchronizer};
pub use rate_limiter::RateLimiter;
pub use scheduler::{
    SchedulerActor, SchedulerConfig, SchedulerError, SchedulerHandle, SchedulerState,
    SchedulerStatus, TickOutcome, WorkerMessage, WorkerSignal,
};
pub use synchronizer::{ListSynchronizer, SyncOutcome, SyncReport, SynchronizerDeps};
pub use wipe::{RetryPolicy, WipeFlow, WipeReport};
