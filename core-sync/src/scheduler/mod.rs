//! # Fleet Scheduler
//!
//! Runs [`FleetJob`](crate::fleet::FleetJob) passes on a persisted period.
//!
//! Two tasks cooperate:
//!
//! - [`ScheduleWorker`] owns the timer and posts `{"type":"SYNC"}` messages
//! - [`SchedulerActor`] owns the lifecycle state and decides whether a tick
//!   starts a pass; ticks arriving while a pass runs are suppressed, so
//!   passes never overlap
//!
//! The schedule record (`job_type`, period, creation and last-run times) is
//! stored through [`ScheduleRepository`](core_library::ScheduleRepository)
//! so a restart resumes the cadence instead of resetting it.

mod handle;
mod messages;
mod runner;
mod state;
mod worker;

pub use handle::SchedulerHandle;
pub use messages::{SchedulerError, SchedulerStatus, TickOutcome, WorkerMessage, WorkerSignal};
pub use runner::{SchedulerActor, SchedulerConfig};
pub use state::SchedulerState;
pub use worker::ScheduleWorker;
