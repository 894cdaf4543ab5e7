use crate::fleet::{FleetReport, FleetRunId};
use crate::scheduler::state::SchedulerState;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::oneshot;

/// Scheduler errors
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Scheduler is not running")]
    ServiceUnavailable,

    #[error("Invalid scheduler transition from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("Invalid schedule period: {0:?}")]
    InvalidPeriod(Duration),

    #[error("Schedule storage error: {0}")]
    Storage(String),
}

/// Parent to worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerSignal {
    /// Arm the timer.
    Start,
    Shutdown,
}

/// Worker to parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    /// The period elapsed; run the fleet sync.
    #[serde(rename = "SYNC")]
    Sync,
}

/// Answer to a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Started(FleetRunId),
    /// A pass was already running; nothing new was started.
    Suppressed { running: FleetRunId },
    /// The scheduler is not in a state that can start a pass.
    Skipped,
}

/// Snapshot of the scheduler for operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub job_type: String,
    pub period: Duration,
    /// Unix millis at which the last pass finished
    pub last_run_at: Option<i64>,
    pub passes_completed: u64,
    pub ticks_suppressed: u64,
    pub last_report: Option<FleetReport>,
}

/// Scheduler actor messages
pub enum SchedulerMessage {
    /// From the timer worker (or a host-driven timer).
    Worker(WorkerMessage),

    /// Manual trigger
    TriggerNow {
        reply: oneshot::Sender<TickOutcome>,
    },

    Status {
        reply: oneshot::Sender<SchedulerStatus>,
    },

    /// Internal: a spawned pass finished
    PassFinished {
        run_id: FleetRunId,
        result: Result<FleetReport, String>,
    },
}
