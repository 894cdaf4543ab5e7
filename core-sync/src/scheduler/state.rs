//! Scheduler lifecycle.
//!
//! ```text
//! Uninitialized ──initialize──> Scheduled ──begin_run──> Running
//!                                   ^                       │
//!                                   └──────finish_run───────┘
//! ```
//!
//! Owned by the scheduler actor and only advanced from its message loop.

use super::messages::{SchedulerError, TickOutcome};
use crate::fleet::FleetRunId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Uninitialized,
    Scheduled,
    Running(FleetRunId),
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Uninitialized => "uninitialized",
            SchedulerState::Scheduled => "scheduled",
            SchedulerState::Running(_) => "running",
        }
    }

    pub fn running_run(&self) -> Option<FleetRunId> {
        match self {
            SchedulerState::Running(run_id) => Some(*run_id),
            _ => None,
        }
    }

    pub fn initialize(&mut self) -> Result<(), SchedulerError> {
        self.transition(SchedulerState::Scheduled, matches!(self, SchedulerState::Uninitialized))
    }

    pub fn begin_run(&mut self, run_id: FleetRunId) -> Result<(), SchedulerError> {
        self.transition(SchedulerState::Running(run_id), matches!(self, SchedulerState::Scheduled))
    }

    /// Claim the scheduler for a new pass.
    ///
    /// Reports the pass already in flight instead of starting another, and
    /// [`TickOutcome::Skipped`] when the scheduler is not initialized.
    pub fn start_pass(&mut self) -> TickOutcome {
        if let Some(running) = self.running_run() {
            return TickOutcome::Suppressed { running };
        }
        let run_id = FleetRunId::new();
        match self.begin_run(run_id) {
            Ok(()) => TickOutcome::Started(run_id),
            Err(_) => TickOutcome::Skipped,
        }
    }

    /// Finish the pass `run_id`. A stale id is rejected.
    pub fn finish_run(&mut self, run_id: FleetRunId) -> Result<(), SchedulerError> {
        self.transition(SchedulerState::Scheduled, *self == SchedulerState::Running(run_id))
    }

    fn transition(&mut self, to: SchedulerState, allowed: bool) -> Result<(), SchedulerError> {
        if !allowed {
            return Err(SchedulerError::InvalidTransition {
                from: self.as_str(),
                to: to.as_str(),
            });
        }
        *self = to;
        Ok(())
    }
}
