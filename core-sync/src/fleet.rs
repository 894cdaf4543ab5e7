//! Fleet-wide synchronization pass.

use crate::error::Result;
use crate::synchronizer::{ListSynchronizer, SyncOutcome};
use async_trait::async_trait;
use bridge_traits::MediaKind;
use core_library::{AccountRepository, LocalAccountId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Identifier of one scheduled pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FleetRunId(Uuid);

impl FleetRunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FleetRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FleetRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetFailure {
    pub local_id: LocalAccountId,
    pub kind: MediaKind,
    pub message: String,
    pub requires_rebind: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetReport {
    pub run_id: FleetRunId,
    pub accounts: usize,
    /// Accounts whose every kind synced (or had no lists)
    pub succeeded: usize,
    /// Accounts with at least one failed kind
    pub failed: usize,
    pub failures: Vec<FleetFailure>,
    pub duration: Duration,
}

impl FleetReport {
    pub fn empty(run_id: FleetRunId) -> Self {
        Self {
            run_id,
            accounts: 0,
            succeeded: 0,
            failed: 0,
            failures: Vec::new(),
            duration: Duration::ZERO,
        }
    }
}

/// Work executed on every scheduler tick.
#[async_trait]
pub trait FleetJob: Send + Sync {
    /// Run one pass. Per-account failures belong in the report; an `Err`
    /// means the pass could not run at all (e.g. accounts unreadable).
    async fn run_pass(&self, run_id: FleetRunId) -> Result<FleetReport>;
}

/// Syncs every bound account for every media kind.
pub struct FleetSynchronizer {
    accounts: Arc<dyn AccountRepository>,
    synchronizer: Arc<ListSynchronizer>,
}

impl FleetSynchronizer {
    pub fn new(accounts: Arc<dyn AccountRepository>, synchronizer: Arc<ListSynchronizer>) -> Self {
        Self {
            accounts,
            synchronizer,
        }
    }
}

#[async_trait]
impl FleetJob for FleetSynchronizer {
    #[instrument(skip(self), fields(run_id = %run_id))]
    async fn run_pass(&self, run_id: FleetRunId) -> Result<FleetReport> {
        let started = Instant::now();
        let accounts = self.accounts.list_bound().await?;
        info!(accounts = accounts.len(), "Fleet sync started");

        let mut report = FleetReport::empty(run_id);
        report.accounts = accounts.len();

        for account in &accounts {
            let mut account_failed = false;

            for kind in MediaKind::ALL {
                match self.synchronizer.sync_account(&account.local_id, kind).await {
                    Ok(SyncOutcome::Synced(_)) | Ok(SyncOutcome::NoLists) => {}
                    Err(e) => {
                        warn!(
                            local_id = %account.local_id,
                            kind = %kind,
                            error = %e,
                            "Account sync failed during fleet pass"
                        );
                        account_failed = true;
                        report.failures.push(FleetFailure {
                            local_id: account.local_id.clone(),
                            kind,
                            message: e.to_string(),
                            requires_rebind: e.requires_rebind(),
                        });
                    }
                }
            }

            if account_failed {
                report.failed += 1;
            } else {
                report.succeeded += 1;
            }
        }

        report.duration = started.elapsed();
        info!(
            accounts = report.accounts,
            succeeded = report.succeeded,
            failed = report.failed,
            duration_ms = report.duration.as_millis() as u64,
            "Fleet sync completed"
        );
        Ok(report)
    }
}
