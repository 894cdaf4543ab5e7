//! # Wipe Flow
//!
//! Removes everything one account contributed for a media kind: its cached
//! snapshot and its trackers in the reverse index.
//!
//! Untracking is best-effort. Each media id is retried a bounded number of
//! times; trackers already removed are not restored when a later id keeps
//! failing, and the failures are reported instead.

use crate::error::{Result, SyncError};
use bridge_traits::{ExternalAccountId, MediaId, MediaKind};
use core_library::{LocalAccountId, MediaCache, ReverseIndexStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WipeReport {
    pub kind: MediaKind,
    /// Media ids the account was untracked from
    pub untracked: usize,
    /// Media ids that still failed after every retry
    pub failed: Vec<MediaId>,
}

impl WipeReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

pub struct WipeFlow {
    index: Arc<dyn ReverseIndexStore>,
    cache: MediaCache,
    retry: RetryPolicy,
}

impl WipeFlow {
    pub fn new(index: Arc<dyn ReverseIndexStore>, cache: MediaCache, retry: RetryPolicy) -> Self {
        Self {
            index,
            cache,
            retry,
        }
    }

    /// Wipe one account's lists of `kind`.
    ///
    /// # Errors
    ///
    /// [`SyncError::NothingToWipe`] when the account tracked nothing of this
    /// kind. The snapshot key is deleted in that case too.
    #[instrument(skip(self), fields(local_id = %local_id, external_id = %external_id, kind = %kind))]
    pub async fn wipe_account_lists(
        &self,
        local_id: &LocalAccountId,
        external_id: ExternalAccountId,
        kind: MediaKind,
    ) -> Result<WipeReport> {
        let tracked = self
            .index
            .list_tracked_media(kind, external_id)
            .await
            .map_err(SyncError::from_store)?;

        self.cache
            .delete_snapshot(external_id, kind)
            .await
            .map_err(SyncError::from_store)?;

        if tracked.is_empty() {
            return Err(SyncError::NothingToWipe);
        }

        let mut report = WipeReport {
            kind,
            untracked: 0,
            failed: Vec::new(),
        };

        for media_id in tracked {
            if self.untrack_with_retry(kind, media_id, local_id).await {
                report.untracked += 1;
            } else {
                report.failed.push(media_id);
            }
        }

        if report.is_complete() {
            info!(untracked = report.untracked, "Account lists wiped");
        } else {
            warn!(
                untracked = report.untracked,
                failed = report.failed.len(),
                "Account lists partially wiped"
            );
        }
        Ok(report)
    }

    async fn untrack_with_retry(&self, kind: MediaKind, media_id: MediaId, local_id: &LocalAccountId) -> bool {
        let attempts = self.retry.attempts.max(1);
        for attempt in 1..=attempts {
            match self.index.untrack(kind, media_id, local_id).await {
                Ok(_) => return true,
                Err(e) if attempt < attempts => {
                    warn!(media_id, attempt, error = %e, "Untrack failed, retrying");
                    tokio::time::sleep(self.retry.backoff * attempt).await;
                }
                Err(e) => {
                    warn!(media_id, attempt, error = %e, "Untrack failed, giving up");
                }
            }
        }
        false
    }
}
