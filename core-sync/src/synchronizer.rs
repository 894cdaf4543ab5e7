//! # List Synchronizer
//!
//! Pulls one account's lists of one media kind and writes them into the
//! reverse index and the cache.
//!
//! ## Pipeline
//!
//! ```text
//! vault.get_token ─> provider.fetch_media_collection (bounded by request_timeout)
//!   └─ for each resolvable entry (nulls and duplicate ids skipped)
//!        1. index.track(kind, media_id, tracker)
//!        2. snapshot[media_id] = entry
//!        3. cache.store_media(doc)        (TTL + alias keys)
//!   └─ [optional] untrack media that left the lists
//!   └─ cache.put_snapshot                 (single write, replaces the old one)
//!   └─ accounts.mark_synced
//! ```
//!
//! ## Consistency
//!
//! The pass is not a transaction across the two stores. A failure before the
//! snapshot write leaves the previous snapshot in place while index and media
//! writes already made persist; every step is idempotent, so the next sync
//! converges. Two syncs of the same account racing each other is tolerated:
//! the last snapshot write wins.

use crate::error::{Result, SyncError};
use bridge_traits::{
    BridgeError, Clock, ExternalAccountId, MediaId, MediaKind, MediaListCollection,
    MediaListProvider,
};
use core_auth::CredentialVault;
use core_library::{
    AccountRepository, ListSnapshot, LocalAccountId, MediaCache, MediaDocument,
    ReverseIndexStore, SnapshotEntry, SnapshotUser, TrackOutcome, Tracker, UntrackOutcome,
};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_runtime::SyncSettings;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// Counters for one completed sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub kind: MediaKind,
    pub external_id: ExternalAccountId,
    /// Entries written to the snapshot
    pub entries: usize,
    /// Null, id-less or duplicate entries
    pub skipped: usize,
    /// Trackers newly added to the reverse index
    pub trackers_added: usize,
    /// Trackers removed because their media left the lists
    pub trackers_pruned: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The account has no lists of this kind. Nothing was written.
    NoLists,
    Synced(SyncReport),
}

/// Collaborators of a [`ListSynchronizer`].
#[derive(Clone)]
pub struct SynchronizerDeps {
    pub vault: Arc<CredentialVault>,
    pub provider: Arc<dyn MediaListProvider>,
    pub index: Arc<dyn ReverseIndexStore>,
    pub cache: MediaCache,
    pub accounts: Arc<dyn AccountRepository>,
    pub clock: Arc<dyn Clock>,
    pub event_bus: EventBus,
}

pub struct ListSynchronizer {
    deps: SynchronizerDeps,
    settings: SyncSettings,
}

impl ListSynchronizer {
    pub fn new(deps: SynchronizerDeps, settings: SyncSettings) -> Self {
        Self { deps, settings }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Synchronize one account's lists of `kind`.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotBound`] / [`SyncError::DecryptionFailed`] when no
    ///   usable token is stored
    /// - [`SyncError::AuthInvalid`] when the service rejects the token
    /// - [`SyncError::SyncFailed`] on timeout, transport or store failure
    #[instrument(skip(self), fields(local_id = %local_id, kind = %kind))]
    pub async fn sync_account(&self, local_id: &LocalAccountId, kind: MediaKind) -> Result<SyncOutcome> {
        self.emit(SyncEvent::Started {
            local_id: local_id.to_string(),
            kind: kind.to_string(),
        });

        let result = self.run(local_id, kind).await;

        let event = match &result {
            Ok(SyncOutcome::Synced(report)) => SyncEvent::Completed {
                local_id: local_id.to_string(),
                kind: kind.to_string(),
                entries: report.entries as u64,
                skipped: report.skipped as u64,
            },
            Ok(SyncOutcome::NoLists) => SyncEvent::NoLists {
                local_id: local_id.to_string(),
                kind: kind.to_string(),
            },
            Err(e) => {
                warn!(error = %e, "List sync failed");
                SyncEvent::Failed {
                    local_id: local_id.to_string(),
                    kind: kind.to_string(),
                    message: e.to_string(),
                    requires_rebind: e.requires_rebind(),
                }
            }
        };
        self.emit(event);

        result
    }

    async fn run(&self, local_id: &LocalAccountId, kind: MediaKind) -> Result<SyncOutcome> {
        let credentials = self.deps.vault.get_token(local_id).await?;
        let external_id = credentials.external_id;

        let collection = match self
            .fetch_collection(external_id, kind, credentials.token.expose())
            .await?
        {
            Some(collection) if !collection.is_empty() => collection,
            _ => {
                info!("No lists to sync");
                return Ok(SyncOutcome::NoLists);
            }
        };

        let Some(owner) = collection.user.as_ref() else {
            return Ok(SyncOutcome::NoLists);
        };
        let user = SnapshotUser::from(owner);
        let tracker = Tracker::new(external_id, local_id.clone());

        let mut snapshot = ListSnapshot::new();
        let mut seen: HashSet<MediaId> = HashSet::new();
        let mut report = SyncReport {
            kind,
            external_id,
            entries: 0,
            skipped: 0,
            trackers_added: 0,
            trackers_pruned: 0,
        };

        for entry in collection.entries() {
            let Some(media_id) = entry.media_id() else {
                report.skipped += 1;
                continue;
            };
            if !seen.insert(media_id) {
                report.skipped += 1;
                continue;
            }

            let outcome = self
                .deps
                .index
                .track(kind, media_id, &tracker)
                .await
                .map_err(SyncError::from_store)?;
            if outcome == TrackOutcome::Added {
                report.trackers_added += 1;
            }

            snapshot.insert(media_id, SnapshotEntry::from_list_entry(user.clone(), entry));

            if let Some(document) = entry
                .media
                .as_ref()
                .and_then(|payload| MediaDocument::from_payload(kind, payload))
            {
                self.deps
                    .cache
                    .store_media(&document)
                    .await
                    .map_err(SyncError::from_store)?;
            }
        }

        if self.settings.reconcile_removed_entries {
            report.trackers_pruned = self.prune_removed(local_id, external_id, kind, &seen).await?;
        }

        self.deps
            .cache
            .put_snapshot(external_id, kind, &snapshot)
            .await
            .map_err(SyncError::from_store)?;
        report.entries = snapshot.len();

        self.deps
            .accounts
            .mark_synced(local_id, self.deps.clock.unix_timestamp_millis())
            .await
            .map_err(SyncError::from_store)?;

        info!(
            entries = report.entries,
            skipped = report.skipped,
            trackers_added = report.trackers_added,
            trackers_pruned = report.trackers_pruned,
            "List sync completed"
        );
        Ok(SyncOutcome::Synced(report))
    }

    async fn fetch_collection(
        &self,
        external_id: ExternalAccountId,
        kind: MediaKind,
        token: &str,
    ) -> Result<Option<MediaListCollection>> {
        let request_timeout = self.settings.request_timeout;
        let fetch = self
            .deps
            .provider
            .fetch_media_collection(external_id, kind, token);

        match timeout(request_timeout, fetch).await {
            Ok(Ok(collection)) => Ok(collection),
            Ok(Err(BridgeError::Unauthorized(reason))) => Err(SyncError::AuthInvalid(reason)),
            Ok(Err(e)) => Err(SyncError::SyncFailed(format!("{} list fetch failed: {}", kind, e))),
            Err(_) => Err(SyncError::SyncFailed(format!(
                "{} list fetch timed out after {:?}",
                kind, request_timeout
            ))),
        }
    }

    /// Untrack media the account tracked before but no longer lists.
    async fn prune_removed(
        &self,
        local_id: &LocalAccountId,
        external_id: ExternalAccountId,
        kind: MediaKind,
        current: &HashSet<MediaId>,
    ) -> Result<usize> {
        let previously: BTreeSet<MediaId> = self
            .deps
            .index
            .list_tracked_media(kind, external_id)
            .await
            .map_err(SyncError::from_store)?
            .into_iter()
            .collect();

        let mut pruned = 0;
        for media_id in previously.iter().filter(|id| !current.contains(id)) {
            let outcome = self
                .deps
                .index
                .untrack(kind, *media_id, local_id)
                .await
                .map_err(SyncError::from_store)?;
            if outcome != UntrackOutcome::NotTracked {
                debug!(media_id, "Pruned tracker for removed entry");
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.deps.event_bus.emit(CoreEvent::Sync(event));
    }
}
