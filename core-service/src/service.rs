//! # List Sync Service
//!
//! Front-end facing operations over the assembled core.
//!
//! ## Operations
//!
//! | Operation | Gate | Errors surfaced |
//! |-----------|------|-----------------|
//! | `bind` | - | `AuthInvalid`, provider timeout |
//! | `unbind` | - | `NotBound` |
//! | `sync_lists` / `sync_account` | rate limiter (`synclists`) | `OnCooldown`, `NotBound`, `AuthInvalid`, `SyncFailed`, `DecryptionFailed` |
//! | `wipe_lists` / `wipe_account_lists` | - | `NotBound`, `NothingToWipe` |
//!
//! Reads (`tracked_media_count`, `trackers_for`, cached documents, scheduler
//! status) never mutate state.

use crate::error::{CoreError, Result};
use bridge_traits::{ExternalAccountId, MediaId, MediaKind};
use core_auth::{AccessToken, AccountBinder, BindOutcome, CredentialVault};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{
    AccountRepository, CacheStore, ListSnapshot, LocalAccountId, MediaCache, MediaDocument,
    MemoryCacheStore, ReverseIndexStore, SqliteAccountRepository, SqliteCacheStore,
    SqliteReverseIndexStore, SqliteScheduleRepository, Tracker, SYNC_JOB_TYPE,
};
use core_runtime::events::{AccountEvent, CoreEvent, EventBus};
use core_runtime::{CacheBackend, CoreConfig, SyncSettings};
use core_sync::{
    FleetSynchronizer, ListSynchronizer, RateLimiter, RetryPolicy, SchedulerActor,
    SchedulerConfig, SchedulerHandle, SchedulerStatus, SyncError, SyncOutcome,
    SynchronizerDeps, TickOutcome, WipeFlow, WipeReport,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;
use tracing::{info, instrument, warn};

/// Rate limiter command guarding on-demand list syncs.
pub const SYNC_LISTS_COMMAND: &str = "synclists";

/// Outcome of syncing both media kinds of one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListsSyncReport {
    pub anime: SyncOutcome,
    pub manga: SyncOutcome,
}

impl ListsSyncReport {
    /// Neither kind had any list.
    pub fn is_empty(&self) -> bool {
        self.anime == SyncOutcome::NoLists && self.manga == SyncOutcome::NoLists
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnbindReport {
    pub external_id: ExternalAccountId,
    /// Trackers removed across both kinds
    pub untracked: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Housekeeping {
    pub cooldowns_purged: usize,
    pub cache_entries_purged: usize,
}

struct ServiceInner {
    settings: SyncSettings,
    event_bus: EventBus,
    accounts: Arc<dyn AccountRepository>,
    index: Arc<dyn ReverseIndexStore>,
    cache: MediaCache,
    vault: Arc<CredentialVault>,
    binder: AccountBinder,
    synchronizer: Arc<ListSynchronizer>,
    wipe: WipeFlow,
    rate_limiter: RateLimiter,
    scheduler: SchedulerHandle,
}

/// Primary facade exposed to host applications.
///
/// Cheap to clone; clones share the same stores, rate limiter and scheduler.
#[derive(Clone)]
pub struct ListSyncService {
    inner: Arc<ServiceInner>,
}

impl ListSyncService {
    /// Open the database, assemble every component and start the scheduler.
    ///
    /// Must be called from within a Tokio runtime.
    #[instrument(skip(config), fields(database = %config.database_path.display()))]
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let CoreConfig {
            database_path,
            sealed_box,
            list_provider,
            clock,
            cache_backend,
            sync: settings,
        } = config;

        let pool = create_pool(DatabaseConfig::new(database_path)).await?;
        let event_bus = EventBus::default();

        let store: Arc<dyn CacheStore> = match cache_backend {
            CacheBackend::Memory => Arc::new(MemoryCacheStore::new(clock.clone())),
            CacheBackend::Sqlite => Arc::new(SqliteCacheStore::new(pool.clone(), clock.clone())),
        };
        let cache = MediaCache::new(store, clock.clone(), settings.media_ttl)?;

        let accounts: Arc<dyn AccountRepository> =
            Arc::new(SqliteAccountRepository::new(pool.clone()));
        let index: Arc<dyn ReverseIndexStore> = Arc::new(SqliteReverseIndexStore::new(pool.clone()));

        let vault = Arc::new(CredentialVault::new(
            accounts.clone(),
            sealed_box,
            clock.clone(),
        ));
        let binder = AccountBinder::new(
            vault.clone(),
            list_provider.clone(),
            event_bus.clone(),
            settings.request_timeout,
        );

        let synchronizer = Arc::new(ListSynchronizer::new(
            SynchronizerDeps {
                vault: vault.clone(),
                provider: list_provider,
                index: index.clone(),
                cache: cache.clone(),
                accounts: accounts.clone(),
                clock: clock.clone(),
                event_bus: event_bus.clone(),
            },
            settings.clone(),
        ));

        let wipe = WipeFlow::new(
            index.clone(),
            cache.clone(),
            RetryPolicy {
                attempts: settings.untrack_retry_attempts,
                backoff: settings.untrack_retry_backoff,
            },
        );

        let rate_limiter = RateLimiter::new(clock.clone(), settings.cooldown_window);

        let scheduler = SchedulerActor::spawn(
            SchedulerConfig {
                job_type: SYNC_JOB_TYPE.to_string(),
                period: settings.sync_period,
            },
            Arc::new(FleetSynchronizer::new(accounts.clone(), synchronizer.clone())),
            Arc::new(SqliteScheduleRepository::new(pool)),
            clock,
            event_bus.clone(),
        )
        .await?;

        info!(cache_backend = ?cache_backend, "List sync core ready");

        Ok(Self {
            inner: Arc::new(ServiceInner {
                settings,
                event_bus,
                accounts,
                index,
                cache,
                vault,
                binder,
                synchronizer,
                wipe,
                rate_limiter,
                scheduler,
            }),
        })
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    /// Subscribe to account, sync and scheduler events.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.inner.event_bus.subscribe()
    }

    // ===== Accounts =====

    /// Bind (or re-bind) `local_id` to the account `raw_token` belongs to.
    ///
    /// Re-binding to a different external account wipes what the previous
    /// one left behind: its snapshots and this account's trackers.
    #[instrument(skip(self, raw_token), fields(local_id = %local_id))]
    pub async fn bind(&self, local_id: &LocalAccountId, raw_token: impl Into<String>) -> Result<BindOutcome> {
        let previous = self.inner.vault.external_id(local_id).await?;
        let outcome = self
            .inner
            .binder
            .bind(local_id, AccessToken::new(raw_token))
            .await?;

        let current = ExternalAccountId::new(outcome.viewer.id);
        if let Some(previous) = previous.filter(|previous| *previous != current) {
            let untracked = self.wipe_external(local_id, previous).await?;
            info!(previous = %previous, current = %current, untracked, "Cleared lists of previous binding");
        }
        Ok(outcome)
    }

    /// Remove a binding together with every tracker and snapshot it produced.
    #[instrument(skip(self), fields(local_id = %local_id))]
    pub async fn unbind(&self, local_id: &LocalAccountId) -> Result<UnbindReport> {
        let external_id = self.external_id(local_id).await?;
        let mut untracked = self.wipe_external(local_id, external_id).await?;
        for kind in MediaKind::ALL {
            // Trackers left behind by a wipe that did not complete.
            untracked += self.inner.index.wipe_account(kind, local_id).await?;
        }

        self.inner.vault.clear(local_id).await?;
        self.inner.rate_limiter.reset(SYNC_LISTS_COMMAND, local_id.as_str());

        let _ = self.inner.event_bus.emit(CoreEvent::Account(AccountEvent::Unbound {
            local_id: local_id.to_string(),
        }));
        info!(untracked, "Account unbound");

        Ok(UnbindReport {
            external_id,
            untracked,
        })
    }

    pub async fn registered_account_count(&self) -> Result<u64> {
        Ok(self.inner.accounts.count().await?)
    }

    // ===== Synchronization =====

    /// Sync both kinds of one account on demand.
    ///
    /// Gated once by the rate limiter; anime is synced before manga and the
    /// first failure is returned.
    #[instrument(skip(self), fields(local_id = %local_id))]
    pub async fn sync_lists(&self, local_id: &LocalAccountId) -> Result<ListsSyncReport> {
        self.check_cooldown(local_id)?;

        let anime = self.inner.synchronizer.sync_account(local_id, MediaKind::Anime).await?;
        let manga = self.inner.synchronizer.sync_account(local_id, MediaKind::Manga).await?;

        Ok(ListsSyncReport { anime, manga })
    }

    /// Sync one kind of one account on demand. Shares the `synclists` cooldown.
    pub async fn sync_account(&self, local_id: &LocalAccountId, kind: MediaKind) -> Result<SyncOutcome> {
        self.check_cooldown(local_id)?;
        Ok(self.inner.synchronizer.sync_account(local_id, kind).await?)
    }

    /// Time left before `local_id` may sync on demand again.
    pub fn sync_cooldown_remaining(&self, local_id: &LocalAccountId) -> Option<Duration> {
        self.inner
            .rate_limiter
            .remaining(SYNC_LISTS_COMMAND, local_id.as_str())
    }

    pub async fn wipe_account_lists(&self, local_id: &LocalAccountId, kind: MediaKind) -> Result<WipeReport> {
        let external_id = self.external_id(local_id).await?;
        Ok(self
            .inner
            .wipe
            .wipe_account_lists(local_id, external_id, kind)
            .await?)
    }

    /// Wipe both kinds. `NothingToWipe` only when neither kind had anything.
    #[instrument(skip(self), fields(local_id = %local_id))]
    pub async fn wipe_lists(&self, local_id: &LocalAccountId) -> Result<Vec<WipeReport>> {
        let external_id = self.external_id(local_id).await?;
        let mut reports = Vec::new();

        for kind in MediaKind::ALL {
            match self.inner.wipe.wipe_account_lists(local_id, external_id, kind).await {
                Ok(report) => reports.push(report),
                Err(SyncError::NothingToWipe) => {}
                Err(e) => return Err(e.into()),
            }
        }

        if reports.is_empty() {
            return Err(SyncError::NothingToWipe.into());
        }
        Ok(reports)
    }

    // ===== Reads =====

    pub async fn tracked_media_count(&self, kind: MediaKind) -> Result<u64> {
        Ok(self.inner.index.tracked_media_count(kind).await?)
    }

    /// Accounts tracking `media_id`, in the order they started tracking it.
    pub async fn trackers_for(&self, kind: MediaKind, media_id: MediaId) -> Result<Vec<Tracker>> {
        Ok(self
            .inner
            .index
            .find_entry(kind, media_id)
            .await?
            .map(|entry| entry.trackers)
            .unwrap_or_default())
    }

    pub async fn cached_snapshot(
        &self,
        external_id: ExternalAccountId,
        kind: MediaKind,
    ) -> Result<Option<ListSnapshot>> {
        Ok(self.inner.cache.get_snapshot(external_id, kind).await?)
    }

    pub async fn cached_media(&self, kind: MediaKind, media_id: MediaId) -> Result<Option<MediaDocument>> {
        Ok(self.inner.cache.get_media(kind, media_id).await?)
    }

    pub async fn resolve_alias(&self, kind: MediaKind, title: &str) -> Result<Option<MediaDocument>> {
        Ok(self.inner.cache.resolve_alias(kind, title).await?)
    }

    // ===== Scheduler =====

    pub async fn scheduler_status(&self) -> Result<SchedulerStatus> {
        Ok(self.inner.scheduler.status().await?)
    }

    /// Start a fleet pass now unless one is already running.
    pub async fn trigger_fleet_sync(&self) -> Result<TickOutcome> {
        Ok(self.inner.scheduler.trigger_now().await?)
    }

    // ===== Maintenance =====

    /// Drop elapsed cooldowns and expired cache entries.
    pub async fn housekeeping(&self) -> Result<Housekeeping> {
        let cooldowns_purged = self.inner.rate_limiter.purge_expired();
        let cache_entries_purged = self.inner.cache.store().purge_expired().await?;
        Ok(Housekeeping {
            cooldowns_purged,
            cache_entries_purged,
        })
    }

    /// Stop the scheduler. A fleet pass already running is left to finish.
    pub fn shutdown(&self) {
        self.inner.scheduler.shutdown();
        info!("List sync core shut down");
    }

    // ===== Helpers =====

    fn check_cooldown(&self, local_id: &LocalAccountId) -> Result<()> {
        self.inner
            .rate_limiter
            .check(SYNC_LISTS_COMMAND, local_id.as_str())
            .map_err(|e| {
                warn!(local_id = %local_id, error = %e, "Manual sync rejected");
                CoreError::from(e)
            })
    }

    /// Wipe both kinds contributed by `external_id`, tolerating empty ones.
    async fn wipe_external(&self, local_id: &LocalAccountId, external_id: ExternalAccountId) -> Result<usize> {
        let mut untracked = 0;
        for kind in MediaKind::ALL {
            match self.inner.wipe.wipe_account_lists(local_id, external_id, kind).await {
                Ok(report) => untracked += report.untracked,
                Err(SyncError::NothingToWipe) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(untracked)
    }

    async fn external_id(&self, local_id: &LocalAccountId) -> Result<ExternalAccountId> {
        self.inner
            .vault
            .external_id(local_id)
            .await?
            .ok_or_else(|| SyncError::NotBound(local_id.to_string()).into())
    }
}
