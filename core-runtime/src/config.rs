//! # Core Configuration Module
//!
//! Provides configuration management for the list synchronization core.
//!
//! ## Overview
//!
//! A builder assembles a `CoreConfig` holding the injected bridges and the
//! timing policy used by the synchronizer, rate limiter and scheduler.
//! Validation is fail-fast: a missing bridge is reported with an actionable
//! `CapabilityMissing` error before anything touches the database.
//!
//! ## Required Dependencies
//!
//! - `SealedBox` - Encrypts stored credentials
//! - `MediaListProvider` - Client for the external list-tracking API
//!
//! ## Optional Dependencies
//!
//! - `Clock` - Time source (default: `SystemClock`)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, SyncSettings};
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/listsync/state.db")
//!     .sealed_box(Arc::new(MySealedBox))
//!     .list_provider(Arc::new(MyGraphQlClient))
//!     .sync_settings(SyncSettings::default().with_cooldown_window(Duration::from_secs(600)))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, MediaListProvider, SealedBox, SystemClock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Fleet sync period used when the schedule record is first created.
pub const DEFAULT_SYNC_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Cooldown applied to manual sync requests.
pub const DEFAULT_COOLDOWN_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Upper bound on how long a cached media document lives.
pub const DEFAULT_MEDIA_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Bound applied to every call into the external API.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Where cached documents live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackend {
    /// Process-local map. Lost on restart, refilled by the next sync.
    #[default]
    Memory,
    /// `cache_entries` table in the core database.
    Sqlite,
}

/// Timing and retry policy for synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub sync_period: Duration,
    pub cooldown_window: Duration,
    pub media_ttl: Duration,
    pub request_timeout: Duration,
    /// Attempts per media id when the wipe flow untracks an account
    pub untrack_retry_attempts: u32,
    pub untrack_retry_backoff: Duration,
    /// Untrack media that vanished from an account's lists since the previous
    /// snapshot. Off by default: trackers are only removed by an explicit wipe.
    pub reconcile_removed_entries: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_period: DEFAULT_SYNC_PERIOD,
            cooldown_window: DEFAULT_COOLDOWN_WINDOW,
            media_ttl: DEFAULT_MEDIA_TTL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            untrack_retry_attempts: 3,
            untrack_retry_backoff: Duration::from_millis(50),
            reconcile_removed_entries: false,
        }
    }
}

impl SyncSettings {
    pub fn with_sync_period(mut self, period: Duration) -> Self {
        self.sync_period = period;
        self
    }

    pub fn with_cooldown_window(mut self, window: Duration) -> Self {
        self.cooldown_window = window;
        self
    }

    pub fn with_media_ttl(mut self, ttl: Duration) -> Self {
        self.media_ttl = ttl;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_untrack_retries(mut self, attempts: u32, backoff: Duration) -> Self {
        self.untrack_retry_attempts = attempts;
        self.untrack_retry_backoff = backoff;
        self
    }

    pub fn with_reconcile_removed_entries(mut self, enabled: bool) -> Self {
        self.reconcile_removed_entries = enabled;
        self
    }

    /// Validates the timing policy.
    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("Sync period", self.sync_period),
            ("Cooldown window", self.cooldown_window),
            ("Media TTL", self.media_ttl),
            ("Request timeout", self.request_timeout),
        ];
        for (name, value) in non_zero {
            if value.is_zero() {
                return Err(Error::Config(format!("{} must be greater than 0", name)));
            }
        }

        if self.request_timeout >= self.sync_period {
            return Err(Error::Config(
                "Request timeout must be shorter than the sync period".to_string(),
            ));
        }

        if self.untrack_retry_attempts == 0 {
            return Err(Error::Config(
                "Untrack retry attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Core configuration.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Credential encryption (required)
    pub sealed_box: Arc<dyn SealedBox>,

    /// External list API client (required)
    pub list_provider: Arc<dyn MediaListProvider>,

    pub clock: Arc<dyn Clock>,

    pub cache_backend: CacheBackend,

    pub sync: SyncSettings,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("sealed_box", &"SealedBox { ... }")
            .field("list_provider", &"MediaListProvider { ... }")
            .field("cache_backend", &self.cache_backend)
            .field("sync", &self.sync)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        self.sync.validate()
    }
}

fn sealed_box_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SealedBox".to_string(),
        message: "A SealedBox implementation is required to encrypt stored credentials. \
                 Inject an AEAD-backed box (e.g. core_auth::AesGcmSealedBox) or a KMS adapter."
            .to_string(),
    }
}

fn list_provider_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "MediaListProvider".to_string(),
        message: "A MediaListProvider implementation is required to pull lists from the \
                 external service. Inject the host's GraphQL client adapter."
            .to_string(),
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    sealed_box: Option<Arc<dyn SealedBox>>,
    list_provider: Option<Arc<dyn MediaListProvider>>,
    clock: Option<Arc<dyn Clock>>,
    cache_backend: CacheBackend,
    sync: SyncSettings,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    pub fn database_path(mut self, path: impl AsRef<Path>) -> Self {
        self.database_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn sealed_box(mut self, sealed_box: Arc<dyn SealedBox>) -> Self {
        self.sealed_box = Some(sealed_box);
        self
    }

    pub fn list_provider(mut self, provider: Arc<dyn MediaListProvider>) -> Self {
        self.list_provider = Some(provider);
        self
    }

    /// Overrides the time source.
    ///
    /// Default: [`SystemClock`]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Default: [`CacheBackend::Memory`]
    pub fn cache_backend(mut self, backend: CacheBackend) -> Self {
        self.cache_backend = backend;
        self
    }

    pub fn sync_settings(mut self, settings: SyncSettings) -> Self {
        self.sync = settings;
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - `Config` when the database path is missing or the timing policy is invalid
    /// - `CapabilityMissing` when a required bridge was not injected
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let sealed_box = self.sealed_box.ok_or_else(sealed_box_missing_error)?;
        let list_provider = self.list_provider.ok_or_else(list_provider_missing_error)?;

        let config = CoreConfig {
            database_path,
            sealed_box,
            list_provider,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            cache_backend: self.cache_backend,
            sync: self.sync,
        };

        config.validate()?;

        Ok(config)
    }
}
