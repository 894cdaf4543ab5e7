//! # Cache Store
//!
//! TTL key-value store for list snapshots and media documents.
//!
//! ## Overview
//!
//! [`CacheStore`] is the storage contract: atomic overwrite on `put`, lazy
//! expiry on `get`, and an `expire_at` that moves a key's deadline without
//! touching its payload. Eviction is purely temporal; there is no capacity
//! bound and no LRU.
//!
//! [`MediaCache`] layers the key conventions and TTL policy on top:
//!
//! | Key                              | Payload          | Expiry                                  |
//! |----------------------------------|------------------|-----------------------------------------|
//! | `user:{externalId}-{kind}`       | list snapshot    | none; replaced on every sync            |
//! | `media:{kind}-{mediaId}`         | media document   | min(now + media TTL, next release)      |
//! | `alias:{kind}-{normalizedTitle}` | `{ "mediaId" }`  | same as the owning media document       |
//!
//! Two backends ship: [`MemoryCacheStore`] (process-local) and
//! [`SqliteCacheStore`] (the `cache_entries` table).

pub mod keys;
pub mod media_cache;
pub mod memory;
pub mod sqlite;

pub use media_cache::MediaCache;
pub use memory::MemoryCacheStore;
pub use sqlite::SqliteCacheStore;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// TTL key-value store.
///
/// Every operation is atomic per key. An entry whose deadline has passed is
/// indistinguishable from an absent one.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Write `value` under `key`, replacing any previous value and deadline.
    ///
    /// `expires_at = None` keeps the entry until it is overwritten or deleted.
    async fn put(&self, key: &str, value: Value, expires_at: Option<DateTime<Utc>>) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Move the deadline of a live entry. Returns `false` when the key is
    /// absent or already expired.
    async fn expire_at(&self, key: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Returns `true` when a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Drop every expired entry. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}
