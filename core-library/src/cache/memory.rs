//! Process-local cache backend.

use super::CacheStore;
use crate::error::Result;
use async_trait::async_trait;
use bridge_traits::Clock;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheRecord {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl CacheRecord {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-memory [`CacheStore`].
///
/// Expired entries are removed lazily by `get` and in bulk by
/// `purge_expired`. Contents are lost on restart and refilled by the next
/// sync.
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheRecord>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCacheStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn put(&self, key: &str, value: Value, expires_at: Option<DateTime<Utc>>) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), CacheRecord { value, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(record) if record.is_live(now) => return Ok(Some(record.value.clone())),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        // Re-check: a writer may have refreshed the key between the two locks.
        if let Some(record) = entries.get(key) {
            if record.is_live(now) {
                return Ok(Some(record.value.clone()));
            }
            entries.remove(key);
            debug!(key, "Evicted expired cache entry");
        }
        Ok(None)
    }

    async fn expire_at(&self, key: &str, at: DateTime<Utc>) -> Result<bool> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(record) if record.is_live(now) => {
                record.expires_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = self.clock.now();
        let removed = self.entries.write().await.remove(key);
        Ok(removed.map_or(false, |record| record.is_live(now)))
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, record| record.is_live(now));
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::ManualClock;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn setup() -> (Arc<ManualClock>, MemoryCacheStore) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let store = MemoryCacheStore::new(clock.clone());
        (clock, store)
    }

    #[tokio::test]
    async fn test_put_overwrites_value_and_deadline() {
        let (clock, store) = setup();
        let soon = clock.now() + Duration::minutes(1);

        store.put("k", json!(1), Some(soon)).await.unwrap();
        store.put("k", json!(2), None).await.unwrap();

        clock.advance(Duration::days(30));
        assert_eq!(store.get("k").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_entry_expires_at_deadline() {
        let (clock, store) = setup();
        let deadline = clock.now() + Duration::hours(1);
        store.put("k", json!("v"), Some(deadline)).await.unwrap();

        clock.advance(Duration::minutes(59));
        assert!(store.get("k").await.unwrap().is_some());

        clock.advance(Duration::minutes(1));
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty().await, "expired entry is removed on read");
    }

    #[tokio::test]
    async fn test_expire_at_keeps_payload() {
        let (clock, store) = setup();
        store.put("k", json!({"a": 1}), None).await.unwrap();

        assert!(store
            .expire_at("k", clock.now() + Duration::seconds(10))
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 1})));

        clock.advance(Duration::seconds(10));
        assert!(store.get("k").await.unwrap().is_none());
        assert!(!store.expire_at("missing", clock.now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (clock, store) = setup();
        store
            .put("a", json!(1), Some(clock.now() + Duration::seconds(1)))
            .await
            .unwrap();
        store.put("b", json!(2), None).await.unwrap();

        clock.advance(Duration::seconds(5));
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
        assert!(store.delete("b").await.unwrap());
        assert!(!store.delete("b").await.unwrap());
    }
}
