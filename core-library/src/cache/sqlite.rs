//! Durable cache backend on the `cache_entries` table.

use super::CacheStore;
use crate::error::{LibraryError, Result};
use async_trait::async_trait;
use bridge_traits::Clock;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use tracing::{debug, instrument};

/// [`CacheStore`] persisted in SQLite. Survives restarts; expiry is checked
/// against the injected clock on every read.
pub struct SqliteCacheStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteCacheStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[derive(Debug, FromRow)]
struct CacheEntryRow {
    value: String,
    expires_at: Option<i64>,
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    #[instrument(skip(self, value))]
    async fn put(&self, key: &str, value: Value, expires_at: Option<DateTime<Utc>>) -> Result<()> {
        let payload = serde_json::to_string(&value)?;

        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(payload)
        .bind(expires_at.map(|at| at.timestamp_millis()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let row = sqlx::query_as::<_, CacheEntryRow>(
            "SELECT value, expires_at FROM cache_entries WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let now = self.clock.unix_timestamp_millis();
        if row.expires_at.is_some_and(|at| at <= now) {
            sqlx::query("DELETE FROM cache_entries WHERE key = ? AND expires_at <= ?")
                .bind(key)
                .bind(now)
                .execute(&self.pool)
                .await?;
            debug!(key, "Evicted expired cache entry");
            return Ok(None);
        }

        let value = serde_json::from_str(&row.value).map_err(|e| {
            LibraryError::CacheError(format!("Corrupt cache entry {}: {}", key, e))
        })?;
        Ok(Some(value))
    }

    async fn expire_at(&self, key: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE cache_entries SET expires_at = ?
            WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)
            "#,
        )
        .bind(at.timestamp_millis())
        .bind(key)
        .bind(self.clock.unix_timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM cache_entries WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(self.clock.unix_timestamp_millis())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Still drop an expired leftover so the key is gone either way.
            sqlx::query("DELETE FROM cache_entries WHERE key = ?")
                .bind(key)
                .execute(&self.pool)
                .await?;
        }

        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self) -> Result<usize> {
        let result = sqlx::query(
            "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(self.clock.unix_timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use bridge_traits::ManualClock;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    async fn setup() -> (Arc<ManualClock>, SqliteCacheStore) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let pool = create_test_pool().await.unwrap();
        (clock.clone(), SqliteCacheStore::new(pool, clock))
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (_, store) = setup().await;
        store
            .put("user:1-anime", json!({"10": {"status": "CURRENT"}}), None)
            .await
            .unwrap();

        let value = store.get("user:1-anime").await.unwrap().unwrap();
        assert_eq!(value["10"]["status"], "CURRENT");
        assert!(store.get("user:2-anime").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expiry_and_refresh() {
        let (clock, store) = setup().await;
        store
            .put("media:anime-1", json!({"id": 1}), Some(clock.now() + Duration::days(7)))
            .await
            .unwrap();

        assert!(store
            .expire_at("media:anime-1", clock.now() + Duration::days(1))
            .await
            .unwrap());

        clock.advance(Duration::days(2));
        assert!(store.get("media:anime-1").await.unwrap().is_none());
        assert!(!store
            .expire_at("media:anime-1", clock.now() + Duration::days(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_delete_and_purge() {
        let (clock, store) = setup().await;
        store.put("a", json!(1), None).await.unwrap();
        store
            .put("b", json!(2), Some(clock.now() + Duration::seconds(1)))
            .await
            .unwrap();

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());

        clock.advance(Duration::seconds(2));
        assert_eq!(store.purge_expired().await.unwrap(), 1);
    }
}
