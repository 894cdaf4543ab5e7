//! # Reverse Index Store
//!
//! Durable mapping from media id to the accounts tracking it, one table per
//! media kind (`anime_stats`, `manga_stats`).
//!
//! ## Invariants
//!
//! - Trackers are deduplicated by local account id.
//! - A row exists if and only if its tracker list is non-empty. `track`
//!   creates the row; the `untrack` that removes the last tracker deletes it
//!   in the same transaction.
//!
//! Each operation is a single statement (or a single transaction) against
//! one row, so concurrent calls for different accounts never lose trackers.

use crate::error::{LibraryError, Result};
use crate::models::{LocalAccountId, MediaStatEntry, Tracker};
use async_trait::async_trait;
use bridge_traits::{ExternalAccountId, MediaId, MediaKind};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument};

/// Result of [`ReverseIndexStore::track`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    /// The tracker was appended (creating the entry if needed).
    Added,
    /// A tracker with the same local account id was already present.
    AlreadyTracked,
}

/// Result of [`ReverseIndexStore::untrack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UntrackOutcome {
    /// The tracker was removed and others remain.
    Removed,
    /// The tracker was the last one; the entry is gone.
    EntryDeleted,
    /// Nothing matched.
    NotTracked,
}

#[async_trait]
pub trait ReverseIndexStore: Send + Sync {
    /// Idempotently record `tracker` against `media_id`.
    async fn track(&self, kind: MediaKind, media_id: MediaId, tracker: &Tracker) -> Result<TrackOutcome>;

    /// Remove the tracker of `local_id`, deleting the entry if it becomes empty.
    async fn untrack(
        &self,
        kind: MediaKind,
        media_id: MediaId,
        local_id: &LocalAccountId,
    ) -> Result<UntrackOutcome>;

    /// Media ids with at least one tracker for `external_id`, ascending.
    async fn list_tracked_media(&self, kind: MediaKind, external_id: ExternalAccountId) -> Result<Vec<MediaId>>;

    /// Untrack `local_id` from every entry. Returns how many entries changed.
    async fn wipe_account(&self, kind: MediaKind, local_id: &LocalAccountId) -> Result<usize>;

    async fn find_entry(&self, kind: MediaKind, media_id: MediaId) -> Result<Option<MediaStatEntry>>;

    /// Number of media ids with at least one tracker.
    async fn tracked_media_count(&self, kind: MediaKind) -> Result<u64>;
}

/// SQLite implementation of [`ReverseIndexStore`].
///
/// Trackers are stored as a JSON array and edited with SQLite's JSON
/// functions so every change is a single-row atomic write.
pub struct SqliteReverseIndexStore {
    pool: SqlitePool,
}

impl SqliteReverseIndexStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn table(kind: MediaKind) -> &'static str {
        match kind {
            MediaKind::Anime => "anime_stats",
            MediaKind::Manga => "manga_stats",
        }
    }

    async fn media_tracked_by(&self, kind: MediaKind, local_id: &LocalAccountId) -> Result<Vec<MediaId>> {
        let sql = format!(
            r#"
            SELECT media_id FROM {table}
            WHERE EXISTS (
                SELECT 1 FROM json_each({table}.trackers)
                WHERE json_extract(json_each.value, '$.localId') = ?
            )
            ORDER BY media_id
            "#,
            table = Self::table(kind)
        );

        let ids = sqlx::query_scalar::<_, i64>(&sql)
            .bind(local_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}

#[derive(Debug, FromRow)]
struct MediaStatRow {
    media_id: i64,
    trackers: String,
}

impl MediaStatRow {
    fn into_entry(self, kind: MediaKind) -> Result<MediaStatEntry> {
        let trackers: Vec<Tracker> = serde_json::from_str(&self.trackers).map_err(|e| {
            LibraryError::InvalidInput {
                field: "trackers".to_string(),
                message: format!("media {}: {}", self.media_id, e),
            }
        })?;
        Ok(MediaStatEntry {
            kind,
            media_id: self.media_id,
            trackers,
        })
    }
}

#[async_trait]
impl ReverseIndexStore for SqliteReverseIndexStore {
    #[instrument(skip(self, tracker), fields(local_id = %tracker.local_id))]
    async fn track(&self, kind: MediaKind, media_id: MediaId, tracker: &Tracker) -> Result<TrackOutcome> {
        let sql = format!(
            r#"
            INSERT INTO {table} (media_id, trackers)
            VALUES (?, json_array(json_object('externalId', ?, 'localId', ?)))
            ON CONFLICT(media_id) DO UPDATE SET
                trackers = json_insert(
                    {table}.trackers, '$[#]',
                    json_object('externalId', ?, 'localId', ?)
                )
            WHERE NOT EXISTS (
                SELECT 1 FROM json_each({table}.trackers)
                WHERE json_extract(json_each.value, '$.localId') = ?
            )
            "#,
            table = Self::table(kind)
        );

        let result = sqlx::query(&sql)
            .bind(media_id)
            .bind(tracker.external_id.as_i64())
            .bind(tracker.local_id.as_str())
            .bind(tracker.external_id.as_i64())
            .bind(tracker.local_id.as_str())
            .bind(tracker.local_id.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            Ok(TrackOutcome::AlreadyTracked)
        } else {
            debug!(kind = %kind, media_id, "Tracker added");
            Ok(TrackOutcome::Added)
        }
    }

    #[instrument(skip(self), fields(local_id = %local_id))]
    async fn untrack(
        &self,
        kind: MediaKind,
        media_id: MediaId,
        local_id: &LocalAccountId,
    ) -> Result<UntrackOutcome> {
        let table = Self::table(kind);
        let mut tx = self.pool.begin().await?;

        // The first statement writes, so the transaction holds the write lock
        // from the start and the emptiness check below sees our own update.
        let removed = sqlx::query(&format!(
            r#"
            UPDATE {table} SET trackers = (
                SELECT json_group_array(json(json_each.value))
                FROM json_each({table}.trackers)
                WHERE json_extract(json_each.value, '$.localId') IS NOT ?
            )
            WHERE media_id = ?
              AND EXISTS (
                SELECT 1 FROM json_each({table}.trackers)
                WHERE json_extract(json_each.value, '$.localId') = ?
              )
            "#
        ))
        .bind(local_id.as_str())
        .bind(media_id)
        .bind(local_id.as_str())
        .execute(&mut *tx)
        .await?;

        if removed.rows_affected() == 0 {
            tx.commit().await?;
            return Ok(UntrackOutcome::NotTracked);
        }

        let deleted = sqlx::query(&format!(
            "DELETE FROM {table} WHERE media_id = ? AND json_array_length(trackers) = 0"
        ))
        .bind(media_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if deleted.rows_affected() > 0 {
            debug!(kind = %kind, media_id, "Last tracker removed, entry deleted");
            Ok(UntrackOutcome::EntryDeleted)
        } else {
            Ok(UntrackOutcome::Removed)
        }
    }

    async fn list_tracked_media(&self, kind: MediaKind, external_id: ExternalAccountId) -> Result<Vec<MediaId>> {
        let sql = format!(
            r#"
            SELECT media_id FROM {table}
            WHERE EXISTS (
                SELECT 1 FROM json_each({table}.trackers)
                WHERE json_extract(json_each.value, '$.externalId') = ?
            )
            ORDER BY media_id
            "#,
            table = Self::table(kind)
        );

        let ids = sqlx::query_scalar::<_, i64>(&sql)
            .bind(external_id.as_i64())
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    #[instrument(skip(self), fields(local_id = %local_id))]
    async fn wipe_account(&self, kind: MediaKind, local_id: &LocalAccountId) -> Result<usize> {
        let media_ids = self.media_tracked_by(kind, local_id).await?;

        let mut changed = 0;
        for media_id in media_ids {
            if self.untrack(kind, media_id, local_id).await? != UntrackOutcome::NotTracked {
                changed += 1;
            }
        }

        debug!(kind = %kind, changed, "Account wiped from reverse index");
        Ok(changed)
    }

    async fn find_entry(&self, kind: MediaKind, media_id: MediaId) -> Result<Option<MediaStatEntry>> {
        let sql = format!(
            "SELECT media_id, trackers FROM {} WHERE media_id = ?",
            Self::table(kind)
        );

        let row = sqlx::query_as::<_, MediaStatRow>(&sql)
            .bind(media_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_entry(kind)).transpose()
    }

    async fn tracked_media_count(&self, kind: MediaKind) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", Self::table(kind));
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    fn tracker(external: i64, local: &str) -> Tracker {
        Tracker::new(ExternalAccountId::new(external), LocalAccountId::new(local))
    }

    async fn store() -> SqliteReverseIndexStore {
        SqliteReverseIndexStore::new(create_test_pool().await.unwrap())
    }

    async fn empty_rows(store: &SqliteReverseIndexStore, kind: MediaKind) -> i64 {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE json_array_length(trackers) = 0",
            SqliteReverseIndexStore::table(kind)
        );
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&store.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_track_is_idempotent() {
        let store = store().await;
        let t = tracker(100, "alice");

        assert_eq!(store.track(MediaKind::Anime, 1, &t).await.unwrap(), TrackOutcome::Added);
        assert_eq!(
            store.track(MediaKind::Anime, 1, &t).await.unwrap(),
            TrackOutcome::AlreadyTracked
        );

        let entry = store.find_entry(MediaKind::Anime, 1).await.unwrap().unwrap();
        assert_eq!(entry.trackers, vec![t]);
    }

    #[tokio::test]
    async fn test_dedup_key_is_local_id() {
        let store = store().await;
        store.track(MediaKind::Anime, 1, &tracker(100, "alice")).await.unwrap();

        // Re-bound to another external account: still one tracker for alice.
        let outcome = store.track(MediaKind::Anime, 1, &tracker(200, "alice")).await.unwrap();
        assert_eq!(outcome, TrackOutcome::AlreadyTracked);

        let entry = store.find_entry(MediaKind::Anime, 1).await.unwrap().unwrap();
        assert_eq!(entry.trackers.len(), 1);
        assert_eq!(entry.trackers[0].external_id, ExternalAccountId::new(100));
    }

    #[tokio::test]
    async fn test_trackers_keep_insertion_order() {
        let store = store().await;
        for (ext, local) in [(3, "c"), (1, "a"), (2, "b")] {
            store.track(MediaKind::Manga, 7, &tracker(ext, local)).await.unwrap();
        }
        store
            .untrack(MediaKind::Manga, 7, &LocalAccountId::new("a"))
            .await
            .unwrap();

        let entry = store.find_entry(MediaKind::Manga, 7).await.unwrap().unwrap();
        let locals: Vec<_> = entry.trackers.iter().map(|t| t.local_id.as_str()).collect();
        assert_eq!(locals, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_last_untrack_deletes_entry() {
        let store = store().await;
        let alice = LocalAccountId::new("alice");
        store.track(MediaKind::Anime, 5, &tracker(100, "alice")).await.unwrap();

        assert_eq!(
            store.untrack(MediaKind::Anime, 5, &alice).await.unwrap(),
            UntrackOutcome::EntryDeleted
        );
        assert!(store.find_entry(MediaKind::Anime, 5).await.unwrap().is_none());
        assert_eq!(
            store.untrack(MediaKind::Anime, 5, &alice).await.unwrap(),
            UntrackOutcome::NotTracked
        );
        assert_eq!(empty_rows(&store, MediaKind::Anime).await, 0);
    }

    #[tokio::test]
    async fn test_wipe_removes_only_that_account() {
        let store = store().await;
        let alice = tracker(100, "alice");
        let bob = tracker(200, "bob");

        // A tracked by alice only, B by alice and bob.
        store.track(MediaKind::Anime, 1, &alice).await.unwrap();
        store.track(MediaKind::Anime, 2, &alice).await.unwrap();
        store.track(MediaKind::Anime, 2, &bob).await.unwrap();

        let changed = store.wipe_account(MediaKind::Anime, &alice.local_id).await.unwrap();
        assert_eq!(changed, 2);

        assert!(store.find_entry(MediaKind::Anime, 1).await.unwrap().is_none());
        let b = store.find_entry(MediaKind::Anime, 2).await.unwrap().unwrap();
        assert_eq!(b.trackers, vec![bob]);
        assert_eq!(empty_rows(&store, MediaKind::Anime).await, 0);

        assert_eq!(store.wipe_account(MediaKind::Anime, &alice.local_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_tracked_media_by_external_id() {
        let store = store().await;
        store.track(MediaKind::Anime, 30, &tracker(100, "alice")).await.unwrap();
        store.track(MediaKind::Anime, 10, &tracker(100, "alice")).await.unwrap();
        store.track(MediaKind::Anime, 20, &tracker(200, "bob")).await.unwrap();
        store.track(MediaKind::Manga, 40, &tracker(100, "alice")).await.unwrap();

        let ids = store
            .list_tracked_media(MediaKind::Anime, ExternalAccountId::new(100))
            .await
            .unwrap();
        assert_eq!(ids, vec![10, 30]);

        assert_eq!(store.tracked_media_count(MediaKind::Anime).await.unwrap(), 3);
        assert_eq!(store.tracked_media_count(MediaKind::Manga).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_kinds_are_independent() {
        let store = store().await;
        store.track(MediaKind::Anime, 1, &tracker(100, "alice")).await.unwrap();

        assert!(store.find_entry(MediaKind::Manga, 1).await.unwrap().is_none());
        assert_eq!(
            store
                .untrack(MediaKind::Manga, 1, &LocalAccountId::new("alice"))
                .await
                .unwrap(),
            UntrackOutcome::NotTracked
        );
    }
}
