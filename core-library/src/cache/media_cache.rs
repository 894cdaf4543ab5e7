//! Typed access to snapshots, media documents and alias lookups.

use super::keys::{alias_key, media_key, snapshot_key};
use super::CacheStore;
use crate::error::{LibraryError, Result};
use crate::models::{ListSnapshot, MediaDocument};
use bridge_traits::{Clock, ExternalAccountId, MediaId, MediaKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AliasTarget {
    media_id: MediaId,
}

/// Cache facade applying the keyspace and TTL policy.
#[derive(Clone)]
pub struct MediaCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    media_ttl: chrono::Duration,
}

impl MediaCache {
    /// `media_ttl` caps the lifetime of every media document.
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, media_ttl: Duration) -> Result<Self> {
        let media_ttl = chrono::Duration::from_std(media_ttl).map_err(|e| {
            LibraryError::InvalidInput {
                field: "media_ttl".to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            store,
            clock,
            media_ttl,
        })
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    // ===== Snapshots =====

    /// Replace the account's snapshot for `kind`. Snapshots never expire.
    pub async fn put_snapshot(
        &self,
        external_id: ExternalAccountId,
        kind: MediaKind,
        snapshot: &ListSnapshot,
    ) -> Result<()> {
        let value = serde_json::to_value(snapshot)?;
        self.store
            .put(&snapshot_key(external_id, kind), value, None)
            .await
    }

    pub async fn get_snapshot(
        &self,
        external_id: ExternalAccountId,
        kind: MediaKind,
    ) -> Result<Option<ListSnapshot>> {
        match self.store.get(&snapshot_key(external_id, kind)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_snapshot(
        &self,
        external_id: ExternalAccountId,
        kind: MediaKind,
    ) -> Result<bool> {
        self.store.delete(&snapshot_key(external_id, kind)).await
    }

    // ===== Media documents =====

    /// Deadline for a media document written now.
    ///
    /// `now + media_ttl`, or the next release time when that is in the future
    /// and earlier.
    pub fn media_expiry(&self, document: &MediaDocument) -> DateTime<Utc> {
        let now = self.clock.now();
        let cap = now + self.media_ttl;

        document
            .next_available_at()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .filter(|at| *at > now && *at < cap)
            .unwrap_or(cap)
    }

    /// Write a media document and its alias keys.
    ///
    /// The deadline is recomputed on every write. Alias keys get the same
    /// deadline; a failed alias write is logged and otherwise ignored.
    pub async fn store_media(&self, document: &MediaDocument) -> Result<DateTime<Utc>> {
        let kind = document.kind();
        let expires_at = self.media_expiry(document);

        self.store
            .put(
                &media_key(kind, document.id()),
                document.to_value()?,
                Some(expires_at),
            )
            .await?;

        let target = serde_json::to_value(AliasTarget {
            media_id: document.id(),
        })?;
        for synonym in &document.common().synonyms {
            let Some(key) = alias_key(kind, synonym) else {
                continue;
            };
            if let Err(e) = self.store.put(&key, target.clone(), Some(expires_at)).await {
                warn!(key = %key, error = %e, "Failed to write alias key");
            }
        }

        debug!(
            kind = %kind,
            media_id = document.id(),
            expires_at = %expires_at,
            "Cached media document"
        );
        Ok(expires_at)
    }

    pub async fn get_media(&self, kind: MediaKind, media_id: MediaId) -> Result<Option<MediaDocument>> {
        match self.store.get(&media_key(kind, media_id)).await? {
            Some(value) => Ok(Some(MediaDocument::from_value(kind, value)?)),
            None => Ok(None),
        }
    }

    /// Look a media document up by one of its synonyms.
    ///
    /// Returns `None` when the alias is unknown or its document has already
    /// expired.
    pub async fn resolve_alias(&self, kind: MediaKind, title: &str) -> Result<Option<MediaDocument>> {
        let Some(key) = alias_key(kind, title) else {
            return Ok(None);
        };
        let Some(value) = self.store.get(&key).await? else {
            return Ok(None);
        };
        let target: AliasTarget = serde_json::from_value(value)?;
        self.get_media(kind, target.media_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::models::{SnapshotEntry, SnapshotUser};
    use bridge_traits::{ManualClock, MediaPayload};
    use chrono::TimeZone;
    use serde_json::json;

    const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    fn setup() -> (Arc<ManualClock>, MediaCache) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryCacheStore::new(clock.clone()));
        let cache = MediaCache::new(store, clock.clone(), WEEK).unwrap();
        (clock, cache)
    }

    fn anime(id: i64, airing_at: Option<i64>) -> MediaDocument {
        let payload: MediaPayload = serde_json::from_value(json!({
            "id": id,
            "title": { "romaji": "Frieren" },
            "synonyms": ["Sousou no Frieren", "Frieren: Beyond Journey's End"],
            "nextAiringEpisode": airing_at.map(|at| json!({ "airingAt": at, "episode": 5 })),
        }))
        .unwrap();
        MediaDocument::from_payload(MediaKind::Anime, &payload).unwrap()
    }

    #[tokio::test]
    async fn test_next_release_shortens_ttl() {
        let (clock, cache) = setup();
        let in_three_days = clock.now() + chrono::Duration::days(3);

        let expires_at = cache
            .store_media(&anime(1, Some(in_three_days.timestamp())))
            .await
            .unwrap();

        assert_eq!(expires_at, in_three_days);
    }

    #[tokio::test]
    async fn test_ttl_capped_at_media_ttl() {
        let (clock, cache) = setup();
        let in_ten_days = clock.now() + chrono::Duration::days(10);
        let week = clock.now() + chrono::Duration::days(7);

        assert_eq!(cache.media_expiry(&anime(1, Some(in_ten_days.timestamp()))), week);
        assert_eq!(cache.media_expiry(&anime(1, None)), week);

        // A release time already in the past is ignored.
        let yesterday = clock.now() - chrono::Duration::days(1);
        assert_eq!(cache.media_expiry(&anime(1, Some(yesterday.timestamp()))), week);
    }

    #[tokio::test]
    async fn test_ttl_reevaluated_on_rewrite() {
        let (clock, cache) = setup();
        let in_one_day = clock.now() + chrono::Duration::days(1);
        cache
            .store_media(&anime(9, Some(in_one_day.timestamp())))
            .await
            .unwrap();

        cache.store_media(&anime(9, None)).await.unwrap();

        clock.advance(chrono::Duration::days(2));
        assert!(cache.get_media(MediaKind::Anime, 9).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_alias_resolves_and_shares_deadline() {
        let (clock, cache) = setup();
        let in_two_days = clock.now() + chrono::Duration::days(2);
        cache
            .store_media(&anime(154587, Some(in_two_days.timestamp())))
            .await
            .unwrap();

        let found = cache
            .resolve_alias(MediaKind::Anime, "SOUSOU NO FRIEREN")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id(), 154587);
        assert!(cache
            .resolve_alias(MediaKind::Manga, "Sousou no Frieren")
            .await
            .unwrap()
            .is_none());

        clock.advance(chrono::Duration::days(2));
        assert!(cache
            .store()
            .get("alias:anime-sousounofrieren")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_snapshot_replace_and_delete() {
        let (_, cache) = setup();
        let ext = ExternalAccountId::new(3);
        let entry = SnapshotEntry {
            user: SnapshotUser {
                name: "mika".to_string(),
                id: 3,
                media_list_options: None,
            },
            status: Some("COMPLETED".to_string()),
            progress: Some(12),
            score: None,
            notes: None,
        };

        let first: ListSnapshot = [(10, entry.clone()), (11, entry.clone())].into();
        cache.put_snapshot(ext, MediaKind::Anime, &first).await.unwrap();

        let second: ListSnapshot = [(12, entry)].into();
        cache.put_snapshot(ext, MediaKind::Anime, &second).await.unwrap();

        let stored = cache.get_snapshot(ext, MediaKind::Anime).await.unwrap().unwrap();
        assert_eq!(stored.keys().copied().collect::<Vec<_>>(), vec![12]);
        assert!(cache.get_snapshot(ext, MediaKind::Manga).await.unwrap().is_none());

        assert!(cache.delete_snapshot(ext, MediaKind::Anime).await.unwrap());
        assert!(cache.get_snapshot(ext, MediaKind::Anime).await.unwrap().is_none());
    }
}
