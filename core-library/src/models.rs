//! Domain models for list synchronization
//!
//! Persisted rows (accounts, reverse-index entries, schedule records) and the
//! documents written to the cache.

use bridge_traits::{
    AiringSchedule, ExternalAccountId, ListOwner, MediaId, MediaKind, MediaListEntry,
    MediaPayload, MediaTitle,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

// =============================================================================
// ID Types
// =============================================================================

/// Identity of an account on the host platform (a chat user id, for example).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalAccountId(String);

impl LocalAccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalAccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LocalAccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for LocalAccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// =============================================================================
// Accounts
// =============================================================================

/// A local account bound to one external identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub local_id: LocalAccountId,
    pub external_id: ExternalAccountId,
    /// Sealed token; never the raw credential
    pub encrypted_token: Vec<u8>,
    /// Unix millis of the last successful list sync
    pub last_synced_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

// =============================================================================
// Reverse Index
// =============================================================================

/// An account recorded against a media entry.
///
/// Two trackers are the same tracker when their `local_id` matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tracker {
    pub external_id: ExternalAccountId,
    pub local_id: LocalAccountId,
}

impl Tracker {
    pub fn new(external_id: ExternalAccountId, local_id: LocalAccountId) -> Self {
        Self {
            external_id,
            local_id,
        }
    }
}

/// One row of `anime_stats` / `manga_stats`.
///
/// A persisted entry always has at least one tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaStatEntry {
    pub kind: MediaKind,
    pub media_id: MediaId,
    /// Insertion order is preserved
    pub trackers: Vec<Tracker>,
}

impl MediaStatEntry {
    pub fn is_tracked_by(&self, local_id: &LocalAccountId) -> bool {
        self.trackers.iter().any(|t| &t.local_id == local_id)
    }
}

// =============================================================================
// Schedule
// =============================================================================

/// Job type of the fleet-wide list sync.
pub const SYNC_JOB_TYPE: &str = "SYNC";

/// Persisted description of a recurring job. One row per job type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRecord {
    pub job_type: String,
    pub period: Duration,
    pub created_at: i64,
    /// Unix millis at which the last pass finished
    pub last_run_at: Option<i64>,
}

impl ScheduleRecord {
    /// Unix millis at which the next pass is due.
    ///
    /// A job that never ran is due one period after creation.
    pub fn next_due_at(&self) -> i64 {
        let base = self.last_run_at.unwrap_or(self.created_at);
        base.saturating_add(self.period.as_millis() as i64)
    }
}

// =============================================================================
// List Snapshot
// =============================================================================

/// Owner fields denormalized into every snapshot entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotUser {
    pub name: String,
    pub id: i64,
    #[serde(default)]
    pub media_list_options: Option<serde_json::Value>,
}

impl From<&ListOwner> for SnapshotUser {
    fn from(owner: &ListOwner) -> Self {
        Self {
            name: owner.name.clone(),
            id: owner.id,
            media_list_options: owner.media_list_options.clone(),
        }
    }
}

/// An account's progress against one media item, as cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub user: SnapshotUser,
    pub status: Option<String>,
    pub progress: Option<i32>,
    pub score: Option<f64>,
    pub notes: Option<String>,
}

impl SnapshotEntry {
    pub fn from_list_entry(user: SnapshotUser, entry: &MediaListEntry) -> Self {
        Self {
            user,
            status: entry.status.clone(),
            progress: entry.progress,
            score: entry.score,
            notes: entry.notes.clone(),
        }
    }
}

/// Media id to entry, for one account and one kind. Replaced wholesale.
pub type ListSnapshot = BTreeMap<MediaId, SnapshotEntry>;

// =============================================================================
// Media Documents
// =============================================================================

/// Fields shared by both document shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaCommon {
    pub id: MediaId,
    #[serde(default)]
    pub title: Option<MediaTitle>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Cached anime metadata. Carries no chapter or volume counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimeDoc {
    #[serde(flatten)]
    pub common: MediaCommon,
    pub episodes: Option<i32>,
    pub duration: Option<i32>,
    pub next_airing_episode: Option<AiringSchedule>,
}

/// Cached manga metadata. Carries no broadcast or episode fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MangaDoc {
    #[serde(flatten)]
    pub common: MediaCommon,
    pub chapters: Option<i32>,
    pub volumes: Option<i32>,
}

/// A media document of either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaDocument {
    Anime(AnimeDoc),
    Manga(MangaDoc),
}

impl MediaDocument {
    /// Build the kind-specific document from a list-entry payload.
    ///
    /// Returns `None` when the payload has no usable id.
    pub fn from_payload(kind: MediaKind, payload: &MediaPayload) -> Option<Self> {
        let id = payload.id.filter(|id| *id > 0)?;
        let common = MediaCommon {
            id,
            title: payload.title.clone(),
            synonyms: payload
                .synonyms
                .iter()
                .flatten()
                .flatten()
                .filter(|s| !s.trim().is_empty())
                .cloned()
                .collect(),
            extra: payload.extra.clone(),
        };

        Some(match kind {
            MediaKind::Anime => MediaDocument::Anime(AnimeDoc {
                common,
                episodes: payload.episodes,
                duration: payload.duration,
                next_airing_episode: payload.next_airing_episode.clone(),
            }),
            MediaKind::Manga => MediaDocument::Manga(MangaDoc {
                common,
                chapters: payload.chapters,
                volumes: payload.volumes,
            }),
        })
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            MediaDocument::Anime(_) => MediaKind::Anime,
            MediaDocument::Manga(_) => MediaKind::Manga,
        }
    }

    pub fn common(&self) -> &MediaCommon {
        match self {
            MediaDocument::Anime(doc) => &doc.common,
            MediaDocument::Manga(doc) => &doc.common,
        }
    }

    pub fn id(&self) -> MediaId {
        self.common().id
    }

    /// Unix seconds of the next known release, if any.
    pub fn next_available_at(&self) -> Option<i64> {
        match self {
            MediaDocument::Anime(doc) => doc.next_airing_episode.as_ref().map(|n| n.airing_at),
            MediaDocument::Manga(_) => None,
        }
    }

    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            MediaDocument::Anime(doc) => serde_json::to_value(doc),
            MediaDocument::Manga(doc) => serde_json::to_value(doc),
        }
    }

    pub fn from_value(kind: MediaKind, value: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match kind {
            MediaKind::Anime => MediaDocument::Anime(serde_json::from_value(value)?),
            MediaKind::Manga => MediaDocument::Manga(serde_json::from_value(value)?),
        })
    }
}
