//! # Media List Provider Contract
//!
//! Transfer types and the client abstraction for the external list-tracking
//! service (a GraphQL API). The query documents and HTTP transport live in the
//! host; the core only sees the decoded shapes below.
//!
//! ## Nullability
//!
//! The upstream schema marks almost everything nullable, including list and
//! entry elements. The DTOs mirror that so placeholder entries can be skipped
//! by the synchronizer instead of failing the whole decode.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric id of a media item on the external service.
pub type MediaId = i64;

// ============================================================================
// Identity Types
// ============================================================================

/// Media kind. Selects document shape, TTL rule and index table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaKind {
    Anime,
    Manga,
}

impl MediaKind {
    /// Both kinds, in the order a full account sync visits them.
    pub const ALL: [MediaKind; 2] = [MediaKind::Anime, MediaKind::Manga];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Anime => "anime",
            MediaKind::Manga => "manga",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anime" => Ok(MediaKind::Anime),
            "manga" => Ok(MediaKind::Manga),
            other => Err(format!("Unknown media kind: {}", other)),
        }
    }
}

/// Account id on the external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalAccountId(i64);

impl ExternalAccountId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ExternalAccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ExternalAccountId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ============================================================================
// Transfer Objects
// ============================================================================

/// The account a token belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub id: i64,
    pub name: String,
}

/// Owner block attached to a list collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOwner {
    pub id: i64,
    pub name: String,
    /// Scoring format and list preferences, passed through untouched.
    #[serde(default)]
    pub media_list_options: Option<serde_json::Value>,
}

/// Every list (Watching, Completed, custom lists...) of one kind for one account.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaListCollection {
    #[serde(default)]
    pub lists: Option<Vec<Option<MediaList>>>,
    #[serde(default)]
    pub user: Option<ListOwner>,
}

impl MediaListCollection {
    /// The collection carries no usable lists (absent owner or no lists).
    pub fn is_empty(&self) -> bool {
        self.user.is_none()
            || self
                .lists
                .as_ref()
                .map_or(true, |lists| lists.iter().all(Option::is_none))
    }

    /// Iterate over present entries across all present lists.
    pub fn entries(&self) -> impl Iterator<Item = &MediaListEntry> {
        self.lists
            .iter()
            .flatten()
            .flatten()
            .filter_map(|list| list.entries.as_ref())
            .flatten()
            .flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaList {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub entries: Option<Vec<Option<MediaListEntry>>>,
}

/// One row of a list: the account's progress against a media item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaListEntry {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Option<i32>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub media: Option<MediaPayload>,
}

impl MediaListEntry {
    /// Media id, if the entry resolves to a real media item.
    pub fn media_id(&self) -> Option<MediaId> {
        self.media.as_ref().and_then(|m| m.id).filter(|id| *id > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaTitle {
    #[serde(default)]
    pub romaji: Option<String>,
    #[serde(default)]
    pub english: Option<String>,
    #[serde(default)]
    pub native: Option<String>,
}

/// Next scheduled release of an airing series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiringSchedule {
    /// Unix timestamp (seconds)
    pub airing_at: i64,
    #[serde(default)]
    pub episode: Option<i32>,
}

/// Media payload as returned inside a list entry.
///
/// Carries the union of anime and manga fields; the library splits it into
/// kind-specific documents. Display fields not modelled here are kept in
/// `extra` so cached documents stay faithful to what the service returned.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPayload {
    #[serde(default)]
    pub id: Option<MediaId>,
    #[serde(default)]
    pub title: Option<MediaTitle>,
    #[serde(default)]
    pub synonyms: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub episodes: Option<i32>,
    #[serde(default)]
    pub duration: Option<i32>,
    #[serde(default)]
    pub next_airing_episode: Option<AiringSchedule>,
    #[serde(default)]
    pub chapters: Option<i32>,
    #[serde(default)]
    pub volumes: Option<i32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Client for the external list-tracking API.
///
/// Implementations own the query documents and transport. They must map a
/// rejected or expired credential to
/// [`BridgeError::Unauthorized`](crate::error::BridgeError::Unauthorized) and
/// every other failure to a different variant, so callers can tell
/// "re-bind your account" apart from "try again later".
#[async_trait]
pub trait MediaListProvider: Send + Sync {
    /// Resolve the account a token belongs to.
    async fn fetch_viewer(&self, token: &str) -> Result<Viewer>;

    /// Fetch every list of `kind` for an account.
    ///
    /// Returns `Ok(None)` when the service answers without a collection.
    async fn fetch_media_collection(
        &self,
        external_id: ExternalAccountId,
        kind: MediaKind,
        token: &str,
    ) -> Result<Option<MediaListCollection>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_media_kind_parsing() {
        assert_eq!("anime".parse::<MediaKind>().unwrap(), MediaKind::Anime);
        assert_eq!("MANGA".parse::<MediaKind>().unwrap(), MediaKind::Manga);
        assert!("novel".parse::<MediaKind>().is_err());
        assert_eq!(MediaKind::Manga.to_string(), "manga");
        assert_eq!(serde_json::to_value(MediaKind::Anime).unwrap(), json!("ANIME"));
    }

    #[test]
    fn test_collection_decodes_with_null_entries() {
        let body = json!({
            "user": { "id": 7, "name": "kaede", "mediaListOptions": { "scoreFormat": "POINT_10" } },
            "lists": [
                null,
                { "name": "Watching", "entries": [
                    null,
                    { "status": "CURRENT", "progress": 3, "score": 8.5, "notes": null,
                      "media": { "id": 10, "title": { "romaji": "Mushishi" }, "siteUrl": "https://example.test/10" } },
                    { "status": "CURRENT", "media": null }
                ] }
            ]
        });

        let collection: MediaListCollection = serde_json::from_value(body).unwrap();
        assert!(!collection.is_empty());

        let entries: Vec<_> = collection.entries().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].media_id(), Some(10));
        assert_eq!(entries[1].media_id(), None);

        let media = entries[0].media.as_ref().unwrap();
        assert_eq!(media.extra.get("siteUrl"), Some(&json!("https://example.test/10")));
    }

    #[test]
    fn test_collection_without_owner_is_empty() {
        let collection = MediaListCollection {
            lists: Some(vec![Some(MediaList::default())]),
            user: None,
        };
        assert!(collection.is_empty());
        assert!(MediaListCollection::default().is_empty());
    }

    #[test]
    fn test_entry_with_zero_media_id_is_unresolvable() {
        let entry = MediaListEntry {
            media: Some(MediaPayload {
                id: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(entry.media_id(), None);
    }
}
