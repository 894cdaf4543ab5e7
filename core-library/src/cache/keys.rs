//! Cache keyspace conventions.

use bridge_traits::{ExternalAccountId, MediaId, MediaKind};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Key of an account's list snapshot for one kind.
pub fn snapshot_key(external_id: ExternalAccountId, kind: MediaKind) -> String {
    format!("user:{}-{}", external_id, kind)
}

/// Key of a media document.
pub fn media_key(kind: MediaKind, media_id: MediaId) -> String {
    format!("media:{}-{}", kind, media_id)
}

/// Key of an alias lookup, or `None` when the title normalizes to nothing.
pub fn alias_key(kind: MediaKind, title: &str) -> Option<String> {
    let normalized = normalize_title(title);
    if normalized.is_empty() {
        return None;
    }
    Some(format!("alias:{}-{}", kind, normalized))
}

/// Case- and diacritic-insensitive form of a title.
///
/// Decomposes (NFKD), drops combining marks, lowercases and keeps only
/// alphanumeric characters, so `"Shingeki no Kyojin"`, `"shingeki-no-kyojin"`
/// and `"Shingéki no Kyōjin"` share one key.
pub fn normalize_title(title: &str) -> String {
    title
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let ext = ExternalAccountId::new(42);
        assert_eq!(snapshot_key(ext, MediaKind::Anime), "user:42-anime");
        assert_eq!(media_key(MediaKind::Manga, 30013), "media:manga-30013");
        assert_eq!(
            alias_key(MediaKind::Anime, "Attack on Titan").as_deref(),
            Some("alias:anime-attackontitan")
        );
    }

    #[test]
    fn test_normalize_title_ignores_case_and_diacritics() {
        let expected = "shingekinokyojin";
        assert_eq!(normalize_title("Shingeki no Kyojin"), expected);
        assert_eq!(normalize_title("shingeki-no-kyojin"), expected);
        assert_eq!(normalize_title("Shingéki no Kyōjin"), expected);
        assert_eq!(normalize_title("ＳＨＩＮＧＥＫＩ no KYOJIN"), expected);
    }

    #[test]
    fn test_normalize_title_keeps_non_latin_scripts() {
        assert_eq!(normalize_title("進撃の巨人"), "進撃の巨人");
    }

    #[test]
    fn test_alias_key_rejects_punctuation_only_titles() {
        assert_eq!(alias_key(MediaKind::Anime, " -- !! "), None);
    }
}
