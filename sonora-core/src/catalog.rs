//! Track catalog and id → storage key resolution.
//!
//! The catalog is a read-only snapshot of track records. Each track's audio
//! file is stored under a key derived from its first artist, album and title,
//! so the key can be recomputed from the record alone.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use deunicode::deunicode_with_tofu;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::StorageKey;

/// Catalog entry for a single track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub album_name: String,
    #[serde(default)]
    pub artists: Vec<String>,
    /// Content type of the stored file, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// A track together with the key its audio file is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTrack {
    pub record: TrackRecord,
    pub key: StorageKey,
}

impl ResolvedTrack {
    /// Name offered to clients as the download filename.
    pub fn display_name(&self) -> &str {
        &self.record.name
    }
}

/// Errors that occur while looking up tracks.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Track {track_id} not found")]
    TrackNotFound { track_id: u64 },

    #[error("Failed to load catalog from {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Maps a track id to its record and storage key.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolves `track_id`.
    ///
    /// # Errors
    ///
    /// - `CatalogError::TrackNotFound` - If no track has this id
    async fn resolve(&self, track_id: u64) -> Result<ResolvedTrack, CatalogError>;
}

/// Turns a display name into the slug used in storage keys.
///
/// Characters are folded to ASCII first, and anything with no ASCII form is
/// dropped. Punctuation is removed without leaving a gap, so `"AC/DC"` becomes
/// `"acdc"` and `"Don't Stop"` becomes `"dont-stop"`. Runs of spaces, `-` and
/// `_` collapse into one `-` and never lead or trail.
pub fn slugify(input: &str) -> String {
    let folded = deunicode_with_tofu(input, "");
    let mut slug = String::with_capacity(folded.len());
    let mut pending_separator = false;

    for c in folded.chars() {
        match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' => {
                if pending_separator && !slug.is_empty() {
                    slug.push('-');
                }
                pending_separator = false;
                slug.push(c.to_ascii_lowercase());
            }
            ' ' | '-' | '_' => pending_separator = true,
            _ => {}
        }
    }

    slug
}

/// Derives the storage key for a track from its first artist, album and name.
///
/// The key is the hex MD5 of `"{artist}_{album}_{name}"` over the slugs, which
/// is the naming already used for files on disk.
pub fn storage_key(record: &TrackRecord) -> StorageKey {
    let artist = record.artists.first().map(String::as_str).unwrap_or("");
    let source = format!(
        "{}_{}_{}",
        slugify(artist),
        slugify(&record.album_name),
        slugify(&record.name)
    );

    StorageKey::new(hex::encode(Md5::digest(source.as_bytes())))
}

/// In-memory catalog of track records keyed by id.
#[derive(Debug, Clone, Default)]
pub struct TrackCatalog {
    tracks: HashMap<u64, TrackRecord>,
}

impl TrackCatalog {
    /// Builds a catalog from records. Later records replace earlier ones with the same id.
    pub fn from_records(records: impl IntoIterator<Item = TrackRecord>) -> Self {
        let tracks = records
            .into_iter()
            .map(|record| (record.id, record))
            .collect();
        Self { tracks }
    }

    /// Loads a catalog from a JSON array of track records.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Io` - If the file cannot be read
    /// - `CatalogError::Load` - If the file is not a valid track list
    pub async fn load(path: &Path) -> Result<Self, CatalogError> {
        let contents = tokio::fs::read(path).await?;
        let records: Vec<TrackRecord> =
            serde_json::from_slice(&contents).map_err(|e| CatalogError::Load {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let catalog = Self::from_records(records);
        info!(
            "Loaded {} tracks from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Finds a track by id.
    pub fn get(&self, track_id: u64) -> Option<&TrackRecord> {
        self.tracks.get(&track_id)
    }

    /// All tracks, ordered by id.
    pub fn tracks(&self) -> Vec<&TrackRecord> {
        let mut tracks: Vec<&TrackRecord> = self.tracks.values().collect();
        tracks.sort_by_key(|track| track.id);
        tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[async_trait]
impl TrackResolver for TrackCatalog {
    async fn resolve(&self, track_id: u64) -> Result<ResolvedTrack, CatalogError> {
        let record = self
            .get(track_id)
            .cloned()
            .ok_or(CatalogError::TrackNotFound { track_id })?;
        let key = storage_key(&record);
        debug!("Track {} resolved to storage key {}", track_id, key);
        Ok(ResolvedTrack { record, key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_track() -> TrackRecord {
        TrackRecord {
            id: 7,
            name: "Back in Black".to_string(),
            album_name: "Back in Black".to_string(),
            artists: vec!["AC/DC".to_string()],
            mime_type: None,
        }
    }

    #[test]
    fn test_slugify_drops_punctuation() {
        assert_eq!(slugify("AC/DC"), "acdc");
        assert_eq!(slugify("Don't Stop"), "dont-stop");
        assert_eq!(slugify("Guns N' Roses"), "guns-n-roses");
        assert_eq!(slugify("  Back in Black! "), "back-in-black");
        assert_eq!(slugify("Live - 1979 -- Remaster"), "live-1979-remaster");
    }

    #[test]
    fn test_slugify_folds_to_ascii() {
        assert_eq!(slugify("Beyoncé"), "beyonce");
        assert_eq!(slugify("Motörhead"), "motorhead");
        assert_eq!(slugify("Déjà Vu"), "deja-vu");
    }

    #[test]
    fn test_slugify_separators() {
        assert_eq!(slugify("under_score__name"), "under-score-name");
        assert_eq!(slugify("_-_ edge _-_"), "edge");
        assert_eq!(slugify("tab\tseparated"), "tabseparated");
        assert_eq!(slugify("---"), "");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn test_storage_key_matches_existing_files() {
        let key = storage_key(&sample_track());
        assert_eq!(key.as_str(), "df82ffdda3b9fb67888f56105d7aa3f9");
        assert!(key.is_plain());

        let track = TrackRecord {
            id: 9,
            name: "Déjà Vu".to_string(),
            album_name: "B'Day".to_string(),
            artists: vec!["Beyoncé".to_string()],
            mime_type: None,
        };
        assert_eq!(storage_key(&track).as_str(), "45884d22228dc7a279d26aed24125747");

        let track = TrackRecord {
            id: 10,
            name: "The Chase Is Better Than the Catch".to_string(),
            album_name: "Ace of Spades".to_string(),
            artists: vec!["Motörhead".to_string()],
            mime_type: None,
        };
        assert_eq!(storage_key(&track).as_str(), "4255852baee409697d2c21f77eea230d");
    }

    #[test]
    fn test_storage_key_ignores_punctuation_and_case() {
        let mut variant = sample_track();
        variant.name = "BACK IN BLACK!!".to_string();
        variant.artists = vec!["ac/dc".to_string(), "Someone Else".to_string()];

        assert_eq!(storage_key(&variant), storage_key(&sample_track()));
    }

    #[test]
    fn test_storage_key_without_artists() {
        let mut track = sample_track();
        track.artists.clear();

        assert_eq!(storage_key(&track).as_str(), "9d4c734a9e9a48dbdf2493e7ce25478d");
    }

    #[tokio::test]
    async fn test_resolve_known_and_unknown_tracks() {
        let catalog = TrackCatalog::from_records(vec![sample_track()]);

        let resolved = catalog.resolve(7).await.unwrap();
        assert_eq!(resolved.display_name(), "Back in Black");
        assert_eq!(resolved.key, storage_key(&sample_track()));

        let missing = catalog.resolve(8).await;
        assert!(matches!(
            missing,
            Err(CatalogError::TrackNotFound { track_id: 8 })
        ));
    }

    #[tokio::test]
    async fn test_load_catalog_from_json() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"[
                {"id": 2, "name": "Thunderstruck", "album_name": "The Razors Edge", "artists": ["AC/DC"], "mime_type": "audio/ogg"},
                {"id": 1, "name": "Hells Bells"}
            ]"#,
        )
        .unwrap();

        let catalog = TrackCatalog::load(&path).await.unwrap();
        assert_eq!(catalog.len(), 2);

        let ids: Vec<u64> = catalog.tracks().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(catalog.get(2).unwrap().mime_type.as_deref(), Some("audio/ogg"));
        assert!(catalog.get(1).unwrap().artists.is_empty());
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_json() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("catalog.json");
        std::fs::write(&path, "{ not a list }").unwrap();

        let result = TrackCatalog::load(&path).await;
        assert!(matches!(result, Err(CatalogError::Load { .. })));
    }
}
