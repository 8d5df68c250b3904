//! Backing store contract and an in-memory implementation.
//!
//! The engine talks to storage through the narrow [`Repository`] trait:
//! find, save and delete per asset table, plus the few tree queries the
//! lifecycle needs. Saving a row with an unassigned id assigns one.
//!
//! [`MemoryRepository`] keeps rows in memory and can persist a JSON snapshot:
//!
//! ```text
//! {
//!   "version": 1,
//!   "next_id": 7,
//!   "albums": { "1": { ...AlbumRow } },
//!   "media":  { "4": { ...MediaRow } }
//! }
//! ```

use crate::metadata::MetaItem;
use crate::types::{AssetId, GalleryId, MediaKind, MimeCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Version of the snapshot format.
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported snapshot version {found}")]
    Version { found: u32 },
    #[error("{kind} {id} does not exist")]
    NotFound { kind: &'static str, id: AssetId },
}

/// Audit and ordering fields shared by every row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderRow {
    pub id: AssetId,
    pub parent_id: Option<AssetId>,
    pub gallery_id: GalleryId,
    pub sequence: i32,
    pub is_private: bool,
    pub is_writable: bool,
    pub created_by: String,
    pub date_added: DateTime<Utc>,
    pub last_modified_by: String,
    pub date_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumRow {
    pub header: HeaderRow,
    /// Directory name below the parent album's directory. Empty for a root
    /// album, which maps to the media root.
    pub directory_name: String,
    pub title: String,
    pub summary: String,
    pub thumbnail_media_id: Option<AssetId>,
}

/// Persisted part of a derivative record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivativeRow {
    pub file_name: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub file_size_kb: u64,
    pub mime: Option<MimeCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRow {
    pub header: HeaderRow,
    pub kind: MediaKind,
    pub title: String,
    pub original: DerivativeRow,
    pub thumbnail: DerivativeRow,
    pub optimized: DerivativeRow,
    pub external_html: Option<String>,
    pub metadata: Vec<MetaItem>,
}

/// Storage repository consumed by the asset lifecycle.
pub trait Repository: Send + Sync {
    fn find_album(&self, id: AssetId) -> Result<Option<AlbumRow>, StoreError>;
    fn find_media(&self, id: AssetId) -> Result<Option<MediaRow>, StoreError>;

    /// Insert or update. An unassigned id is replaced with a new one.
    fn save_album(&self, row: &mut AlbumRow) -> Result<(), StoreError>;
    fn save_media(&self, row: &mut MediaRow) -> Result<(), StoreError>;

    fn delete_album(&self, id: AssetId) -> Result<(), StoreError>;
    fn delete_media(&self, id: AssetId) -> Result<(), StoreError>;

    /// Child album ids ordered by sequence, then id.
    fn child_albums(&self, parent: AssetId) -> Result<Vec<AssetId>, StoreError>;
    /// Media ids of an album ordered by sequence, then id.
    fn child_media(&self, album: AssetId) -> Result<Vec<AssetId>, StoreError>;
    /// The album without a parent in `gallery`.
    fn root_album(&self, gallery: GalleryId) -> Result<Option<AssetId>, StoreError>;
    /// Every media id of a gallery. Media belong to the gallery of their
    /// parent album.
    fn media_in_gallery(&self, gallery: GalleryId) -> Result<Vec<AssetId>, StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    next_id: i64,
    albums: BTreeMap<i64, AlbumRow>,
    media: BTreeMap<i64, MediaRow>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            next_id: 1,
            albums: BTreeMap::new(),
            media: BTreeMap::new(),
        }
    }
}

impl Snapshot {
    fn assign_id(&mut self, id: &mut AssetId) {
        if id.is_unassigned() {
            *id = AssetId(self.next_id);
            self.next_id += 1;
        }
    }
}

/// Thread-safe in-memory repository.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: RwLock<Snapshot>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot. A missing file yields an empty repository.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::Version {
                found: snapshot.version,
            });
        }
        Ok(Self {
            state: RwLock::new(snapshot),
        })
    }

    /// Write a snapshot of the current rows.
    pub fn save_to(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&*self.read())?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn album_count(&self) -> usize {
        self.read().albums.len()
    }

    pub fn media_count(&self) -> usize {
        self.read().media.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Snapshot> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn ordered<'a>(rows: impl Iterator<Item = &'a HeaderRow>) -> Vec<AssetId> {
    let mut headers: Vec<&HeaderRow> = rows.collect();
    headers.sort_by_key(|h| (h.sequence, h.id));
    headers.into_iter().map(|h| h.id).collect()
}

impl Repository for MemoryRepository {
    fn find_album(&self, id: AssetId) -> Result<Option<AlbumRow>, StoreError> {
        Ok(self.read().albums.get(&id.0).cloned())
    }

    fn find_media(&self, id: AssetId) -> Result<Option<MediaRow>, StoreError> {
        Ok(self.read().media.get(&id.0).cloned())
    }

    fn save_album(&self, row: &mut AlbumRow) -> Result<(), StoreError> {
        let mut state = self.write();
        state.assign_id(&mut row.header.id);
        state.albums.insert(row.header.id.0, row.clone());
        Ok(())
    }

    fn save_media(&self, row: &mut MediaRow) -> Result<(), StoreError> {
        let mut state = self.write();
        state.assign_id(&mut row.header.id);
        state.media.insert(row.header.id.0, row.clone());
        Ok(())
    }

    fn delete_album(&self, id: AssetId) -> Result<(), StoreError> {
        self.write()
            .albums
            .remove(&id.0)
            .map(|_| ())
            .ok_or(StoreError::NotFound { kind: "album", id })
    }

    fn delete_media(&self, id: AssetId) -> Result<(), StoreError> {
        self.write()
            .media
            .remove(&id.0)
            .map(|_| ())
            .ok_or(StoreError::NotFound { kind: "media", id })
    }

    fn child_albums(&self, parent: AssetId) -> Result<Vec<AssetId>, StoreError> {
        let state = self.read();
        Ok(ordered(
            state
                .albums
                .values()
                .map(|a| &a.header)
                .filter(|h| h.parent_id == Some(parent)),
        ))
    }

    fn child_media(&self, album: AssetId) -> Result<Vec<AssetId>, StoreError> {
        let state = self.read();
        Ok(ordered(
            state
                .media
                .values()
                .map(|m| &m.header)
                .filter(|h| h.parent_id == Some(album)),
        ))
    }

    fn root_album(&self, gallery: GalleryId) -> Result<Option<AssetId>, StoreError> {
        Ok(self
            .read()
            .albums
            .values()
            .find(|a| a.header.parent_id.is_none() && a.header.gallery_id == gallery)
            .map(|a| a.header.id))
    }

    fn media_in_gallery(&self, gallery: GalleryId) -> Result<Vec<AssetId>, StoreError> {
        let state = self.read();
        Ok(state
            .media
            .values()
            .filter(|m| {
                m.header
                    .parent_id
                    .and_then(|p| state.albums.get(&p.0))
                    .map_or(m.header.gallery_id, |a| a.header.gallery_id)
                    == gallery
            })
            .map(|m| m.header.id)
            .collect())
    }
}
