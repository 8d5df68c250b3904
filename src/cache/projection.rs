//! Read-optimized snapshots of assets.
//!
//! A projection is built either from store rows or from an inflated asset.
//! Apart from an album's membership sets it is never edited after
//! construction: a stale projection is removed and rebuilt on the next read.

use crate::asset::{Album, MediaAsset};
use crate::metadata::{self, MetaItem, MetaName};
use crate::store::{AlbumRow, MediaRow, Repository, StoreError};
use crate::types::{AssetId, GalleryId, MediaKind};
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use std::collections::BTreeMap;

/// One metadata value of a cached media asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaCacheEntry {
    pub media_id: AssetId,
    pub name: MetaName,
    pub value: String,
}

fn meta_entries(media_id: AssetId, items: &[MetaItem]) -> Vec<MetaCacheEntry> {
    items
        .iter()
        .map(|item| MetaCacheEntry {
            media_id,
            name: item.name,
            value: item.value.clone(),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct AlbumCacheEntry {
    pub id: AssetId,
    pub gallery_id: GalleryId,
    pub parent_id: Option<AssetId>,
    pub sequence: i32,
    pub date_added: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
    pub is_private: bool,
    pub title: String,
    pub directory_name: String,
    pub thumbnail_media_id: Option<AssetId>,
    /// Child album ids. Edited in place when a child is added or removed.
    pub child_album_ids: DashSet<AssetId>,
    /// Child media ids. Edited in place when a child is added or removed.
    pub child_media_ids: DashSet<AssetId>,
}

impl AlbumCacheEntry {
    pub fn from_row(
        row: &AlbumRow,
        child_albums: impl IntoIterator<Item = AssetId>,
        child_media: impl IntoIterator<Item = AssetId>,
    ) -> Self {
        Self {
            id: row.header.id,
            gallery_id: row.header.gallery_id,
            parent_id: row.header.parent_id,
            sequence: row.header.sequence,
            date_added: row.header.date_added,
            date_modified: row.header.date_modified,
            is_private: row.header.is_private,
            title: row.title.clone(),
            directory_name: row.directory_name.clone(),
            thumbnail_media_id: row.thumbnail_media_id,
            child_album_ids: child_albums.into_iter().collect(),
            child_media_ids: child_media.into_iter().collect(),
        }
    }

    /// Build from the store. `Ok(None)` when the album does not exist.
    pub fn from_store(store: &dyn Repository, id: AssetId) -> Result<Option<Self>, StoreError> {
        let Some(row) = store.find_album(id)? else {
            return Ok(None);
        };
        let albums = store.child_albums(id)?;
        let media = store.child_media(id)?;
        Ok(Some(Self::from_row(&row, albums, media)))
    }

    pub fn from_album(album: &Album) -> Self {
        Self::from_row(
            &album.to_row(),
            album.child_album_ids.iter().copied(),
            album.child_media_ids.iter().copied(),
        )
    }

    /// Child album ids in ascending order.
    pub fn sorted_child_albums(&self) -> Vec<AssetId> {
        let mut ids: Vec<AssetId> = self.child_album_ids.iter().map(|id| *id).collect();
        ids.sort();
        ids
    }

    /// Child media ids in ascending order.
    pub fn sorted_child_media(&self) -> Vec<AssetId> {
        let mut ids: Vec<AssetId> = self.child_media_ids.iter().map(|id| *id).collect();
        ids.sort();
        ids
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaCacheEntry {
    pub id: AssetId,
    pub gallery_id: GalleryId,
    pub parent_id: Option<AssetId>,
    pub kind: MediaKind,
    pub sequence: i32,
    pub date_added: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
    pub is_private: bool,
    pub title: String,
    pub meta_items: Vec<MetaCacheEntry>,
}

impl MediaCacheEntry {
    pub fn from_row(row: &MediaRow) -> Self {
        Self {
            id: row.header.id,
            gallery_id: row.header.gallery_id,
            parent_id: row.header.parent_id,
            kind: row.kind,
            sequence: row.header.sequence,
            date_added: row.header.date_added,
            date_modified: row.header.date_modified,
            is_private: row.header.is_private,
            title: row.title.clone(),
            meta_items: meta_entries(row.header.id, &row.metadata),
        }
    }

    /// Build from the store, taking the gallery from the parent album.
    pub fn from_store(store: &dyn Repository, id: AssetId) -> Result<Option<Self>, StoreError> {
        let Some(row) = store.find_media(id)? else {
            return Ok(None);
        };
        let mut entry = Self::from_row(&row);
        if let Some(parent) = row.header.parent_id
            && let Some(album) = store.find_album(parent)?
        {
            entry.gallery_id = album.header.gallery_id;
        }
        Ok(Some(entry))
    }

    pub fn from_media(media: &MediaAsset) -> Self {
        Self::from_row(&media.to_row())
    }
}

/// A tag and the media carrying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCacheEntry {
    pub tag: String,
    pub media_ids: Vec<AssetId>,
}

/// Build the tag list of a gallery from the store, ordered by tag.
pub fn build_tags(store: &dyn Repository, gallery: GalleryId) -> Result<Vec<TagCacheEntry>, StoreError> {
    let mut by_tag: BTreeMap<String, Vec<AssetId>> = BTreeMap::new();
    for id in store.media_in_gallery(gallery)? {
        if let Some(row) = store.find_media(id)? {
            for tag in metadata::tags(&row.metadata) {
                by_tag.entry(tag).or_default().push(id);
            }
        }
    }
    Ok(by_tag
        .into_iter()
        .map(|(tag, mut media_ids)| {
            media_ids.sort();
            TagCacheEntry { tag, media_ids }
        })
        .collect())
}
