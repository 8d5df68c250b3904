//! The cache service injected into asset behaviors.
//!
//! Projections live in concurrent maps, one per projection kind, created on
//! first use. Invalidation is expressed as named operations:
//!
//! | Operation | Effect |
//! |---|---|
//! | [`evict`](CacheController::evict) | drop one projection |
//! | [`evict_membership`](CacheController::evict_membership) | drop one child id from a parent's membership set |
//! | [`evict_all`](CacheController::evict_all) | clear one map |
//! | [`purge_asset`](CacheController::purge_asset) | `evict` + clear inflated albums + clear tags |
//! | [`purge_cache`](CacheController::purge_cache) | clear everything, settings included |
//!
//! Moving or deleting a child needs both `evict` of the child and
//! `evict_membership` on its parent; neither implies the other.
//!
//! With [`CacheController::with_journal`] every invalidation is also
//! appended to a journal, so callers can assert the exact invalidation set
//! of an operation.

use super::projection::{AlbumCacheEntry, MediaCacheEntry, TagCacheEntry, build_tags};
use crate::asset::Album;
use crate::config::{ConfigError, GallerySettings, SettingsProvider};
use crate::store::{Repository, StoreError};
use crate::types::{AssetId, GalleryId};
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

/// How long a cached projection stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    #[default]
    Never,
    After(Duration),
}

/// The projection maps owned by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheItem {
    Albums,
    MediaAssets,
    InflatedAlbums,
    Tags,
    GallerySettings,
}

/// An asset addressed by kind and id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetRef {
    Album(AssetId),
    Media(AssetId),
}

/// A recorded invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    Evict(AssetRef),
    EvictMembership { parent: AssetId, child: AssetRef },
    EvictAll(CacheItem),
    PurgeAll,
}

struct Timed<T> {
    value: Arc<T>,
    inserted: Instant,
}

impl<T> Timed<T> {
    fn new(value: Arc<T>) -> Self {
        Self {
            value,
            inserted: Instant::now(),
        }
    }
}

/// A lazily-created map with expiry.
struct Map<K: Eq + Hash, V> {
    inner: OnceLock<DashMap<K, Timed<V>>>,
}

impl<K: Eq + Hash + Copy, V> Map<K, V> {
    const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    fn map(&self) -> &DashMap<K, Timed<V>> {
        self.inner.get_or_init(DashMap::new)
    }

    fn get(&self, key: K, expiry: Expiry) -> Option<Arc<V>> {
        let map = self.inner.get()?;
        let entry = map.get(&key)?;
        let expired = match expiry {
            Expiry::Never => false,
            Expiry::After(ttl) => entry.inserted.elapsed() > ttl,
        };
        if expired {
            drop(entry);
            map.remove(&key);
            return None;
        }
        Some(entry.value.clone())
    }

    fn insert(&self, key: K, value: Arc<V>) {
        self.map().insert(key, Timed::new(value));
    }

    fn remove(&self, key: K) {
        if let Some(map) = self.inner.get() {
            map.remove(&key);
        }
    }

    fn clear(&self) {
        if let Some(map) = self.inner.get() {
            map.clear();
        }
    }

    fn len(&self) -> usize {
        self.inner.get().map(DashMap::len).unwrap_or(0)
    }
}

/// Process-wide projection cache.
pub struct CacheController {
    expiry: Expiry,
    albums: Map<AssetId, AlbumCacheEntry>,
    media: Map<AssetId, MediaCacheEntry>,
    inflated_albums: Map<AssetId, Album>,
    tags: Map<GalleryId, Vec<TagCacheEntry>>,
    gallery_settings: Map<GalleryId, GallerySettings>,
    journal: Option<Mutex<Vec<Invalidation>>>,
}

impl Default for CacheController {
    fn default() -> Self {
        Self::new(Expiry::Never)
    }
}

impl CacheController {
    pub fn new(expiry: Expiry) -> Self {
        Self {
            expiry,
            albums: Map::new(),
            media: Map::new(),
            inflated_albums: Map::new(),
            tags: Map::new(),
            gallery_settings: Map::new(),
            journal: None,
        }
    }

    /// A controller that records every invalidation.
    pub fn with_journal(expiry: Expiry) -> Self {
        Self {
            journal: Some(Mutex::new(Vec::new())),
            ..Self::new(expiry)
        }
    }

    fn note(&self, invalidation: Invalidation) {
        tracing::debug!(?invalidation, "cache invalidation");
        if let Some(journal) = &self.journal {
            journal
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(invalidation);
        }
    }

    /// Invalidations recorded so far (empty without a journal).
    pub fn invalidations(&self) -> Vec<Invalidation> {
        self.journal
            .as_ref()
            .map(|j| j.lock().unwrap_or_else(|e| e.into_inner()).clone())
            .unwrap_or_default()
    }

    /// Drain the journal.
    pub fn take_invalidations(&self) -> Vec<Invalidation> {
        self.journal
            .as_ref()
            .map(|j| std::mem::take(&mut *j.lock().unwrap_or_else(|e| e.into_inner())))
            .unwrap_or_default()
    }

    // =========================================================================
    // Get / add / remove
    // =========================================================================

    pub fn get_album(&self, id: AssetId) -> Option<Arc<AlbumCacheEntry>> {
        self.albums.get(id, self.expiry)
    }

    pub fn add_album(&self, entry: AlbumCacheEntry) -> Arc<AlbumCacheEntry> {
        let entry = Arc::new(entry);
        self.albums.insert(entry.id, entry.clone());
        entry
    }

    pub fn get_media_asset(&self, id: AssetId) -> Option<Arc<MediaCacheEntry>> {
        self.media.get(id, self.expiry)
    }

    pub fn add_media_asset(&self, entry: MediaCacheEntry) -> Arc<MediaCacheEntry> {
        let entry = Arc::new(entry);
        self.media.insert(entry.id, entry.clone());
        entry
    }

    pub fn get_inflated_album(&self, id: AssetId) -> Option<Arc<Album>> {
        self.inflated_albums.get(id, self.expiry)
    }

    pub fn add_inflated_album(&self, album: Album) {
        let id = album.header.id;
        self.inflated_albums.insert(id, Arc::new(album));
    }

    pub fn get_tags(&self, gallery: GalleryId) -> Option<Arc<Vec<TagCacheEntry>>> {
        self.tags.get(gallery, self.expiry)
    }

    pub fn add_tags(&self, gallery: GalleryId, tags: Vec<TagCacheEntry>) -> Arc<Vec<TagCacheEntry>> {
        let tags = Arc::new(tags);
        self.tags.insert(gallery, tags.clone());
        tags
    }

    /// Number of entries currently held in a map.
    pub fn len(&self, item: CacheItem) -> usize {
        match item {
            CacheItem::Albums => self.albums.len(),
            CacheItem::MediaAssets => self.media.len(),
            CacheItem::InflatedAlbums => self.inflated_albums.len(),
            CacheItem::Tags => self.tags.len(),
            CacheItem::GallerySettings => self.gallery_settings.len(),
        }
    }

    // =========================================================================
    // Read-through loaders
    // =========================================================================

    /// Cached album projection, built from the store on a miss.
    pub fn load_album(
        &self,
        store: &dyn Repository,
        id: AssetId,
    ) -> Result<Option<Arc<AlbumCacheEntry>>, StoreError> {
        if let Some(entry) = self.get_album(id) {
            return Ok(Some(entry));
        }
        Ok(AlbumCacheEntry::from_store(store, id)?.map(|entry| self.add_album(entry)))
    }

    /// Cached media projection, built from the store on a miss.
    pub fn load_media_asset(
        &self,
        store: &dyn Repository,
        id: AssetId,
    ) -> Result<Option<Arc<MediaCacheEntry>>, StoreError> {
        if let Some(entry) = self.get_media_asset(id) {
            return Ok(Some(entry));
        }
        Ok(MediaCacheEntry::from_store(store, id)?.map(|entry| self.add_media_asset(entry)))
    }

    /// Cached tag list of a gallery, built from the store on a miss.
    pub fn load_tags(
        &self,
        store: &dyn Repository,
        gallery: GalleryId,
    ) -> Result<Arc<Vec<TagCacheEntry>>, StoreError> {
        if let Some(tags) = self.get_tags(gallery) {
            return Ok(tags);
        }
        Ok(self.add_tags(gallery, build_tags(store, gallery)?))
    }

    /// Cached settings of a gallery, loaded through `provider` on a miss.
    pub fn gallery_settings(
        &self,
        provider: &dyn SettingsProvider,
        gallery: GalleryId,
    ) -> Result<Arc<GallerySettings>, ConfigError> {
        if let Some(settings) = self.gallery_settings.get(gallery, self.expiry) {
            return Ok(settings);
        }
        let settings = Arc::new(provider.load_settings(gallery)?);
        self.gallery_settings.insert(gallery, settings.clone());
        Ok(settings)
    }

    // =========================================================================
    // Membership sets
    // =========================================================================
    //
    // These edit the parent's set in place and never rebuild the parent. An
    // uncached parent is left alone: its next build reads the store.

    pub fn add_album_id_to_album_cache_item(&self, album_id: AssetId, parent_id: AssetId) {
        if let Some(parent) = self.get_album(parent_id) {
            parent.child_album_ids.insert(album_id);
        }
    }

    pub fn remove_album_id_from_parent_album_cache_item(&self, album_id: AssetId, parent_id: AssetId) {
        self.evict_membership(parent_id, AssetRef::Album(album_id));
    }

    pub fn add_media_asset_id_to_album_cache_item(&self, media_id: AssetId, album_id: AssetId) {
        if let Some(parent) = self.get_album(album_id) {
            parent.child_media_ids.insert(media_id);
        }
    }

    pub fn remove_media_asset_id_from_parent_album_cache_item(&self, media_id: AssetId, album_id: AssetId) {
        self.evict_membership(album_id, AssetRef::Media(media_id));
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    /// Drop one asset's projection.
    pub fn evict(&self, asset: AssetRef) {
        match asset {
            AssetRef::Album(id) => {
                self.albums.remove(id);
                self.inflated_albums.remove(id);
            }
            AssetRef::Media(id) => self.media.remove(id),
        }
        self.note(Invalidation::Evict(asset));
    }

    /// Remove one child id from a parent's membership set.
    pub fn evict_membership(&self, parent: AssetId, child: AssetRef) {
        if let Some(entry) = self.get_album(parent) {
            match child {
                AssetRef::Album(id) => entry.child_album_ids.remove(&id),
                AssetRef::Media(id) => entry.child_media_ids.remove(&id),
            };
        }
        self.note(Invalidation::EvictMembership { parent, child });
    }

    /// Clear one projection map.
    pub fn evict_all(&self, item: CacheItem) {
        match item {
            CacheItem::Albums => self.albums.clear(),
            CacheItem::MediaAssets => self.media.clear(),
            CacheItem::InflatedAlbums => self.inflated_albums.clear(),
            CacheItem::Tags => self.tags.clear(),
            CacheItem::GallerySettings => self.gallery_settings.clear(),
        }
        self.note(Invalidation::EvictAll(item));
    }

    /// Remove one asset's projection, plus the whole inflated-album and tag
    /// maps, which any membership change may invalidate.
    pub fn purge_asset(&self, asset: AssetRef) {
        self.evict(asset);
        self.evict_all(CacheItem::InflatedAlbums);
        self.evict_all(CacheItem::Tags);
    }

    /// Full flush, used after structural configuration changes.
    pub fn purge_cache(&self) {
        self.albums.clear();
        self.media.clear();
        self.inflated_albums.clear();
        self.tags.clear();
        self.gallery_settings.clear();
        self.note(Invalidation::PurgeAll);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticSettingsProvider;
    use crate::store::{AlbumRow, HeaderRow, MemoryRepository};
    use chrono::Utc;

    fn album_entry(id: i64) -> AlbumCacheEntry {
        let now = Utc::now();
        let row = AlbumRow {
            header: HeaderRow {
                id: AssetId(id),
                parent_id: None,
                gallery_id: GalleryId(1),
                sequence: 0,
                is_private: false,
                is_writable: true,
                created_by: "t".into(),
                date_added: now,
                last_modified_by: "t".into(),
                date_modified: now,
            },
            directory_name: String::new(),
            title: "Root".into(),
            summary: String::new(),
            thumbnail_media_id: None,
        };
        AlbumCacheEntry::from_row(&row, [AssetId(10)], [AssetId(20)])
    }

    fn media_entry(id: i64) -> MediaCacheEntry {
        let now = Utc::now();
        MediaCacheEntry {
            id: AssetId(id),
            gallery_id: GalleryId(1),
            parent_id: Some(AssetId(1)),
            kind: crate::types::MediaKind::Image,
            sequence: 0,
            date_added: now,
            date_modified: now,
            is_private: false,
            title: "photo".into(),
            meta_items: Vec::new(),
        }
    }

    // =========================================================================
    // Maps
    // =========================================================================

    #[test]
    fn maps_are_created_lazily() {
        let cache = CacheController::default();
        assert_eq!(cache.len(CacheItem::Albums), 0);
        assert!(cache.get_album(AssetId(1)).is_none());
        cache.add_album(album_entry(1));
        assert_eq!(cache.len(CacheItem::Albums), 1);
    }

    #[test]
    fn expired_entries_are_dropped_on_read() {
        let cache = CacheController::new(Expiry::After(Duration::ZERO));
        cache.add_media_asset(media_entry(5));
        std::thread::sleep(Duration::from_millis(2));
        assert!(cache.get_media_asset(AssetId(5)).is_none());
        assert_eq!(cache.len(CacheItem::MediaAssets), 0);
    }

    #[test]
    fn load_album_builds_from_store_once() {
        let repo = MemoryRepository::new();
        let cache = CacheController::default();
        assert!(cache.load_album(&repo, AssetId(1)).unwrap().is_none());

        let mut row = AlbumRow {
            directory_name: String::new(),
            title: "Root".into(),
            summary: String::new(),
            thumbnail_media_id: None,
            header: album_entry_header(),
        };
        repo.save_album(&mut row).unwrap();
        let first = cache.load_album(&repo, row.header.id).unwrap().unwrap();
        let second = cache.load_album(&repo, row.header.id).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    fn album_entry_header() -> HeaderRow {
        let now = Utc::now();
        HeaderRow {
            id: AssetId::UNASSIGNED,
            parent_id: None,
            gallery_id: GalleryId(1),
            sequence: 0,
            is_private: false,
            is_writable: true,
            created_by: "t".into(),
            date_added: now,
            last_modified_by: "t".into(),
            date_modified: now,
        }
    }

    #[test]
    fn gallery_settings_are_cached_until_full_purge() {
        let cache = CacheController::default();
        let provider = StaticSettingsProvider(GallerySettings::default());
        let a = cache.gallery_settings(&provider, GalleryId(1)).unwrap();
        let b = cache.gallery_settings(&provider, GalleryId(1)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        cache.purge_asset(AssetRef::Media(AssetId(1)));
        assert_eq!(cache.len(CacheItem::GallerySettings), 1);

        cache.purge_cache();
        assert_eq!(cache.len(CacheItem::GallerySettings), 0);
    }

    // =========================================================================
    // Membership
    // =========================================================================

    #[test]
    fn add_then_remove_album_membership_is_symmetric() {
        let cache = CacheController::default();
        cache.add_album(album_entry(1));

        for prior in [true, false] {
            if prior {
                cache.add_album_id_to_album_cache_item(AssetId(30), AssetId(1));
            }
            cache.add_album_id_to_album_cache_item(AssetId(30), AssetId(1));
            cache.remove_album_id_from_parent_album_cache_item(AssetId(30), AssetId(1));
            let parent = cache.get_album(AssetId(1)).unwrap();
            assert!(!parent.child_album_ids.contains(&AssetId(30)));
            assert!(parent.child_album_ids.contains(&AssetId(10)));
        }
    }

    #[test]
    fn media_membership_edits_in_place() {
        let cache = CacheController::default();
        let before = cache.add_album(album_entry(1));
        cache.add_media_asset_id_to_album_cache_item(AssetId(21), AssetId(1));
        cache.remove_media_asset_id_from_parent_album_cache_item(AssetId(20), AssetId(1));

        let after = cache.get_album(AssetId(1)).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.sorted_child_media(), vec![AssetId(21)]);
    }

    #[test]
    fn membership_edit_on_uncached_parent_is_noop() {
        let cache = CacheController::default();
        cache.add_media_asset_id_to_album_cache_item(AssetId(21), AssetId(99));
        assert!(cache.get_album(AssetId(99)).is_none());
    }

    #[test]
    fn evicting_child_leaves_parent_membership() {
        let cache = CacheController::default();
        cache.add_album(album_entry(1));
        cache.add_media_asset(media_entry(20));

        cache.evict(AssetRef::Media(AssetId(20)));

        assert!(cache.get_media_asset(AssetId(20)).is_none());
        assert!(cache.get_album(AssetId(1)).unwrap().child_media_ids.contains(&AssetId(20)));
    }

    // =========================================================================
    // Purge
    // =========================================================================

    #[test]
    fn purge_asset_drops_projection_tags_and_inflated_albums() {
        let cache = CacheController::with_journal(Expiry::Never);
        cache.add_album(album_entry(1));
        cache.add_media_asset(media_entry(20));
        cache.add_media_asset(media_entry(21));
        cache.add_tags(GalleryId(1), vec![TagCacheEntry {
            tag: "rome".into(),
            media_ids: vec![AssetId(20)],
        }]);

        cache.purge_asset(AssetRef::Media(AssetId(20)));

        assert!(cache.get_media_asset(AssetId(20)).is_none());
        assert!(cache.get_media_asset(AssetId(21)).is_some());
        assert!(cache.get_album(AssetId(1)).is_some());
        assert_eq!(cache.len(CacheItem::Tags), 0);
        assert_eq!(cache.len(CacheItem::InflatedAlbums), 0);
        assert_eq!(
            cache.invalidations(),
            vec![
                Invalidation::Evict(AssetRef::Media(AssetId(20))),
                Invalidation::EvictAll(CacheItem::InflatedAlbums),
                Invalidation::EvictAll(CacheItem::Tags),
            ]
        );
    }

    #[test]
    fn purge_cache_clears_every_map() {
        let cache = CacheController::with_journal(Expiry::Never);
        cache.add_album(album_entry(1));
        cache.add_media_asset(media_entry(20));
        cache.add_tags(GalleryId(1), Vec::new());

        cache.purge_cache();

        for item in [
            CacheItem::Albums,
            CacheItem::MediaAssets,
            CacheItem::InflatedAlbums,
            CacheItem::Tags,
            CacheItem::GallerySettings,
        ] {
            assert_eq!(cache.len(item), 0, "{item:?}");
        }
        assert_eq!(cache.take_invalidations(), vec![Invalidation::PurgeAll]);
        assert!(cache.invalidations().is_empty());
    }
}
