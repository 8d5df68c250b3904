//! Read-optimized projection cache.
//!
//! - **Projections**: compact snapshots of albums, media, metadata and tags
//! - **Controller**: the concurrent maps holding them and the invalidation
//!   operations that keep them coherent with the store

mod controller;
mod projection;

pub use controller::{AssetRef, CacheController, CacheItem, Expiry, Invalidation};
pub use projection::{
    AlbumCacheEntry, MediaCacheEntry, MetaCacheEntry, TagCacheEntry, build_tags,
};
