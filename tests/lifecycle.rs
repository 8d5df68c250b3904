//! End-to-end tests of the asset lifecycle through the public API.
//!
//! Every test builds its own gallery: a media root inside a temp directory,
//! an in-memory store, fixed settings and the pure-Rust image backend.

use gallery_engine::asset::{Album, MediaAsset};
use gallery_engine::cache::{AssetRef, CacheController, CacheItem, Expiry, Invalidation};
use gallery_engine::config::{GallerySettings, StaticSettingsProvider};
use gallery_engine::context::GalleryContext;
use gallery_engine::derivative::{GenerationEnv, GenerationOutcome};
use gallery_engine::events::{EventContext, MemoryRecorder};
use gallery_engine::imaging::{RustBackend, calculate_scaled_dimensions};
use gallery_engine::store::{MemoryRepository, Repository};
use gallery_engine::sync::{SynchronizationGuard, Synchronizer};
use gallery_engine::types::{DerivativeType, GalleryId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    _tmp: TempDir,
    media_root: PathBuf,
    store: Arc<MemoryRepository>,
    cache: Arc<CacheController>,
    ctx: GalleryContext,
}

fn fixture() -> Fixture {
    fixture_with(|_| {})
}

fn fixture_with(configure: impl FnOnce(&mut GallerySettings)) -> Fixture {
    let tmp = TempDir::new().unwrap();
    let media_root = tmp.path().join("media");
    std::fs::create_dir_all(&media_root).unwrap();
    let mut settings = GallerySettings::default();
    settings.paths.media_root = media_root.clone();
    settings.paths.resources_path = tmp.path().join("resources");
    configure(&mut settings);

    let store = Arc::new(MemoryRepository::new());
    let cache = Arc::new(CacheController::with_journal(Expiry::Never));
    let ctx = GalleryContext::new(
        store.clone(),
        Arc::new(StaticSettingsProvider(settings)),
        Arc::new(RustBackend::new()),
    )
    .with_cache(cache.clone())
    .with_recorder(Arc::new(MemoryRecorder::new()));

    Fixture {
        _tmp: tmp,
        media_root,
        store,
        cache,
        ctx,
    }
}

fn write_jpeg(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 64])
    });
    img.save_with_format(path, image::ImageFormat::Jpeg).unwrap();
}

fn saved_root(f: &Fixture, gallery: GalleryId) -> Album {
    let mut root = Album::new_root(&f.ctx, gallery, "Root").unwrap();
    root.save(&f.ctx).unwrap();
    root
}

fn add_photo(f: &Fixture, album: &mut Album, name: &str) -> MediaAsset {
    let path = album.full_path().join(name);
    write_jpeg(&path, 64, 48);
    album.add_media_from_file(&f.ctx, &path).unwrap()
}

// =============================================================================
// Delete
// =============================================================================

#[test]
fn deleting_root_keeps_its_record_but_removes_children() {
    let f = fixture();
    let mut root = saved_root(&f, GalleryId(1));
    add_photo(&f, &mut root, "001-a.jpg");
    let mut trip = root.add_child_album(&f.ctx, "Trip").unwrap();
    add_photo(&f, &mut trip, "001-b.jpg");
    let trip_dir = trip.full_path().to_path_buf();

    let mut root = Album::load(&f.ctx, root.header.id).unwrap();
    root.delete(&f.ctx, true).unwrap();

    assert_eq!(f.store.root_album(GalleryId(1)).unwrap(), Some(root.header.id));
    assert_eq!(f.store.album_count(), 1);
    assert_eq!(f.store.media_count(), 0);
    assert!(f.store.child_albums(root.header.id).unwrap().is_empty());
    assert!(!trip_dir.exists());
    assert!(f.media_root.is_dir());
    assert!(Album::load(&f.ctx, root.header.id).unwrap().thumbnail_media_id.is_none());
}

#[test]
fn deleting_album_keeping_originals_removes_only_derivatives() {
    let f = fixture_with(|s| s.paths.thumbnail_root = Some(s.paths.media_root.with_file_name("thumbs")));
    let mut root = saved_root(&f, GalleryId(1));
    let mut trip = root.add_child_album(&f.ctx, "Trip").unwrap();
    let photo = add_photo(&f, &mut trip, "001-b.jpg");
    let thumb = photo.thumbnail.physical_path().unwrap().to_path_buf();
    assert!(thumb.starts_with(f.media_root.with_file_name("thumbs")));

    let mut trip = Album::load(&f.ctx, trip.header.id).unwrap();
    trip.delete(&f.ctx, false).unwrap();

    assert!(photo.original.physical_path().unwrap().exists());
    assert!(!thumb.exists());
    assert_eq!(f.store.media_count(), 0);
}

// =============================================================================
// Gallery reassignment
// =============================================================================

#[test]
fn moving_root_to_another_gallery_cascades_to_descendants() {
    let f = fixture();
    let mut root = saved_root(&f, GalleryId(1));
    let mut a = root.add_child_album(&f.ctx, "A").unwrap();
    let mut b = a.add_child_album(&f.ctx, "B").unwrap();
    root.add_child_album(&f.ctx, "C").unwrap();
    let photo = add_photo(&f, &mut b, "001-deep.jpg");

    let mut root = Album::load(&f.ctx, root.header.id).unwrap();
    root.header.gallery_id = GalleryId(2);
    root.save(&f.ctx).unwrap();

    let mut descendants = 0;
    let mut pending = f.store.child_albums(root.header.id).unwrap();
    while let Some(id) = pending.pop() {
        let row = f.store.find_album(id).unwrap().unwrap();
        assert_eq!(row.header.gallery_id, GalleryId(2), "album {id}");
        descendants += 1;
        pending.extend(f.store.child_albums(id).unwrap());
    }
    assert_eq!(descendants, 3);
    assert_eq!(f.store.root_album(GalleryId(2)).unwrap(), Some(root.header.id));
    assert_eq!(f.store.media_in_gallery(GalleryId(2)).unwrap(), vec![photo.header.id]);
    assert!(f.store.media_in_gallery(GalleryId(1)).unwrap().is_empty());

    let reloaded = MediaAsset::load(&f.ctx, photo.header.id).unwrap();
    assert_eq!(reloaded.header.gallery_id, GalleryId(2));
}

// =============================================================================
// Cache coherence
// =============================================================================

#[test]
fn purge_cache_empties_every_map() {
    let f = fixture();
    let mut root = saved_root(&f, GalleryId(1));
    let photo = add_photo(&f, &mut root, "001-a.jpg");
    f.cache.load_album(f.store.as_ref(), root.header.id).unwrap();
    f.cache.load_media_asset(f.store.as_ref(), photo.header.id).unwrap();
    f.cache.load_tags(f.store.as_ref(), GalleryId(1)).unwrap();
    Album::load(&f.ctx, root.header.id).unwrap();

    f.cache.purge_cache();

    for item in [
        CacheItem::Albums,
        CacheItem::MediaAssets,
        CacheItem::InflatedAlbums,
        CacheItem::Tags,
        CacheItem::GallerySettings,
    ] {
        assert_eq!(f.cache.len(item), 0, "{item:?}");
    }
    assert_eq!(f.cache.invalidations().last(), Some(&Invalidation::PurgeAll));
}

#[test]
fn membership_sets_follow_adds_and_deletes() {
    let f = fixture();
    let mut root = saved_root(&f, GalleryId(1));
    // The first photo becomes the album thumbnail, which rewrites the album.
    add_photo(&f, &mut root, "001-cover.jpg");
    let entry = f.cache.load_album(f.store.as_ref(), root.header.id).unwrap().unwrap();

    let mut photo = add_photo(&f, &mut root, "002-a.jpg");
    let child = root.add_child_album(&f.ctx, "Trip").unwrap();

    // Edited in place: the entry handed out before the adds sees them.
    assert!(entry.child_media_ids.contains(&photo.header.id));
    assert!(entry.child_album_ids.contains(&child.header.id));

    f.cache.take_invalidations();
    photo.delete(&f.ctx, true).unwrap();

    assert!(!entry.child_media_ids.contains(&photo.header.id));
    let journal = f.cache.invalidations();
    assert!(journal.contains(&Invalidation::Evict(AssetRef::Media(photo.header.id))));
    assert!(journal.contains(&Invalidation::EvictMembership {
        parent: root.header.id,
        child: AssetRef::Media(photo.header.id),
    }));

    let fresh = f.cache.load_album(f.store.as_ref(), root.header.id).unwrap().unwrap();
    assert_eq!(fresh.sorted_child_media(), f.store.child_media(root.header.id).unwrap());
    assert_eq!(fresh.sorted_child_albums(), f.store.child_albums(root.header.id).unwrap());
}

// =============================================================================
// Derivatives
// =============================================================================

#[test]
fn generate_and_save_is_idempotent() {
    let f = fixture();
    let mut root = saved_root(&f, GalleryId(1));
    let path = root.full_path().join("001-big.jpg");
    write_jpeg(&path, 800, 600);
    let mut photo = root.add_media_from_file(&f.ctx, &path).unwrap();

    let settings = f.ctx.gallery_settings(GalleryId(1)).unwrap();
    let env = GenerationEnv::new(&f.ctx, &settings, EventContext::gallery(GalleryId(1)));
    for derivative in DerivativeType::ALL {
        assert_eq!(
            photo.generate(derivative, &env).unwrap(),
            GenerationOutcome::Unchanged,
            "{derivative}"
        );
    }

    let thumb = photo.thumbnail.physical_path().unwrap().to_path_buf();
    std::fs::remove_file(&thumb).unwrap();
    assert_eq!(
        photo.generate(DerivativeType::Thumbnail, &env).unwrap(),
        GenerationOutcome::Generated
    );
    assert_eq!(
        photo.generate(DerivativeType::Thumbnail, &env).unwrap(),
        GenerationOutcome::Unchanged
    );
    assert!(thumb.exists());
}

#[test]
fn scaling_clamps_thin_images_to_one_pixel() {
    assert_eq!(calculate_scaled_dimensions((4000, 3000), 200), (200, 150));
    assert_eq!(calculate_scaled_dimensions((100, 4000), 200), (5, 200));
    assert_eq!(calculate_scaled_dimensions((10, 8000), 200), (1, 200));
}

#[cfg(unix)]
#[test]
fn encoder_timeout_leaves_no_destination() {
    use gallery_engine::encoder::{EncoderInvocation, EncoderRunner};
    use std::time::{Duration, Instant};

    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("clip.mp4");
    let destination = tmp.path().join("zOpt_clip.mp4");
    std::fs::write(&source, b"frames").unwrap();

    let recorder = Arc::new(MemoryRecorder::new());
    let runner = EncoderRunner::new(Some(PathBuf::from("/bin/sh")), tmp.path(), recorder.clone());
    let invocation = EncoderInvocation::new(
        &source,
        r#"-c "echo partial > '{DestinationFilePath}'; sleep 5""#,
        Duration::from_millis(300),
    )
    .destination(&destination);

    let started = Instant::now();
    let output = runner.execute(&invocation);

    assert!(output.is_empty());
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(!destination.exists());
    assert_eq!(recorder.events().len(), 1);
}

// =============================================================================
// Synchronization and persistence
// =============================================================================

#[test]
fn synchronized_store_survives_a_snapshot_round_trip() {
    let f = fixture();
    write_jpeg(&f.media_root.join("001-cover.jpg"), 50, 40);
    write_jpeg(&f.media_root.join("010-Travel/001-rome.jpg"), 50, 40);
    let guard = SynchronizationGuard::new();
    let summary = Synchronizer::new(&f.ctx).with_guard(&guard).run(GalleryId(1)).unwrap();
    assert_eq!(summary.media_created, 2);

    let snapshot = f.media_root.with_file_name("store.json");
    f.store.save_to(&snapshot).unwrap();
    let restored = MemoryRepository::load(&snapshot).unwrap();

    assert_eq!(restored.album_count(), 2);
    assert_eq!(restored.media_count(), 2);
    assert_eq!(restored.root_album(GalleryId(1)).unwrap(), summary.root_album);
}
