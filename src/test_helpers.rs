//! Shared test utilities for the gallery-engine test suite.
//!
//! Provides synthetic images and a throwaway gallery: a media root inside a
//! temp directory, an in-memory store and a recorder that keeps events.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let gallery = TestGallery::new();
//! create_test_jpeg(&gallery.media_root().join("001-dawn.jpg"), 400, 300);
//!
//! let mut root = gallery.root_album();
//! let media = root
//!     .add_media_from_file(&gallery.ctx, &gallery.media_root().join("001-dawn.jpg"))
//!     .unwrap();
//! assert!(media.thumbnail.exists());
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use crate::asset::Album;
use crate::config::{GallerySettings, StaticSettingsProvider};
use crate::context::GalleryContext;
use crate::events::MemoryRecorder;
use crate::imaging::{ImageBackend, RustBackend};
use crate::store::MemoryRepository;
use crate::types::GalleryId;

// =========================================================================
// Images
// =========================================================================

/// Write a small gradient JPEG.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    img.save_with_format(path, image::ImageFormat::Jpeg).unwrap();
}

// =========================================================================
// Galleries
// =========================================================================

/// A gallery rooted in a temp directory.
pub struct TestGallery {
    pub tmp: TempDir,
    pub id: GalleryId,
    pub settings: GallerySettings,
    pub store: Arc<MemoryRepository>,
    pub recorder: Arc<MemoryRecorder>,
    pub ctx: GalleryContext,
}

impl TestGallery {
    /// Stock settings, the pure-Rust backend.
    pub fn new() -> Self {
        Self::with_settings(|_, _| {})
    }

    /// Stock settings adjusted by `configure`, which also gets the temp
    /// directory. The media root is already set up inside it.
    pub fn with_settings(configure: impl FnOnce(&mut GallerySettings, &Path)) -> Self {
        Self::build(configure, Arc::new(RustBackend::new()))
    }

    /// Like [`TestGallery::with_settings`] with a custom image backend.
    pub fn build(configure: impl FnOnce(&mut GallerySettings, &Path), backend: Arc<dyn ImageBackend>) -> Self {
        let tmp = TempDir::new().unwrap();
        let mut settings = GallerySettings::default();
        settings.paths.media_root = tmp.path().join("media");
        settings.paths.resources_path = tmp.path().join("resources");
        configure(&mut settings, tmp.path());
        std::fs::create_dir_all(&settings.paths.media_root).unwrap();

        let store = Arc::new(MemoryRepository::new());
        let recorder = Arc::new(MemoryRecorder::new());
        let ctx = GalleryContext::new(
            store.clone(),
            Arc::new(StaticSettingsProvider(settings.clone())),
            backend,
        )
        .with_recorder(recorder.clone())
        .with_user("tester");

        Self {
            tmp,
            id: GalleryId(1),
            settings,
            store,
            recorder,
            ctx,
        }
    }

    pub fn media_root(&self) -> PathBuf {
        self.settings.paths.media_root.clone()
    }

    /// Path below the temp directory, for files outside the media root.
    pub fn path(&self, relative: &str) -> PathBuf {
        self.tmp.path().join(relative)
    }

    /// A saved root album.
    pub fn root_album(&self) -> Album {
        let mut root = Album::new_root(&self.ctx, self.id, "Root").unwrap();
        root.save(&self.ctx).unwrap();
        root
    }
}
