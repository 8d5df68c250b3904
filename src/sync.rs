//! Directory-tree synchronization.
//!
//! A synchronization walks a gallery's media root and brings the store in
//! line with the filesystem:
//!
//! - every directory below the media root becomes an album
//! - every file becomes a media asset of its directory's album
//! - records whose directory or original file disappeared are deleted
//!
//! Derivative files (recognised by their file prefix), caption and tag
//! sidecars and directories that are alternate derivative roots are skipped.
//!
//! Only one synchronization may run per gallery at a time. The
//! [`SynchronizationGuard`] hands out a [`SyncTicket`] that releases the
//! gallery when dropped; asking again with the same [`SyncId`] is allowed, a
//! different id fails fast with [`SyncError::InProgress`].

use crate::asset::{Album, AssetError, MediaAsset};
use crate::config::GallerySettings;
use crate::context::GalleryContext;
use crate::types::{AssetId, GalleryId, MediaKind};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Synchronization {running} of gallery {gallery} is already in progress")]
    InProgress { gallery: GalleryId, running: SyncId },
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Media root {} does not exist", .0.display())]
    MissingRoot(PathBuf),
}

/// Identifies one synchronization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncId(pub u64);

impl SyncId {
    /// A process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SyncId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// In-flight synchronizations, one per gallery.
#[derive(Debug, Default)]
pub struct SynchronizationGuard {
    running: DashMap<GalleryId, SyncId>,
}

impl SynchronizationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide guard.
    pub fn global() -> &'static SynchronizationGuard {
        static GUARD: OnceLock<SynchronizationGuard> = OnceLock::new();
        GUARD.get_or_init(SynchronizationGuard::new)
    }

    /// Claim `gallery` for `sync`. Claiming again with the same id succeeds
    /// with a ticket that does not release the gallery.
    pub fn begin(&self, gallery: GalleryId, sync: SyncId) -> Result<SyncTicket<'_>, SyncError> {
        match self.running.entry(gallery) {
            Entry::Occupied(entry) if *entry.get() == sync => Ok(SyncTicket {
                guard: self,
                gallery,
                sync,
                owner: false,
            }),
            Entry::Occupied(entry) => Err(SyncError::InProgress {
                gallery,
                running: *entry.get(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(sync);
                tracing::debug!(%gallery, %sync, "synchronization started");
                Ok(SyncTicket {
                    guard: self,
                    gallery,
                    sync,
                    owner: true,
                })
            }
        }
    }

    /// The synchronization currently running for `gallery`.
    pub fn running(&self, gallery: GalleryId) -> Option<SyncId> {
        self.running.get(&gallery).map(|s| *s)
    }
}

/// Holds a gallery for one synchronization until dropped.
#[derive(Debug)]
pub struct SyncTicket<'a> {
    guard: &'a SynchronizationGuard,
    gallery: GalleryId,
    sync: SyncId,
    owner: bool,
}

impl SyncTicket<'_> {
    pub fn sync_id(&self) -> SyncId {
        self.sync
    }
}

impl Drop for SyncTicket<'_> {
    fn drop(&mut self) {
        if self.owner {
            self.guard
                .running
                .remove_if(&self.gallery, |_, running| *running == self.sync);
            tracing::debug!(gallery = %self.gallery, sync = %self.sync, "synchronization finished");
        }
    }
}

/// What a synchronization changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSummary {
    pub root_album: Option<AssetId>,
    pub albums_created: usize,
    pub albums_removed: usize,
    pub media_created: usize,
    /// Files stored as generic media because their content was unsupported.
    pub media_as_generic: usize,
    pub media_removed: usize,
    pub media_regenerated: usize,
    /// Files that could not be turned into a media asset at all.
    pub failures: Vec<(PathBuf, String)>,
}

/// Mirrors a gallery's media root into the store.
pub struct Synchronizer<'a> {
    ctx: &'a GalleryContext,
    guard: &'a SynchronizationGuard,
    sync: SyncId,
}

impl<'a> Synchronizer<'a> {
    pub fn new(ctx: &'a GalleryContext) -> Self {
        Self {
            ctx,
            guard: SynchronizationGuard::global(),
            sync: SyncId::next(),
        }
    }

    pub fn with_guard(mut self, guard: &'a SynchronizationGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_sync_id(mut self, sync: SyncId) -> Self {
        self.sync = sync;
        self
    }

    pub fn run(&self, gallery: GalleryId) -> Result<SyncSummary, SyncError> {
        let _ticket = self.guard.begin(gallery, self.sync)?;
        let settings = self.ctx.gallery_settings(gallery).map_err(AssetError::from)?;
        let media_root = settings.paths.media_root.clone();
        if !media_root.is_dir() {
            return Err(SyncError::MissingRoot(media_root));
        }

        let mut summary = SyncSummary::default();
        let mut root = match self.ctx.store.root_album(gallery).map_err(AssetError::from)? {
            Some(id) => Album::load(self.ctx, id)?,
            None => {
                let title = media_root
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| format!("Gallery {gallery}"));
                let mut album = Album::new_root(self.ctx, gallery, &title)?;
                album.save(self.ctx)?;
                summary.albums_created += 1;
                album
            }
        };
        summary.root_album = Some(root.header.id);

        self.sync_album(&settings, &mut root, &mut summary)?;
        tracing::info!(
            %gallery,
            sync = %self.sync,
            albums_created = summary.albums_created,
            albums_removed = summary.albums_removed,
            media_created = summary.media_created,
            media_removed = summary.media_removed,
            "synchronization complete"
        );
        Ok(summary)
    }

    fn sync_album(&self, settings: &GallerySettings, album: &mut Album, summary: &mut SyncSummary) -> Result<(), SyncError> {
        let dir = album.full_path().to_path_buf();
        let (dirs, files) = list_entries(settings, &dir)?;

        // Existing child albums, by directory.
        let mut known_dirs: HashSet<PathBuf> = HashSet::new();
        let mut children = Vec::new();
        for id in album.child_album_ids.clone() {
            let mut child = Album::load(self.ctx, id)?;
            if child.full_path().is_dir() {
                known_dirs.insert(child.full_path().to_path_buf());
                children.push(child);
            } else {
                tracing::info!(album = %id, path = %child.full_path().display(), "album directory vanished");
                child.delete(self.ctx, false)?;
                album.child_album_ids.retain(|c| *c != id);
                summary.albums_removed += 1;
            }
        }

        // Existing media, by original file.
        let mut known_files: HashSet<PathBuf> = HashSet::new();
        for id in album.child_media_ids.clone() {
            let mut media = MediaAsset::load(self.ctx, id)?;
            if media.kind == MediaKind::External {
                continue;
            }
            match media.original.physical_path().map(Path::to_path_buf) {
                Some(path) if path.is_file() => {
                    known_files.insert(path);
                    if settings.sync.regenerate_existing {
                        media.regenerate_on_save = true;
                        media.save(self.ctx)?;
                        summary.media_regenerated += 1;
                    }
                }
                _ => {
                    tracing::info!(media = %id, "original file vanished");
                    media.delete(self.ctx, false)?;
                    album.child_media_ids.retain(|c| *c != id);
                    summary.media_removed += 1;
                }
            }
        }

        for file in files.iter().filter(|f| !known_files.contains(*f)) {
            self.add_file(album, file, summary);
        }

        for path in dirs.iter().filter(|d| !known_dirs.contains(*d)) {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let child = album.add_child_album_for_directory(self.ctx, &name)?;
            summary.albums_created += 1;
            children.push(child);
        }

        for child in &mut children {
            self.sync_album(settings, child, summary)?;
        }
        Ok(())
    }

    /// Create a media asset for `file`, falling back to generic media when
    /// the content is unsupported. Failures are collected, not returned.
    fn add_file(&self, album: &mut Album, file: &Path, summary: &mut SyncSummary) {
        match album.add_media_from_file(self.ctx, file) {
            Ok(_) => summary.media_created += 1,
            Err(AssetError::UnsupportedSource { reason, .. }) => {
                tracing::warn!(file = %file.display(), "unsupported content, storing as generic media: {reason}");
                match album.add_media_of_kind(self.ctx, file, Some(MediaKind::Generic)) {
                    Ok(_) => {
                        summary.media_created += 1;
                        summary.media_as_generic += 1;
                    }
                    Err(e) => summary.failures.push((file.to_path_buf(), e.to_string())),
                }
            }
            Err(e) => {
                tracing::warn!(file = %file.display(), "could not add media: {e}");
                summary.failures.push((file.to_path_buf(), e.to_string()));
            }
        }
    }
}

/// Subdirectories and media files directly inside `dir`, sorted by name.
fn list_entries(settings: &GallerySettings, dir: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>), SyncError> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy();
        if settings.sync.skip_hidden && name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        if entry.file_type().is_dir() {
            if !is_derivative_root(settings, path) {
                dirs.push(path.to_path_buf());
            }
        } else if entry.file_type().is_file() && !is_derivative_file(settings, path) {
            files.push(path.to_path_buf());
        }
    }
    let files = files
        .iter()
        .filter(|f| !is_sidecar(f, &files))
        .cloned()
        .collect();
    Ok((dirs, files))
}

fn is_derivative_root(settings: &GallerySettings, dir: &Path) -> bool {
    [&settings.paths.thumbnail_root, &settings.paths.optimized_root]
        .into_iter()
        .flatten()
        .any(|root| root == dir)
}

fn is_derivative_file(settings: &GallerySettings, path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    name.starts_with(&settings.thumbnail.file_prefix) || name.starts_with(&settings.optimized.file_prefix)
}

/// A `.txt` or `.tags` file sharing its stem with another file holds that
/// file's caption or tags.
fn is_sidecar(path: &Path, siblings: &[PathBuf]) -> bool {
    let is_sidecar_ext = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("txt") || e.eq_ignore_ascii_case("tags"));
    is_sidecar_ext
        && siblings
            .iter()
            .any(|s| s != path && s.file_stem() == path.file_stem())
}

// =============================================================================
// Tests
// =============================================================================
