//! Save and delete behaviors.
//!
//! Behaviors are plain variants picked by asset kind. Every save follows the
//! same order:
//!
//! 1. filesystem side effects (directories, moved files, derivatives that
//!    must exist before the row is written)
//! 2. the store write, which assigns an id to new assets
//! 3. the behavior's [`PostSaveStep`]s, in list order
//!
//! Cache invalidation always happens after the store write, so a projection
//! rebuilt by a concurrent reader sees the new row.

use super::{Album, AssetError, MediaAsset};
use crate::cache::AssetRef;
use crate::config::GallerySettings;
use crate::context::GalleryContext;
use crate::derivative::GenerationEnv;
use crate::naming::{unique_directory_name, unique_file_name};
use crate::types::{AssetId, AssetKind, DerivativeType, GalleryId, MediaKind};
use std::fs;
use std::path::{Path, PathBuf};

/// Work done after the store write succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostSaveStep {
    /// Copy the assigned id onto the derivative records.
    BackfillDerivativeIds,
    /// Add the asset to its parent's membership set (and drop it from a
    /// previous parent's).
    RegisterWithParent,
    /// Make the media asset its album's thumbnail when the album has none.
    AdoptAsAlbumThumbnail,
    /// Produce the optimized derivative and persist its record.
    GenerateOptimized,
    /// Purge the asset's projection and the tree-wide projections.
    RefreshCache,
    /// Forget pending rotation and regeneration requests.
    ClearPendingChanges,
}

/// How an asset kind is saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveBehavior {
    Album,
    /// Media backed by a file in the album directory.
    FileMedia,
    /// Media described by embed HTML, without an original file.
    ExternalMedia,
}

impl SaveBehavior {
    pub fn for_kind(kind: AssetKind) -> Self {
        match kind {
            AssetKind::Album => SaveBehavior::Album,
            AssetKind::Media(MediaKind::External) => SaveBehavior::ExternalMedia,
            AssetKind::Media(_) => SaveBehavior::FileMedia,
        }
    }

    pub fn post_save_steps(self) -> &'static [PostSaveStep] {
        use PostSaveStep::*;
        match self {
            SaveBehavior::Album => &[RegisterWithParent, RefreshCache, ClearPendingChanges],
            SaveBehavior::FileMedia | SaveBehavior::ExternalMedia => &[
                BackfillDerivativeIds,
                RegisterWithParent,
                AdoptAsAlbumThumbnail,
                GenerateOptimized,
                RefreshCache,
                ClearPendingChanges,
            ],
        }
    }

    /// Whether saving may move files on disk.
    pub fn moves_files(self) -> bool {
        !matches!(self, SaveBehavior::ExternalMedia)
    }
}

/// How an asset kind is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteBehavior {
    /// Delete contents recursively, then the directory and record. A root
    /// album only loses its contents.
    Album,
    /// Remove derivative files (and the original when asked), then the record.
    FileMedia,
    /// Remove generated derivatives and the record.
    ExternalMedia,
}

impl DeleteBehavior {
    pub fn for_kind(kind: AssetKind) -> Self {
        match kind {
            AssetKind::Album => DeleteBehavior::Album,
            AssetKind::Media(MediaKind::External) => DeleteBehavior::ExternalMedia,
            AssetKind::Media(_) => DeleteBehavior::FileMedia,
        }
    }
}

// =============================================================================
// Albums
// =============================================================================

pub(super) fn save_album(album: &mut Album, ctx: &GalleryContext) -> Result<(), AssetError> {
    album.ensure_inflated(ctx)?;
    let previous = album.persisted.clone();
    let old_parent = previous.as_ref().and_then(|p| p.header.parent_id);

    prepare_album_directory(album, ctx)?;

    album.header.touch(&ctx.user);
    let mut row = album.to_row();
    ctx.store.save_album(&mut row)?;
    let id = row.header.id;
    album.header.id = id;
    album.header.mark_inflated();
    tracing::info!(album = %id, path = %album.full_path.display(), "album saved");

    if let Some(previous) = &previous
        && previous.header.gallery_id != album.header.gallery_id
    {
        let count = cascade_gallery(ctx, id, album.header.gallery_id)?;
        tracing::info!(album = %id, gallery = %album.header.gallery_id, descendants = count, "gallery reassigned");
    }

    for step in SaveBehavior::Album.post_save_steps() {
        match step {
            PostSaveStep::RegisterWithParent => {
                let parent = album.header.parent_id;
                if parent != old_parent {
                    if let Some(old) = old_parent {
                        ctx.cache.remove_album_id_from_parent_album_cache_item(id, old);
                    }
                    if let Some(new) = parent {
                        ctx.cache.add_album_id_to_album_cache_item(id, new);
                    }
                }
            }
            PostSaveStep::RefreshCache => ctx.cache.purge_asset(AssetRef::Album(id)),
            PostSaveStep::ClearPendingChanges => {
                album.persisted = Some(album.to_row());
                album.persisted_path = Some(album.full_path.clone());
                album.adopt_directory = false;
            }
            PostSaveStep::BackfillDerivativeIds
            | PostSaveStep::AdoptAsAlbumThumbnail
            | PostSaveStep::GenerateOptimized => {}
        }
    }
    Ok(())
}

/// Create or move the album's directory (and its mirrored derivative
/// directories) so the store write sees the final directory name.
fn prepare_album_directory(album: &mut Album, ctx: &GalleryContext) -> Result<(), AssetError> {
    let Some(parent_id) = album.header.parent_id else {
        let settings = ctx.gallery_settings(album.header.gallery_id)?;
        album.directory_name.clear();
        album.full_path = settings.paths.media_root.clone();
        create_with_mirrors(&settings, &album.full_path)?;
        return Ok(());
    };
    if parent_id == album.header.id {
        return Err(AssetError::Validation(format!(
            "album {parent_id} cannot be its own parent"
        )));
    }

    let parent = Album::load(ctx, parent_id)?;
    if album.header.is_new() {
        album.header.gallery_id = parent.header.gallery_id;
    } else {
        ensure_not_descendant(ctx, album.header.id, parent_id)?;
    }
    let settings = ctx.gallery_settings(album.header.gallery_id)?;

    let unchanged = album.persisted.as_ref().is_some_and(|p| {
        p.header.parent_id == album.header.parent_id && p.directory_name == album.directory_name
    });
    if unchanged {
        return Ok(());
    }

    if album.header.is_new() && album.adopt_directory {
        let existing = parent.full_path().join(&album.directory_name);
        if existing.is_dir() {
            create_with_mirrors(&settings, &existing)?;
            album.full_path = existing;
            return Ok(());
        }
    }

    let desired = if album.directory_name.is_empty() {
        album.title.clone()
    } else {
        album.directory_name.clone()
    };
    let name = unique_directory_name(parent.full_path(), &desired);
    let new_path = parent.full_path().join(&name);

    match album.persisted_path.clone() {
        None => create_with_mirrors(&settings, &new_path)?,
        Some(old_path) => move_with_mirrors(&settings, &old_path, &new_path)?,
    }
    tracing::debug!(album = %album.header.id, path = %new_path.display(), "album directory ready");
    album.directory_name = name;
    album.full_path = new_path;
    Ok(())
}

fn create_with_mirrors(settings: &GallerySettings, path: &Path) -> Result<(), AssetError> {
    fs::create_dir_all(path)?;
    for dir in mirrored_dirs(settings, path) {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn move_with_mirrors(settings: &GallerySettings, old: &Path, new: &Path) -> Result<(), AssetError> {
    let moves: Vec<(PathBuf, PathBuf)> = mirrored_dirs(settings, old)
        .into_iter()
        .zip(mirrored_dirs(settings, new))
        .collect();
    for (from, to) in &moves {
        if from.exists() && to.exists() {
            return Err(AssetError::collision(to.clone()));
        }
    }

    if old.exists() {
        if let Some(parent) = new.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(old, new)?;
    } else {
        fs::create_dir_all(new)?;
    }
    for (from, to) in moves {
        if from.exists() {
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::rename(&from, &to)?;
        } else {
            fs::create_dir_all(&to)?;
        }
    }
    Ok(())
}

/// Thumbnail and optimized directories of an album directory that are
/// distinct from it and from each other.
fn mirrored_dirs(settings: &GallerySettings, primary: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for derivative in [DerivativeType::Thumbnail, DerivativeType::Optimized] {
        let dir = settings.derivative_dir(primary, derivative);
        if dir != primary && !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

/// Directories removed when an album is deleted.
///
/// The primary directory only when originals go too. Mirrored directories
/// that coincide with the primary directory or with each other appear once
/// (or not at all).
pub fn album_directories_to_remove(
    settings: &GallerySettings,
    primary: &Path,
    delete_from_fs: bool,
) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if delete_from_fs {
        dirs.push(primary.to_path_buf());
    }
    dirs.extend(mirrored_dirs(settings, primary));
    dirs
}

fn ensure_not_descendant(ctx: &GalleryContext, album: AssetId, new_parent: AssetId) -> Result<(), AssetError> {
    let mut current = Some(new_parent);
    while let Some(id) = current {
        if id == album {
            return Err(AssetError::Validation(format!(
                "album {album} cannot move below its own descendant"
            )));
        }
        current = ctx.store.find_album(id)?.and_then(|row| row.header.parent_id);
    }
    Ok(())
}

/// Persist `gallery` on every descendant album. Media follow their album.
fn cascade_gallery(ctx: &GalleryContext, album: AssetId, gallery: GalleryId) -> Result<usize, AssetError> {
    let mut count = 0;
    for child in ctx.store.child_albums(album)? {
        let mut row = ctx
            .store
            .find_album(child)?
            .ok_or(AssetError::NotFound { kind: "album", id: child })?;
        row.header.gallery_id = gallery;
        row.header.last_modified_by = ctx.user.clone();
        row.header.date_modified = chrono::Utc::now();
        ctx.store.save_album(&mut row)?;
        ctx.cache.purge_asset(AssetRef::Album(child));
        count += 1 + cascade_gallery(ctx, child, gallery)?;
    }
    Ok(count)
}

pub(super) fn delete_album(album: &mut Album, ctx: &GalleryContext, delete_from_fs: bool) -> Result<(), AssetError> {
    album.ensure_inflated(ctx)?;
    if album.header.is_new() {
        return Err(AssetError::Validation("cannot delete an unsaved album".into()));
    }
    let id = album.header.id;

    for child in ctx.store.child_albums(id)? {
        let mut child = Album::load(ctx, child)?;
        delete_album(&mut child, ctx, delete_from_fs)?;
    }
    for media_id in ctx.store.child_media(id)? {
        let mut media = MediaAsset::load(ctx, media_id)?;
        media.delete(ctx, delete_from_fs)?;
    }
    album.child_album_ids.clear();
    album.child_media_ids.clear();

    if album.is_root() {
        album.thumbnail_media_id = None;
        let mut row = album.to_row();
        ctx.store.save_album(&mut row)?;
        album.persisted = Some(row);
        ctx.cache.purge_asset(AssetRef::Album(id));
        tracing::info!(album = %id, "root album emptied; record and directory kept");
        return Ok(());
    }

    let settings = ctx.gallery_settings(album.header.gallery_id)?;
    for dir in album_directories_to_remove(&settings, &album.full_path, delete_from_fs) {
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
    }
    ctx.store.delete_album(id)?;
    ctx.cache.purge_asset(AssetRef::Album(id));
    if let Some(parent) = album.header.parent_id {
        ctx.cache.remove_album_id_from_parent_album_cache_item(id, parent);
    }
    tracing::info!(album = %id, delete_from_fs, "album deleted");
    Ok(())
}

// =============================================================================
// Media
// =============================================================================

pub(super) fn save_media(media: &mut MediaAsset, ctx: &GalleryContext) -> Result<(), AssetError> {
    media.ensure_inflated(ctx)?;
    let behavior = SaveBehavior::for_kind(media.asset_kind());
    let parent_id = media
        .header
        .parent_id
        .ok_or_else(|| AssetError::Validation("media asset needs a parent album".into()))?;
    let old_parent = media.persisted.as_ref().and_then(|p| p.header.parent_id);

    let parent = Album::load(ctx, parent_id)?;
    media.header.gallery_id = parent.header.gallery_id;
    let settings = ctx.gallery_settings(media.header.gallery_id)?;

    let moved = old_parent.is_some_and(|old| old != parent_id);
    if moved && behavior.moves_files() {
        move_media_files(media, &settings, parent.full_path())?;
    } else if media.album_dir() != parent.full_path() {
        media.relocate(&settings, parent.full_path())?;
    }

    {
        let env = GenerationEnv::new(ctx, &settings, media.event_context());
        media.generate(DerivativeType::Thumbnail, &env)?;
        media.generate(DerivativeType::Original, &env)?;
    }

    media.header.touch(&ctx.user);
    let mut row = media.to_row();
    ctx.store.save_media(&mut row)?;
    let id = row.header.id;
    media.header.id = id;
    media.header.mark_inflated();
    tracing::info!(media = %id, kind = %media.kind, "media saved");

    for step in behavior.post_save_steps() {
        match step {
            PostSaveStep::BackfillDerivativeIds => media.backfill_ids(id),
            PostSaveStep::RegisterWithParent => {
                if old_parent != Some(parent_id) {
                    if let Some(old) = old_parent {
                        ctx.cache.remove_media_asset_id_from_parent_album_cache_item(id, old);
                        reset_album_thumbnail(ctx, old, id)?;
                    }
                    ctx.cache.add_media_asset_id_to_album_cache_item(id, parent_id);
                }
            }
            PostSaveStep::AdoptAsAlbumThumbnail => adopt_album_thumbnail(ctx, parent_id, id)?,
            PostSaveStep::GenerateOptimized => {
                let env = GenerationEnv::new(ctx, &settings, media.event_context());
                let outcome = media.generate(DerivativeType::Optimized, &env)?;
                if outcome.changed() {
                    let mut row = media.to_row();
                    ctx.store.save_media(&mut row)?;
                }
            }
            PostSaveStep::RefreshCache => ctx.cache.purge_asset(AssetRef::Media(id)),
            PostSaveStep::ClearPendingChanges => {
                media.regenerate_on_save = false;
                media.pending_orientation = Default::default();
                media.original_rotated = false;
                media.persisted = Some(media.to_row());
            }
        }
    }
    Ok(())
}

/// Move the original and generated files below a new album directory.
fn move_media_files(media: &mut MediaAsset, settings: &GallerySettings, new_dir: &Path) -> Result<(), AssetError> {
    let shared = media.optimized.shares_file_with(&media.original);
    let mut moved = Vec::new();
    for derivative in DerivativeType::ALL {
        if derivative == DerivativeType::Optimized && shared {
            continue;
        }
        let record = media.record(derivative);
        let Some(old) = record.physical_path().filter(|p| p.is_file()) else {
            continue;
        };
        let dir = settings.derivative_dir(new_dir, derivative);
        fs::create_dir_all(&dir)?;
        let target = dir.join(unique_file_name(&dir, &record.file_name));
        fs::rename(old, &target)?;
        moved.push((derivative, target));
    }

    media.set_album_dir(settings, new_dir);
    for (derivative, path) in moved {
        media.record_mut(derivative).set_physical_path(path)?;
    }
    if shared {
        let original = media.original.clone();
        media.optimized.copy_from(&original);
    }
    tracing::debug!(media = %media.header.id, dir = %new_dir.display(), "media files moved");
    Ok(())
}

pub(super) fn delete_media(media: &mut MediaAsset, ctx: &GalleryContext, delete_from_fs: bool) -> Result<(), AssetError> {
    media.ensure_inflated(ctx)?;
    if media.header.is_new() {
        return Err(AssetError::Validation("cannot delete an unsaved media asset".into()));
    }
    let id = media.header.id;
    let behavior = DeleteBehavior::for_kind(media.asset_kind());

    let mut removed: Vec<PathBuf> = Vec::new();
    for derivative in [DerivativeType::Thumbnail, DerivativeType::Optimized] {
        let record = media.record(derivative);
        if record.shares_file_with(&media.original) {
            continue;
        }
        if let Some(path) = record.physical_path()
            && !removed.iter().any(|p| p == path)
        {
            remove_file_if_present(path)?;
            removed.push(path.to_path_buf());
        }
    }
    if delete_from_fs
        && behavior == DeleteBehavior::FileMedia
        && let Some(path) = media.original.physical_path()
    {
        remove_file_if_present(path)?;
    }

    ctx.store.delete_media(id)?;
    if let Some(parent) = media.header.parent_id {
        reset_album_thumbnail(ctx, parent, id)?;
        ctx.cache.purge_asset(AssetRef::Media(id));
        ctx.cache.remove_media_asset_id_from_parent_album_cache_item(id, parent);
    } else {
        ctx.cache.purge_asset(AssetRef::Media(id));
    }
    tracing::info!(media = %id, delete_from_fs, "media deleted");
    Ok(())
}

fn remove_file_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn adopt_album_thumbnail(ctx: &GalleryContext, album: AssetId, media: AssetId) -> Result<(), AssetError> {
    let Some(mut row) = ctx.store.find_album(album)? else {
        return Ok(());
    };
    if row.thumbnail_media_id.is_some() {
        return Ok(());
    }
    row.thumbnail_media_id = Some(media);
    ctx.store.save_album(&mut row)?;
    ctx.cache.purge_asset(AssetRef::Album(album));
    tracing::debug!(album = %album, media = %media, "album thumbnail adopted");
    Ok(())
}

/// Point an album whose thumbnail was `removed` at another child, or none.
fn reset_album_thumbnail(ctx: &GalleryContext, album: AssetId, removed: AssetId) -> Result<(), AssetError> {
    let Some(mut row) = ctx.store.find_album(album)? else {
        return Ok(());
    };
    if row.thumbnail_media_id != Some(removed) {
        return Ok(());
    }
    row.thumbnail_media_id = ctx
        .store
        .child_media(album)?
        .into_iter()
        .find(|id| *id != removed);
    ctx.store.save_album(&mut row)?;
    ctx.cache.purge_asset(AssetRef::Album(album));
    Ok(())
}
