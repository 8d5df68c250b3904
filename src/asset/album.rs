use super::{AssetError, AssetHeader, InflationState, MediaAsset, behavior, check_inflated};
use crate::context::GalleryContext;
use crate::naming::{parse_entry_name, sanitize_name};
use crate::store::AlbumRow;
use crate::types::{AssetId, DerivativeType, GalleryId, MediaKind};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A directory of media assets and child albums.
///
/// The root album of a gallery maps to the media root and has an empty
/// directory name; every other album is one directory below its parent's.
#[derive(Debug, Clone)]
pub struct Album {
    pub header: AssetHeader,
    /// Directory below the parent album's directory. Collision-free names
    /// are resolved when the album is saved.
    pub directory_name: String,
    pub title: String,
    pub summary: String,
    /// Media asset shown for this album.
    pub thumbnail_media_id: Option<AssetId>,
    pub child_album_ids: Vec<AssetId>,
    pub child_media_ids: Vec<AssetId>,
    pub(super) full_path: PathBuf,
    /// Files whose media assets are being constructed.
    pub(super) pending_children: Vec<PathBuf>,
    pub(super) persisted: Option<AlbumRow>,
    pub(super) persisted_path: Option<PathBuf>,
    /// Take over an existing directory on first save instead of picking a
    /// collision-free name.
    pub(super) adopt_directory: bool,
}

impl Album {
    fn blank(header: AssetHeader) -> Self {
        Self {
            header,
            directory_name: String::new(),
            title: String::new(),
            summary: String::new(),
            thumbnail_media_id: None,
            child_album_ids: Vec::new(),
            child_media_ids: Vec::new(),
            full_path: PathBuf::new(),
            pending_children: Vec::new(),
            persisted: None,
            persisted_path: None,
            adopt_directory: false,
        }
    }

    /// A new root album for `gallery`, mapped to its media root.
    pub fn new_root(ctx: &GalleryContext, gallery: GalleryId, title: &str) -> Result<Self, AssetError> {
        let settings = ctx.gallery_settings(gallery)?;
        let mut album = Self::blank(AssetHeader::new(None, gallery, &ctx.user));
        album.title = title.to_string();
        album.full_path = settings.paths.media_root.clone();
        Ok(album)
    }

    /// A new album below `parent`. The parent must already be saved.
    pub fn new_child(ctx: &GalleryContext, parent: &Album, title: &str) -> Result<Self, AssetError> {
        if parent.header.is_new() {
            return Err(AssetError::Validation(
                "parent album must be saved before adding children".into(),
            ));
        }
        let mut album = Self::blank(AssetHeader::new(
            Some(parent.header.id),
            parent.header.gallery_id,
            &ctx.user,
        ));
        album.title = title.to_string();
        album.directory_name = sanitize_name(title);
        album.full_path = parent.full_path.join(&album.directory_name);
        Ok(album)
    }

    /// A new album for a directory that already exists below `parent`,
    /// titled after the `NNN-name` convention.
    pub fn for_directory(ctx: &GalleryContext, parent: &Album, directory_name: &str) -> Result<Self, AssetError> {
        let parsed = parse_entry_name(directory_name);
        let title = if parsed.display_title.is_empty() {
            directory_name
        } else {
            parsed.display_title.as_str()
        };
        let mut album = Self::new_child(ctx, parent, title)?;
        album.directory_name = directory_name.to_string();
        album.full_path = parent.full_path.join(directory_name);
        album.header.sequence = parsed.number.map_or(0, |n| n as i32);
        album.adopt_directory = true;
        Ok(album)
    }

    /// An existing album known only by id.
    pub fn stub(id: AssetId) -> Self {
        Self::blank(AssetHeader::uninflated(id))
    }

    /// Load an album, served from the inflated-album cache when present.
    pub fn load(ctx: &GalleryContext, id: AssetId) -> Result<Self, AssetError> {
        if let Some(album) = ctx.cache.get_inflated_album(id) {
            return Ok((*album).clone());
        }
        let mut album = Self::stub(id);
        album.ensure_inflated(ctx)?;
        ctx.cache.add_inflated_album(album.clone());
        Ok(album)
    }

    pub fn ensure_inflated(&mut self, ctx: &GalleryContext) -> Result<(), AssetError> {
        if self.header.state() != InflationState::Uninflated {
            return Ok(());
        }
        let id = self.header.id;
        let row = ctx
            .store
            .find_album(id)?
            .ok_or(AssetError::NotFound { kind: "album", id })?;
        let full_path = resolve_album_path(ctx, &row)?;
        let child_albums = ctx.store.child_albums(id)?;
        let child_media = ctx.store.child_media(id)?;

        let mut loaded = Self::blank(AssetHeader::from_row(&row.header));
        loaded.directory_name = row.directory_name.clone();
        loaded.title = row.title.clone();
        loaded.summary = row.summary.clone();
        loaded.thumbnail_media_id = row.thumbnail_media_id;
        loaded.child_album_ids = child_albums;
        loaded.child_media_ids = child_media;
        loaded.persisted_path = Some(full_path.clone());
        loaded.full_path = full_path;
        loaded.persisted = Some(row);
        *self = loaded;

        check_inflated(id, self.header.id, self.header.state(), self.is_dirty())?;
        tracing::debug!(album = %id, path = %self.full_path.display(), "album inflated");
        Ok(())
    }

    /// Whether persisted fields differ from what was last loaded or saved.
    pub fn is_dirty(&self) -> bool {
        match &self.persisted {
            Some(row) => *row != self.to_row(),
            None => true,
        }
    }

    pub fn is_root(&self) -> bool {
        self.header.parent_id.is_none()
    }

    /// Directory holding this album's originals.
    pub fn full_path(&self) -> &Path {
        &self.full_path
    }

    /// Files currently being turned into media assets of this album.
    pub fn pending_children(&self) -> &[PathBuf] {
        &self.pending_children
    }

    pub(super) fn register_pending(&mut self, path: PathBuf) {
        if !self.pending_children.contains(&path) {
            self.pending_children.push(path);
        }
    }

    pub(super) fn remove_pending(&mut self, path: &Path) {
        self.pending_children.retain(|p| p != path);
    }

    pub fn to_row(&self) -> AlbumRow {
        AlbumRow {
            header: self.header.to_row(),
            directory_name: self.directory_name.clone(),
            title: self.title.clone(),
            summary: self.summary.clone(),
            thumbnail_media_id: self.thumbnail_media_id,
        }
    }

    /// Create, save and attach a media asset for `file`.
    ///
    /// Files outside this album's directory are copied in first.
    pub fn add_media_from_file(&mut self, ctx: &GalleryContext, file: &Path) -> Result<MediaAsset, AssetError> {
        self.add_media_of_kind(ctx, file, None)
    }

    /// [`Album::add_media_from_file`] with the detected kind overridden.
    pub fn add_media_of_kind(
        &mut self,
        ctx: &GalleryContext,
        file: &Path,
        kind: Option<MediaKind>,
    ) -> Result<MediaAsset, AssetError> {
        let mut media = MediaAsset::create(ctx, self, file, kind)?;
        let copied = file.parent() != Some(self.full_path());
        let pending = media.original.physical_path().map(Path::to_path_buf);
        let result = media.save(ctx);
        if let Some(path) = &pending {
            self.remove_pending(path);
        }
        if let Err(e) = result {
            discard_failed_media(ctx, &mut media, pending.as_deref(), copied, &e);
            return Err(e);
        }
        self.child_media_ids.push(media.header.id);
        Ok(media)
    }

    /// Create, save and attach a child album.
    pub fn add_child_album(&mut self, ctx: &GalleryContext, title: &str) -> Result<Album, AssetError> {
        let mut child = Album::new_child(ctx, self, title)?;
        child.save(ctx)?;
        self.child_album_ids.push(child.header.id);
        Ok(child)
    }

    /// Create, save and attach a child album for an existing directory.
    pub fn add_child_album_for_directory(&mut self, ctx: &GalleryContext, directory_name: &str) -> Result<Album, AssetError> {
        let mut child = Album::for_directory(ctx, self, directory_name)?;
        child.save(ctx)?;
        self.child_album_ids.push(child.header.id);
        Ok(child)
    }

    /// Directory of a derivative type for this album's media.
    pub fn derivative_dir(&self, ctx: &GalleryContext, derivative: DerivativeType) -> Result<PathBuf, AssetError> {
        let settings = ctx.gallery_settings(self.header.gallery_id)?;
        Ok(settings.derivative_dir(&self.full_path, derivative))
    }

    pub fn save(&mut self, ctx: &GalleryContext) -> Result<(), AssetError> {
        behavior::save_album(self, ctx)
    }

    /// Delete this album and everything below it. A root album keeps its own
    /// record and directory.
    pub fn delete(&mut self, ctx: &GalleryContext, delete_from_fs: bool) -> Result<(), AssetError> {
        behavior::delete_album(self, ctx, delete_from_fs)
    }
}

/// Undo a media asset whose first save failed. A copied-in original is
/// removed; a row that made it into the store before an unsupported source
/// was detected is deleted again.
fn discard_failed_media(
    ctx: &GalleryContext,
    media: &mut MediaAsset,
    original: Option<&Path>,
    copied: bool,
    error: &AssetError,
) {
    if media.header.is_new() {
        if copied
            && let Some(path) = original
            && let Err(e) = std::fs::remove_file(path)
        {
            tracing::warn!(file = %path.display(), "could not remove copied original: {e}");
        }
    } else if matches!(error, AssetError::UnsupportedSource { .. })
        && let Err(e) = media.delete(ctx, copied)
    {
        tracing::warn!(media = %media.header.id, "could not roll back media asset: {e}");
    }
}

/// Resolve an album's directory by walking up to the root album.
fn resolve_album_path(ctx: &GalleryContext, row: &AlbumRow) -> Result<PathBuf, AssetError> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    let mut current = row.clone();
    while let Some(parent_id) = current.header.parent_id {
        if !seen.insert(parent_id) {
            return Err(AssetError::InflationContract {
                id: row.header.id,
                reason: format!("album {parent_id} is its own ancestor"),
            });
        }
        names.push(current.directory_name.clone());
        current = ctx.store.find_album(parent_id)?.ok_or(AssetError::NotFound {
            kind: "album",
            id: parent_id,
        })?;
    }
    let settings = ctx.gallery_settings(current.header.gallery_id)?;
    let mut path = settings.paths.media_root.clone();
    for name in names.iter().rev() {
        path.push(name);
    }
    Ok(path)
}
