use super::{Album, AssetError, AssetHeader, DerivativeRecord, InflationState, behavior, check_inflated};
use crate::config::GallerySettings;
use crate::context::GalleryContext;
use crate::derivative::{GenerationEnv, GenerationOutcome, GeneratorError, generator_for};
use crate::encoder::{EncoderInvocation, EncoderOutput, parse_output};
use crate::events::EventContext;
use crate::imaging::{get_dimensions, rotated_dimensions};
use crate::metadata::{self, ExtractionSources, MetaItem, MetaName};
use crate::naming::{parse_entry_name, sanitize_name, unique_file_name};
use crate::store::MediaRow;
use crate::types::{AssetId, AssetKind, DerivativeType, MediaKind, Orientation};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// An image, video, audio, generic or external media object.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    pub header: AssetHeader,
    pub kind: MediaKind,
    pub title: String,
    pub original: DerivativeRecord,
    pub thumbnail: DerivativeRecord,
    pub optimized: DerivativeRecord,
    pub metadata: Vec<MetaItem>,
    /// Regenerate every derivative on the next save.
    pub regenerate_on_save: bool,
    pub(super) pending_orientation: Orientation,
    /// The pending orientation has already been applied to the original.
    pub(super) original_rotated: bool,
    pub(super) album_dir: PathBuf,
    pub(super) persisted: Option<MediaRow>,
}

impl MediaAsset {
    fn blank(kind: MediaKind, header: AssetHeader) -> Self {
        Self {
            header,
            kind,
            title: String::new(),
            original: DerivativeRecord::new(
                DerivativeType::Original,
                generator_for(kind, DerivativeType::Original),
            ),
            thumbnail: DerivativeRecord::new(
                DerivativeType::Thumbnail,
                generator_for(kind, DerivativeType::Thumbnail),
            ),
            optimized: DerivativeRecord::new(
                DerivativeType::Optimized,
                generator_for(kind, DerivativeType::Optimized),
            ),
            metadata: Vec::new(),
            regenerate_on_save: false,
            pending_orientation: Orientation::default(),
            original_rotated: false,
            album_dir: PathBuf::new(),
            persisted: None,
        }
    }

    /// An existing media asset known only by id.
    pub fn stub(id: AssetId) -> Self {
        Self::blank(MediaKind::Generic, AssetHeader::uninflated(id))
    }

    pub fn load(ctx: &GalleryContext, id: AssetId) -> Result<Self, AssetError> {
        let mut media = Self::stub(id);
        media.ensure_inflated(ctx)?;
        Ok(media)
    }

    /// Build a new media asset for `file` inside `parent`.
    ///
    /// A file outside the album's directory is copied in under a
    /// collision-free name. While the asset is being built the file is listed
    /// in the parent's pending children; when the source turns out to be
    /// unsupported that entry (and any copy) is removed again and
    /// [`AssetError::UnsupportedSource`] is returned.
    ///
    /// `kind` overrides the kind detected from the file extension.
    pub fn create(
        ctx: &GalleryContext,
        parent: &mut Album,
        file: &Path,
        kind: Option<MediaKind>,
    ) -> Result<Self, AssetError> {
        parent.ensure_inflated(ctx)?;
        if parent.header.is_new() {
            return Err(AssetError::Validation(
                "parent album must be saved before adding media".into(),
            ));
        }
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| AssetError::Validation(format!("{} has no file name", file.display())))?;
        let settings = ctx.gallery_settings(parent.header.gallery_id)?;

        let in_place = file.parent() == Some(parent.full_path());
        let path = if in_place {
            file.to_path_buf()
        } else {
            let name = unique_file_name(parent.full_path(), &sanitize_name(&file_name));
            let target = parent.full_path().join(name);
            std::fs::copy(file, &target)?;
            target
        };

        parent.register_pending(path.clone());
        match Self::build(ctx, &settings, parent, &path, kind) {
            Ok(media) => Ok(media),
            Err(e) => {
                parent.remove_pending(&path);
                if !in_place {
                    let _ = std::fs::remove_file(&path);
                }
                tracing::warn!(file = %path.display(), "could not create media asset: {e}");
                Err(e)
            }
        }
    }

    fn build(
        ctx: &GalleryContext,
        settings: &GallerySettings,
        parent: &Album,
        path: &Path,
        kind: Option<MediaKind>,
    ) -> Result<Self, AssetError> {
        let kind = kind.unwrap_or_else(|| MediaKind::for_path(path));
        let mut media = Self::blank(
            kind,
            AssetHeader::new(Some(parent.header.id), parent.header.gallery_id, &ctx.user),
        );
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        media.header.sequence = match parse_entry_name(&stem).number {
            Some(n) => n as i32,
            None => (parent.child_media_ids.len() + parent.pending_children.len()) as i32,
        };
        media.set_album_dir(settings, parent.full_path());
        media.original.set_physical_path(path)?;

        let dimensions = match kind {
            MediaKind::Image => Some(get_dimensions(ctx.backend.as_ref(), path)?),
            _ => None,
        };
        let inspection = match kind {
            MediaKind::Video | MediaKind::Audio => inspect(ctx, settings, path, &media.header),
            _ => None,
        };
        let original_dims = inspection
            .as_ref()
            .and_then(|o| o.display_dimensions())
            .or(dimensions);
        media.original.record_file(original_dims)?;
        media.metadata = metadata::extract(
            path,
            &ExtractionSources {
                dimensions,
                file_size_kb: Some(media.original.file_size_kb),
                encoder: inspection.as_ref(),
                existing_title: None,
            },
        );
        media.title = metadata::find(&media.metadata, MetaName::Title)
            .unwrap_or(stem.as_str())
            .to_string();
        tracing::debug!(file = %path.display(), %kind, "media asset built");
        Ok(media)
    }

    /// A new external media object: embed HTML instead of a file.
    pub fn create_external(
        ctx: &GalleryContext,
        parent: &Album,
        title: &str,
        html: &str,
    ) -> Result<Self, AssetError> {
        if parent.header.is_new() {
            return Err(AssetError::Validation(
                "parent album must be saved before adding media".into(),
            ));
        }
        if html.trim().is_empty() {
            return Err(AssetError::Validation("external media needs HTML".into()));
        }
        let settings = ctx.gallery_settings(parent.header.gallery_id)?;
        let mut media = Self::blank(
            MediaKind::External,
            AssetHeader::new(Some(parent.header.id), parent.header.gallery_id, &ctx.user),
        );
        media.set_album_dir(&settings, parent.full_path());
        media.title = title.to_string();
        media.original.external_html = Some(html.to_string());
        metadata::set(&mut media.metadata, MetaName::Title, title);
        Ok(media)
    }

    pub fn ensure_inflated(&mut self, ctx: &GalleryContext) -> Result<(), AssetError> {
        if self.header.state() != InflationState::Uninflated {
            return Ok(());
        }
        let id = self.header.id;
        let row = ctx
            .store
            .find_media(id)?
            .ok_or(AssetError::NotFound { kind: "media", id })?;
        let parent_id = row.header.parent_id.ok_or_else(|| AssetError::InflationContract {
            id,
            reason: "media asset without an album".into(),
        })?;
        let album = Album::load(ctx, parent_id)?;
        let settings = ctx.gallery_settings(album.header.gallery_id)?;

        let mut loaded = Self::blank(row.kind, AssetHeader::from_row(&row.header));
        // Media inherit the gallery of their album.
        loaded.header.gallery_id = album.header.gallery_id;
        loaded.title = row.title.clone();
        loaded.metadata = row.metadata.clone();
        loaded.set_album_dir(&settings, album.full_path());
        loaded.original.apply_row(&row.original, album.full_path())?;
        loaded.original.external_html = row.external_html.clone();
        loaded.thumbnail.apply_row(
            &row.thumbnail,
            &settings.derivative_dir(album.full_path(), DerivativeType::Thumbnail),
        )?;
        let optimized_dir = if shares_original(&row) {
            album.full_path().to_path_buf()
        } else {
            settings.derivative_dir(album.full_path(), DerivativeType::Optimized)
        };
        loaded.optimized.apply_row(&row.optimized, &optimized_dir)?;
        loaded.backfill_ids(id);
        let mut persisted = row;
        persisted.header.gallery_id = album.header.gallery_id;
        loaded.persisted = Some(persisted);
        *self = loaded;

        check_inflated(id, self.header.id, self.header.state(), self.is_dirty())?;
        Ok(())
    }

    /// Whether persisted fields or pending derivative work differ from what
    /// was last loaded or saved.
    pub fn is_dirty(&self) -> bool {
        let changed = match &self.persisted {
            Some(row) => *row != self.to_row(),
            None => true,
        };
        changed || self.regenerate_on_save || !self.pending_orientation.is_identity()
    }

    pub fn asset_kind(&self) -> AssetKind {
        AssetKind::Media(self.kind)
    }

    pub fn to_row(&self) -> MediaRow {
        MediaRow {
            header: self.header.to_row(),
            kind: self.kind,
            title: self.title.clone(),
            original: self.original.to_row(),
            thumbnail: self.thumbnail.to_row(),
            optimized: self.optimized.to_row(),
            external_html: self.original.external_html.clone(),
            metadata: self.metadata.clone(),
        }
    }

    pub fn record(&self, derivative: DerivativeType) -> &DerivativeRecord {
        match derivative {
            DerivativeType::Thumbnail => &self.thumbnail,
            DerivativeType::Optimized => &self.optimized,
            DerivativeType::Original => &self.original,
        }
    }

    pub fn record_mut(&mut self, derivative: DerivativeType) -> &mut DerivativeRecord {
        match derivative {
            DerivativeType::Thumbnail => &mut self.thumbnail,
            DerivativeType::Optimized => &mut self.optimized,
            DerivativeType::Original => &mut self.original,
        }
    }

    /// Directory of the album holding the original.
    pub fn album_dir(&self) -> &Path {
        &self.album_dir
    }

    /// Request a rotation and/or flip, applied on the next save.
    pub fn rotate(&mut self, orientation: Orientation) {
        self.pending_orientation = orientation;
        self.original_rotated = false;
    }

    pub fn pending_orientation(&self) -> Orientation {
        self.pending_orientation
    }

    pub fn rotation_requested(&self) -> bool {
        !self.pending_orientation.is_identity()
    }

    /// Orientation to apply when reading the original: none once the
    /// original itself has been rewritten.
    pub fn source_orientation(&self) -> Orientation {
        if self.original_rotated {
            Orientation::default()
        } else {
            self.pending_orientation
        }
    }

    /// Original dimensions as the derivatives will show them, with any
    /// pending rotation applied.
    pub fn upright_dimensions(&self) -> Option<(u32, u32)> {
        let dims = (self.original.width?, self.original.height?);
        Some(rotated_dimensions(dims, self.source_orientation().rotation.swaps_axes()))
    }

    pub fn original_rotated(&self) -> bool {
        self.original_rotated
    }

    pub(crate) fn mark_original_rotated(&mut self) {
        self.original_rotated = true;
    }

    pub(super) fn backfill_ids(&mut self, id: AssetId) {
        for derivative in DerivativeType::ALL {
            self.record_mut(derivative).media_id = id;
        }
    }

    /// Point the derivative records at the directories of `album_dir`.
    pub(super) fn set_album_dir(&mut self, settings: &GallerySettings, album_dir: &Path) {
        self.album_dir = album_dir.to_path_buf();
        let roots = [
            album_dir.to_path_buf(),
            settings.derivative_dir(album_dir, DerivativeType::Thumbnail),
            settings.derivative_dir(album_dir, DerivativeType::Optimized),
        ];
        for derivative in DerivativeType::ALL {
            self.record_mut(derivative).set_allowed_roots(roots.iter().cloned());
        }
    }

    /// Re-resolve physical paths after the album directory moved.
    pub(super) fn relocate(&mut self, settings: &GallerySettings, album_dir: &Path) -> Result<(), AssetError> {
        let shared = self.optimized.shares_file_with(&self.original);
        self.set_album_dir(settings, album_dir);
        for derivative in DerivativeType::ALL {
            let dir = if derivative == DerivativeType::Optimized && shared {
                album_dir.to_path_buf()
            } else {
                settings.derivative_dir(album_dir, derivative)
            };
            let record = self.record_mut(derivative);
            if !record.file_name.is_empty() {
                let path = dir.join(&record.file_name);
                record.set_physical_path(path)?;
            }
        }
        Ok(())
    }

    /// Run the generator of one derivative.
    pub fn generate(
        &mut self,
        derivative: DerivativeType,
        env: &GenerationEnv,
    ) -> Result<GenerationOutcome, GeneratorError> {
        let generator = self.record(derivative).generator;
        generator.generate_and_save(self, env)
    }

    /// Path of a derivative file, generating it first when it is absent.
    ///
    /// `None` when the derivative has no file at all, e.g. the original of
    /// an external media object.
    pub fn derivative_path(
        &mut self,
        ctx: &GalleryContext,
        derivative: DerivativeType,
    ) -> Result<Option<PathBuf>, AssetError> {
        self.ensure_inflated(ctx)?;
        if !self.record(derivative).exists() && derivative != DerivativeType::Original {
            let settings = ctx.gallery_settings(self.header.gallery_id)?;
            let env = GenerationEnv::new(ctx, &settings, self.event_context());
            let outcome = self.generate(derivative, &env)?;
            if outcome.changed() && !self.header.is_new() {
                let mut row = self.to_row();
                ctx.store.save_media(&mut row)?;
                self.persisted = Some(row);
                ctx.cache.evict(crate::cache::AssetRef::Media(self.header.id));
            }
        }
        Ok(self.record(derivative).physical_path().map(Path::to_path_buf))
    }

    /// Re-read metadata from the original file. A title edited by a user
    /// is kept, as are tags when no tag sidecar exists.
    pub fn extract_metadata(&mut self, ctx: &GalleryContext) -> Result<(), AssetError> {
        self.ensure_inflated(ctx)?;
        let Some(path) = self.original.physical_path().map(Path::to_path_buf) else {
            return Ok(());
        };
        let settings = ctx.gallery_settings(self.header.gallery_id)?;
        let dimensions = match self.kind {
            MediaKind::Image => Some(get_dimensions(ctx.backend.as_ref(), &path)?),
            _ => None,
        };
        let inspection = match self.kind {
            MediaKind::Video | MediaKind::Audio => inspect(ctx, &settings, &path, &self.header),
            _ => None,
        };
        self.original
            .record_file(inspection.as_ref().and_then(|o| o.display_dimensions()).or(dimensions))?;

        let existing_title = (!self.title.is_empty()).then_some(self.title.as_str());
        let mut items = metadata::extract(
            &path,
            &ExtractionSources {
                dimensions,
                file_size_kb: Some(self.original.file_size_kb),
                encoder: inspection.as_ref(),
                existing_title,
            },
        );
        if metadata::find(&items, MetaName::Tags).is_none()
            && let Some(tags) = metadata::find(&self.metadata, MetaName::Tags)
        {
            items.push(MetaItem::new(MetaName::Tags, tags));
        }
        if let Some(title) = metadata::find(&items, MetaName::Title) {
            self.title = title.to_string();
        }
        self.metadata = items;
        Ok(())
    }

    pub(crate) fn event_context(&self) -> EventContext {
        let context = EventContext::gallery(self.header.gallery_id);
        if self.header.id.is_unassigned() {
            context
        } else {
            context.with_asset(self.header.id)
        }
    }

    pub fn save(&mut self, ctx: &GalleryContext) -> Result<(), AssetError> {
        behavior::save_media(self, ctx)
    }

    /// Delete the asset. With `delete_from_fs == false` the original file
    /// stays on disk; generated derivatives are always removed.
    pub fn delete(&mut self, ctx: &GalleryContext, delete_from_fs: bool) -> Result<(), AssetError> {
        behavior::delete_media(self, ctx, delete_from_fs)
    }
}

fn shares_original(row: &MediaRow) -> bool {
    !row.optimized.file_name.is_empty() && row.optimized.file_name == row.original.file_name
}

/// Run an encoder inspection of a video or audio file.
fn inspect(
    ctx: &GalleryContext,
    settings: &GallerySettings,
    path: &Path,
    header: &AssetHeader,
) -> Option<EncoderOutput> {
    let runner = ctx.encoder(settings);
    if !runner.is_configured() {
        return None;
    }
    let mut context = EventContext::gallery(header.gallery_id);
    if !header.id.is_unassigned() {
        context = context.with_asset(header.id);
    }
    let invocation = EncoderInvocation::new(
        path,
        settings.encoder.inspect_args.clone(),
        Duration::from_millis(settings.encoder.timeout_ms),
    )
    .context(context);
    let output = runner.execute(&invocation);
    (!output.is_empty()).then(|| parse_output(&output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;
    use crate::imaging::{BackendError, Dimensions};
    use crate::test_helpers::{TestGallery, create_test_jpeg};
    use crate::types::GalleryId;
    use std::sync::Arc;

    #[test]
    fn outside_file_is_copied_under_a_free_name() {
        let gallery = TestGallery::new();
        let mut root = gallery.root_album();
        create_test_jpeg(&gallery.media_root().join("photo.jpg"), 20, 20);
        let outside = gallery.path("import/photo.jpg");
        create_test_jpeg(&outside, 30, 20);

        let media = root.add_media_from_file(&gallery.ctx, &outside).unwrap();
        assert_eq!(media.original.file_name, "photo(1).jpg");
        assert!(outside.is_file());
        assert!(root.pending_children().is_empty());
        assert_eq!(root.child_media_ids, vec![media.header.id]);
    }

    #[test]
    fn unsupported_source_cleans_up_after_itself() {
        let gallery = TestGallery::new();
        let mut root = gallery.root_album();
        let outside = gallery.path("import/broken.jpg");
        std::fs::create_dir_all(outside.parent().unwrap()).unwrap();
        std::fs::write(&outside, b"garbage").unwrap();

        let err = MediaAsset::create(&gallery.ctx, &mut root, &outside, None).unwrap_err();
        assert!(matches!(err, AssetError::UnsupportedSource { .. }));
        assert!(root.pending_children().is_empty());
        assert!(!gallery.media_root().join("broken.jpg").exists());
    }

    fn exhausted_gallery() -> (TestGallery, Arc<MockBackend>) {
        let backend = Arc::new(MockBackend::with_dimensions(vec![Dimensions {
            width: 12000,
            height: 9000,
        }]));
        backend.fail_next_resize(BackendError::ResourceExhausted("big".into()));
        backend.fail_next_resize(BackendError::ResourceExhausted("still big".into()));
        let gallery = TestGallery::build(|_, _| {}, backend.clone());
        (gallery, backend)
    }

    #[test]
    fn oversized_import_leaves_nothing_behind() {
        let (gallery, backend) = exhausted_gallery();
        let mut root = gallery.root_album();
        let outside = gallery.path("import/huge.jpg");
        std::fs::create_dir_all(outside.parent().unwrap()).unwrap();
        std::fs::write(&outside, b"pretend this is huge").unwrap();

        let err = root.add_media_from_file(&gallery.ctx, &outside).unwrap_err();
        assert!(matches!(err, AssetError::UnsupportedSource { .. }));
        assert_eq!(backend.resize_count(), 2);
        assert_eq!(gallery.store.media_count(), 0);
        assert!(root.pending_children().is_empty());
        assert!(root.child_media_ids.is_empty());
        assert!(!gallery.media_root().join("huge.jpg").exists());
        assert_eq!(std::fs::read_dir(gallery.media_root()).unwrap().count(), 0);
        assert!(outside.is_file());
    }

    #[test]
    fn oversized_file_in_place_is_kept_on_disk() {
        let (gallery, _backend) = exhausted_gallery();
        let mut root = gallery.root_album();
        let path = gallery.media_root().join("huge.jpg");
        std::fs::write(&path, b"pretend this is huge").unwrap();

        let err = root.add_media_from_file(&gallery.ctx, &path).unwrap_err();
        assert!(matches!(err, AssetError::UnsupportedSource { .. }));
        assert_eq!(gallery.store.media_count(), 0);
        assert!(root.pending_children().is_empty());
        assert!(root.child_media_ids.is_empty());
        assert!(path.is_file());
    }

    #[test]
    fn numbered_file_sets_sequence_and_title() {
        let gallery = TestGallery::new();
        let mut root = gallery.root_album();
        let path = gallery.media_root().join("007-Old-Harbour.jpg");
        create_test_jpeg(&path, 20, 20);

        let media = root.add_media_from_file(&gallery.ctx, &path).unwrap();
        assert_eq!(media.header.sequence, 7);
        assert_eq!(media.title, "Old Harbour");
    }

    #[test]
    fn external_media_needs_html() {
        let gallery = TestGallery::new();
        let root = gallery.root_album();
        let err = MediaAsset::create_external(&gallery.ctx, &root, "Clip", "  ").unwrap_err();
        assert!(matches!(err, AssetError::Validation(_)));

        let mut media =
            MediaAsset::create_external(&gallery.ctx, &root, "Clip", "<iframe src=\"x\"></iframe>").unwrap();
        media.save(&gallery.ctx).unwrap();
        assert!(media.thumbnail.exists());
        assert!(media.original.physical_path().is_none());
        assert!(media.optimized.file_name.is_empty());
    }

    #[test]
    fn loaded_media_takes_gallery_from_album() {
        let gallery = TestGallery::new();
        let mut root = gallery.root_album();
        let path = gallery.media_root().join("a.jpg");
        create_test_jpeg(&path, 20, 20);
        let media = root.add_media_from_file(&gallery.ctx, &path).unwrap();

        // Reassign the album; the media row still names the old gallery.
        root.header.gallery_id = GalleryId(2);
        root.save(&gallery.ctx).unwrap();

        let loaded = MediaAsset::load(&gallery.ctx, media.header.id).unwrap();
        assert_eq!(loaded.header.gallery_id, GalleryId(2));
        assert!(!loaded.is_dirty());
    }

    #[test]
    fn missing_thumbnail_is_generated_on_access() {
        let gallery = TestGallery::new();
        let mut root = gallery.root_album();
        let path = gallery.media_root().join("a.jpg");
        create_test_jpeg(&path, 40, 30);
        let media = root.add_media_from_file(&gallery.ctx, &path).unwrap();
        let thumb = media.thumbnail.physical_path().unwrap().to_path_buf();
        std::fs::remove_file(&thumb).unwrap();

        let mut loaded = MediaAsset::load(&gallery.ctx, media.header.id).unwrap();
        let resolved = loaded
            .derivative_path(&gallery.ctx, DerivativeType::Thumbnail)
            .unwrap();
        assert_eq!(resolved.as_deref(), Some(thumb.as_path()));
        assert!(thumb.is_file());
    }

    #[test]
    fn user_title_survives_metadata_refresh() {
        let gallery = TestGallery::new();
        let mut root = gallery.root_album();
        let path = gallery.media_root().join("001-dawn.jpg");
        create_test_jpeg(&path, 20, 20);
        let mut media = root.add_media_from_file(&gallery.ctx, &path).unwrap();

        media.title = "First light".to_string();
        std::fs::write(gallery.media_root().join("001-dawn.txt"), "Over the bay").unwrap();
        media.extract_metadata(&gallery.ctx).unwrap();

        assert_eq!(media.title, "First light");
        assert_eq!(metadata::find(&media.metadata, MetaName::Caption), Some("Over the bay"));
    }

    #[test]
    fn moving_to_another_album_moves_files() {
        let gallery = TestGallery::new();
        let mut root = gallery.root_album();
        let other = root.add_child_album(&gallery.ctx, "Other").unwrap();
        let path = gallery.media_root().join("a.jpg");
        create_test_jpeg(&path, 40, 30);
        let mut media = root.add_media_from_file(&gallery.ctx, &path).unwrap();

        media.header.parent_id = Some(other.header.id);
        media.save(&gallery.ctx).unwrap();

        assert!(!path.exists());
        assert_eq!(media.original.physical_path(), Some(gallery.media_root().join("Other/a.jpg").as_path()));
        assert!(media.thumbnail.exists());
        assert!(media.optimized.shares_file_with(&media.original));

        let reloaded = Album::load(&gallery.ctx, other.header.id).unwrap();
        assert_eq!(reloaded.child_media_ids, vec![media.header.id]);
        assert_eq!(reloaded.thumbnail_media_id, Some(media.header.id));
    }
}
