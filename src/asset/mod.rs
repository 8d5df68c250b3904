//! The lazily-inflated asset model.
//!
//! An asset is either an [`Album`] or a [`MediaAsset`]. Each one moves
//! through three inflation states:
//!
//! ```text
//! New ──save──▶ Inflated
//! Uninflated ──ensure_inflated──▶ Inflated
//! ```
//!
//! A `New` asset has no id yet and nothing to load. An `Uninflated` asset
//! knows only its id (e.g. built from a parent's child list); every accessor
//! that needs persisted fields calls `ensure_inflated` first.
//!
//! Saving and deleting are delegated to the behaviors in [`behavior`], picked
//! by asset kind. Media assets own three [`DerivativeRecord`]s whose files are
//! produced by the generators in [`crate::derivative`].

mod album;
pub mod behavior;
mod derivative;
mod media;

pub use album::Album;
pub use behavior::{DeleteBehavior, PostSaveStep, SaveBehavior};
pub use derivative::{DerivativeRecord, PathOutsideRoots, normalize_path};
pub use media::MediaAsset;

use crate::cache::AssetRef;
use crate::config::ConfigError;
use crate::context::GalleryContext;
use crate::derivative::GeneratorError;
use crate::imaging::ImageOpError;
use crate::store::{HeaderRow, StoreError};
use crate::types::{AssetId, AssetKind, GalleryId};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// Remediation shown with directory collisions.
pub const RESYNC_HINT: &str = "run a synchronization of the gallery to repair";

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Loading finished but the asset is not in a consistent inflated state.
    /// This points at a storage or mapping defect.
    #[error("Asset {id} violates the inflation contract: {reason}")]
    InflationContract { id: AssetId, reason: String },
    #[error("{kind} {id} does not exist")]
    NotFound { kind: &'static str, id: AssetId },
    #[error(transparent)]
    PathOutsideRoots(#[from] PathOutsideRoots),
    #[error("Invalid argument: {0}")]
    Validation(String),
    #[error("Unsupported or oversized source {path}: {reason}")]
    UnsupportedSource { path: String, reason: String },
    #[error("Directory {} already exists; {hint}", .path.display())]
    DirectoryCollision { path: PathBuf, hint: &'static str },
    #[error("Derivative generation failed: {0}")]
    Generator(GeneratorError),
}

impl AssetError {
    pub(crate) fn collision(path: PathBuf) -> Self {
        AssetError::DirectoryCollision {
            path,
            hint: RESYNC_HINT,
        }
    }
}

impl From<GeneratorError> for AssetError {
    fn from(e: GeneratorError) -> Self {
        match e {
            GeneratorError::Image(ImageOpError::UnsupportedSource { path, reason }) => {
                AssetError::UnsupportedSource { path, reason }
            }
            GeneratorError::PathOutsideRoots(e) => AssetError::PathOutsideRoots(e),
            other => AssetError::Generator(other),
        }
    }
}

impl From<ImageOpError> for AssetError {
    fn from(e: ImageOpError) -> Self {
        GeneratorError::Image(e).into()
    }
}

/// How much of an asset has been loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflationState {
    /// Not yet persisted; nothing to load.
    New,
    /// Persisted, only the id is known.
    Uninflated,
    /// Fully loaded from the store (or just saved).
    Inflated,
}

/// Fields shared by albums and media assets.
#[derive(Debug, Clone)]
pub struct AssetHeader {
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
    state: InflationState,
}

impl AssetHeader {
    pub fn new(parent_id: Option<AssetId>, gallery_id: GalleryId, user: &str) -> Self {
        let now = Utc::now();
        Self {
            id: AssetId::UNASSIGNED,
            parent_id,
            gallery_id,
            sequence: 0,
            is_private: false,
            is_writable: true,
            created_by: user.to_string(),
            date_added: now,
            last_modified_by: user.to_string(),
            date_modified: now,
            state: InflationState::New,
        }
    }

    /// Header of a persisted asset whose fields have not been loaded.
    pub fn uninflated(id: AssetId) -> Self {
        Self {
            id,
            state: InflationState::Uninflated,
            ..Self::new(None, GalleryId(0), "")
        }
    }

    pub fn from_row(row: &HeaderRow) -> Self {
        Self {
            id: row.id,
            parent_id: row.parent_id,
            gallery_id: row.gallery_id,
            sequence: row.sequence,
            is_private: row.is_private,
            is_writable: row.is_writable,
            created_by: row.created_by.clone(),
            date_added: row.date_added,
            last_modified_by: row.last_modified_by.clone(),
            date_modified: row.date_modified,
            state: InflationState::Inflated,
        }
    }

    pub fn to_row(&self) -> HeaderRow {
        HeaderRow {
            id: self.id,
            parent_id: self.parent_id,
            gallery_id: self.gallery_id,
            sequence: self.sequence,
            is_private: self.is_private,
            is_writable: self.is_writable,
            created_by: self.created_by.clone(),
            date_added: self.date_added,
            last_modified_by: self.last_modified_by.clone(),
            date_modified: self.date_modified,
        }
    }

    pub fn state(&self) -> InflationState {
        self.state
    }

    pub fn is_new(&self) -> bool {
        self.state == InflationState::New
    }

    /// Stamp audit fields before a store write.
    fn touch(&mut self, user: &str) {
        let now = Utc::now();
        if self.is_new() {
            self.created_by = user.to_string();
            self.date_added = now;
        }
        self.last_modified_by = user.to_string();
        self.date_modified = now;
    }

    fn mark_inflated(&mut self) {
        self.state = InflationState::Inflated;
    }
}

/// Check the outcome of a load. `loaded_id` is the id the row carried.
fn check_inflated(
    id: AssetId,
    loaded_id: AssetId,
    state: InflationState,
    dirty: bool,
) -> Result<(), AssetError> {
    if loaded_id != id {
        return Err(AssetError::InflationContract {
            id,
            reason: format!("store returned row {loaded_id}"),
        });
    }
    if state != InflationState::Inflated {
        return Err(AssetError::InflationContract {
            id,
            reason: format!("still {state:?} after loading"),
        });
    }
    if dirty {
        return Err(AssetError::InflationContract {
            id,
            reason: "reports unsaved changes right after loading".into(),
        });
    }
    Ok(())
}

/// Any asset in the gallery tree.
#[derive(Debug, Clone)]
pub enum Asset {
    Album(Album),
    Media(MediaAsset),
}

impl Asset {
    /// Load and inflate an asset.
    pub fn load(ctx: &GalleryContext, asset: AssetRef) -> Result<Self, AssetError> {
        Ok(match asset {
            AssetRef::Album(id) => Asset::Album(Album::load(ctx, id)?),
            AssetRef::Media(id) => Asset::Media(MediaAsset::load(ctx, id)?),
        })
    }

    pub fn header(&self) -> &AssetHeader {
        match self {
            Asset::Album(a) => &a.header,
            Asset::Media(m) => &m.header,
        }
    }

    pub fn id(&self) -> AssetId {
        self.header().id
    }

    pub fn kind(&self) -> AssetKind {
        match self {
            Asset::Album(_) => AssetKind::Album,
            Asset::Media(m) => AssetKind::Media(m.kind),
        }
    }

    pub fn asset_ref(&self) -> AssetRef {
        match self {
            Asset::Album(a) => AssetRef::Album(a.header.id),
            Asset::Media(m) => AssetRef::Media(m.header.id),
        }
    }

    pub fn is_dirty(&self) -> bool {
        match self {
            Asset::Album(a) => a.is_dirty(),
            Asset::Media(m) => m.is_dirty(),
        }
    }

    pub fn ensure_inflated(&mut self, ctx: &GalleryContext) -> Result<(), AssetError> {
        match self {
            Asset::Album(a) => a.ensure_inflated(ctx),
            Asset::Media(m) => m.ensure_inflated(ctx),
        }
    }

    pub fn save(&mut self, ctx: &GalleryContext) -> Result<(), AssetError> {
        match self {
            Asset::Album(a) => a.save(ctx),
            Asset::Media(m) => m.save(ctx),
        }
    }

    pub fn delete(&mut self, ctx: &GalleryContext, delete_from_fs: bool) -> Result<(), AssetError> {
        match self {
            Asset::Album(a) => a.delete(ctx, delete_from_fs),
            Asset::Media(m) => m.delete(ctx, delete_from_fs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_header_is_unassigned_and_new() {
        let header = AssetHeader::new(None, GalleryId(3), "alice");
        assert!(header.id.is_unassigned());
        assert!(header.is_new());
        assert_eq!(header.created_by, "alice");
    }

    #[test]
    fn uninflated_header_keeps_only_the_id() {
        let header = AssetHeader::uninflated(AssetId(9));
        assert_eq!(header.id, AssetId(9));
        assert_eq!(header.state(), InflationState::Uninflated);
    }

    #[test]
    fn header_row_roundtrip_marks_inflated() {
        let mut header = AssetHeader::new(Some(AssetId(1)), GalleryId(2), "bob");
        header.id = AssetId(5);
        let back = AssetHeader::from_row(&header.to_row());
        assert_eq!(back.state(), InflationState::Inflated);
        assert_eq!(back.to_row(), header.to_row());
    }

    #[test]
    fn check_inflated_rejects_dirty_and_mismatched_rows() {
        let ok = check_inflated(AssetId(1), AssetId(1), InflationState::Inflated, false);
        assert!(ok.is_ok());
        for result in [
            check_inflated(AssetId(1), AssetId(2), InflationState::Inflated, false),
            check_inflated(AssetId(1), AssetId(1), InflationState::Uninflated, false),
            check_inflated(AssetId(1), AssetId(1), InflationState::Inflated, true),
        ] {
            assert!(matches!(result, Err(AssetError::InflationContract { .. })));
        }
    }

    #[test]
    fn unsupported_generator_error_becomes_typed_asset_error() {
        let err: AssetError = ImageOpError::UnsupportedSource {
            path: "/a.jpg".into(),
            reason: "corrupt".into(),
        }
        .into();
        assert!(matches!(err, AssetError::UnsupportedSource { .. }));
    }

    #[test]
    fn collision_carries_resync_hint() {
        let err = AssetError::collision(PathBuf::from("/thumbs/Travel"));
        assert!(err.to_string().contains(RESYNC_HINT));
    }
}
