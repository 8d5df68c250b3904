//! Shared identifiers and small value types used across the engine.
//!
//! These types are persisted in store rows, cached in projections and passed
//! between the asset, derivative and cache layers, so they must stay small,
//! `Copy` where possible, and serde-compatible.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Identifier of an album or media asset.
///
/// A freshly constructed asset carries [`AssetId::UNASSIGNED`] until the
/// store persists it for the first time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub i64);

impl AssetId {
    pub const UNASSIGNED: AssetId = AssetId(i64::MIN);

    pub fn is_unassigned(self) -> bool {
        self == Self::UNASSIGNED
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unassigned() {
            write!(f, "<unassigned>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Identifier of a gallery. Every asset belongs to exactly one gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GalleryId(pub i32);

impl fmt::Display for GalleryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three derived representations every media asset owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivativeType {
    Thumbnail,
    Optimized,
    Original,
}

impl DerivativeType {
    pub const ALL: [DerivativeType; 3] = [
        DerivativeType::Thumbnail,
        DerivativeType::Optimized,
        DerivativeType::Original,
    ];
}

impl fmt::Display for DerivativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DerivativeType::Thumbnail => "thumbnail",
            DerivativeType::Optimized => "optimized",
            DerivativeType::Original => "original",
        };
        f.write_str(name)
    }
}

/// Broad MIME family of a file, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MimeCategory {
    Image,
    Video,
    Audio,
    Other,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "avi", "mkv", "webm", "wmv", "mpg", "mpeg", "flv", "3gp", "mts",
];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "wav", "wma", "ogg", "oga", "flac", "aac"];

impl MimeCategory {
    /// Classify a path by its (case-insensitive) extension.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        Self::from_extension(&ext)
    }

    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim_start_matches('.').to_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            MimeCategory::Image
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            MimeCategory::Video
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            MimeCategory::Audio
        } else {
            MimeCategory::Other
        }
    }
}

/// Kind of a media asset. Albums are not media and have no kind here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Generic,
    External,
}

impl MediaKind {
    /// The kind a file becomes when first discovered on disk.
    pub fn for_path(path: &Path) -> Self {
        match MimeCategory::from_path(path) {
            MimeCategory::Image => MediaKind::Image,
            MimeCategory::Video => MediaKind::Video,
            MimeCategory::Audio => MediaKind::Audio,
            MimeCategory::Other => MediaKind::Generic,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Generic => "generic",
            MediaKind::External => "external",
        };
        f.write_str(name)
    }
}

/// Discriminant over every asset variant, used to key behaviors and
/// projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Album,
    Media(MediaKind),
}

/// Clockwise rotation applied on top of the stored pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    None,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Rotation {
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Rotate90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Rotate270 => 270,
        }
    }

    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Rotate90),
            180 => Some(Rotation::Rotate180),
            270 => Some(Rotation::Rotate270),
            _ => None,
        }
    }

    /// Whether this rotation exchanges width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Rotate90 | Rotation::Rotate270)
    }
}

/// Mirror applied after rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Flip {
    #[default]
    None,
    Horizontal,
    Vertical,
}

/// A pending rotate/flip request on a media asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub rotation: Rotation,
    pub flip: Flip,
}

impl Orientation {
    pub fn new(rotation: Rotation, flip: Flip) -> Self {
        Self { rotation, flip }
    }

    pub fn is_identity(self) -> bool {
        self.rotation == Rotation::None && self.flip == Flip::None
    }
}
