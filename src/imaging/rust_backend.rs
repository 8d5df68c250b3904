//! Pure Rust image processing backend built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, BMP, TIFF, WebP) | `image` crate decoders |
//! | Identify | `ImageReader::into_dimensions` (header only) |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Rotate / flip | `DynamicImage::rotate90` / `rotate180` / `rotate270`, `fliph` / `flipv` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` with explicit quality |
//!
//! Decoding runs under an allocation limit. Exceeding it surfaces as
//! [`BackendError::ResourceExhausted`] so the caller can release memory and
//! retry once.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::{PlaceholderParams, ResizeParams, TransformParams};
use crate::types::{Flip, Orientation, Rotation};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder, ImageError, ImageReader, Limits, Rgb, RgbImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Default decode allocation budget (512 MiB).
pub const DEFAULT_MAX_ALLOC: u64 = 512 * 1024 * 1024;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend {
    max_alloc: Option<u64>,
}

impl RustBackend {
    pub fn new() -> Self {
        Self {
            max_alloc: Some(DEFAULT_MAX_ALLOC),
        }
    }

    /// Backend with a custom decode allocation budget. `None` disables the
    /// limit.
    pub fn with_max_alloc(max_alloc: Option<u64>) -> Self {
        Self { max_alloc }
    }

    fn load_image(&self, path: &Path) -> Result<DynamicImage, BackendError> {
        let mut reader = ImageReader::open(path)?
            .with_guessed_format()
            .map_err(BackendError::Io)?;
        let mut limits = Limits::default();
        limits.max_alloc = self.max_alloc;
        reader.limits(limits);
        reader.decode().map_err(|e| map_image_error(path, e))
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn map_image_error(path: &Path, error: ImageError) -> BackendError {
    match error {
        ImageError::Limits(e) => {
            BackendError::ResourceExhausted(format!("{}: {e}", path.display()))
        }
        ImageError::Unsupported(e) => BackendError::Unsupported(format!("{}: {e}", path.display())),
        ImageError::Decoding(e) => BackendError::Unsupported(format!("{}: {e}", path.display())),
        ImageError::IoError(e) => BackendError::Io(e),
        other => BackendError::ProcessingFailed(format!(
            "Failed to process {}: {other}",
            path.display()
        )),
    }
}

/// Apply rotation first, then the mirror.
fn apply_orientation(img: DynamicImage, orientation: Orientation) -> DynamicImage {
    let rotated = match orientation.rotation {
        Rotation::None => img,
        Rotation::Rotate90 => img.rotate90(),
        Rotation::Rotate180 => img.rotate180(),
        Rotation::Rotate270 => img.rotate270(),
    };
    match orientation.flip {
        Flip::None => rotated,
        Flip::Horizontal => rotated.fliph(),
        Flip::Vertical => rotated.flipv(),
    }
}

fn is_jpeg_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
}

fn ensure_parent(path: &Path) -> Result<(), BackendError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Write `img` to `path`. JPEG outputs honour `quality`; other extensions use
/// the `image` crate's format inference.
fn save_image(img: &DynamicImage, path: &Path, quality: u32) -> Result<(), BackendError> {
    ensure_parent(path)?;
    if is_jpeg_path(path) {
        let rgb = img.to_rgb8();
        let writer = BufWriter::new(File::create(path)?);
        JpegEncoder::new_with_quality(writer, quality.clamp(1, 100) as u8)
            .write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| {
                BackendError::ProcessingFailed(format!(
                    "Failed to encode {}: {e}",
                    path.display()
                ))
            })
    } else {
        img.save(path).map_err(|e| map_image_error(path, e))
    }
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = ImageReader::open(path)?
            .with_guessed_format()
            .map_err(BackendError::Io)?
            .into_dimensions()
            .map_err(|e| map_image_error(path, e))?;
        Ok(Dimensions { width, height })
    }

    fn resize(&self, params: &ResizeParams) -> Result<(), BackendError> {
        let img = self.load_image(&params.source)?;
        let oriented = apply_orientation(img, params.orientation);
        let resized = oriented.resize_exact(params.width, params.height, FilterType::Lanczos3);
        save_image(&resized, &params.output, params.quality.value())
    }

    fn transform(&self, params: &TransformParams) -> Result<(), BackendError> {
        if params.orientation.is_identity() {
            return Ok(());
        }
        let img = self.load_image(&params.path)?;
        let oriented = apply_orientation(img, params.orientation);
        save_image(&oriented, &params.path, params.quality.value())
    }

    fn placeholder(&self, params: &PlaceholderParams) -> Result<(), BackendError> {
        let (w, h) = (params.width.max(1), params.height.max(1));
        let img = RgbImage::from_fn(w, h, |x, y| {
            if x == 0 || y == 0 || x == w - 1 || y == h - 1 {
                Rgb([160, 160, 160])
            } else {
                Rgb([224, 224, 224])
            }
        });
        save_image(
            &DynamicImage::ImageRgb8(img),
            &params.output,
            params.quality.value(),
        )
    }
}
