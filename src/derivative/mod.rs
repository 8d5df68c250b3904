//! Derivative generators.
//!
//! Every (media kind, derivative type) pair maps to one [`Generator`] through
//! a small registry. A generator's `generate_and_save` is an idempotent
//! decision function: it first decides whether the derivative file must be
//! (re)created and only then does the work, writing the result back onto the
//! asset's [`DerivativeRecord`](crate::asset::DerivativeRecord).
//!
//! | Kind | Thumbnail | Optimized | Original |
//! |---|---|---|---|
//! | image | scaled JPEG | scaled JPEG or the original | rotated in place |
//! | video | encoder frame grab, placeholder fallback | encoder transcode or the original | kept |
//! | audio | placeholder | encoder transcode or the original | kept |
//! | generic | placeholder | the original | kept |
//! | external | placeholder | the original (none) | kept |
//!
//! A thumbnail, or any derivative of an image, is regenerated when its file is
//! missing, the asset asks for regeneration, or a rotation is pending. See
//! [`image`] for the extra conditions of optimized images.

mod encoded;
mod image;
mod placeholder;

use crate::asset::{MediaAsset, PathOutsideRoots};
use crate::config::GallerySettings;
use crate::context::GalleryContext;
use crate::encoder::{CancellationSignal, EncoderRunner};
use crate::events::EventContext;
use crate::imaging::{ImageBackend, ImageOpError};
use crate::naming::{derivative_file_name, sanitize_name, unique_file_name};
use crate::types::{DerivativeType, MediaKind};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] ImageOpError),
    #[error(transparent)]
    PathOutsideRoots(#[from] PathOutsideRoots),
    #[error("Original file of {0} is missing")]
    SourceMissing(String),
}

/// What a `generate_and_save` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Nothing needed doing.
    Unchanged,
    /// A new file was written.
    Generated,
    /// The record now describes the original instead of a separate file.
    Reused,
    /// Producing the file failed softly; a default representation is used.
    Fallback,
}

impl GenerationOutcome {
    /// Whether the asset's derivative record changed.
    pub fn changed(self) -> bool {
        self != GenerationOutcome::Unchanged
    }
}

/// Ways of producing a derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generator {
    ImageThumbnail,
    ImageOptimized,
    /// Applies a pending rotation to the original file.
    ImageOriginal,
    VideoThumbnail,
    /// Transcodes video or audio with the external encoder.
    EncodedOptimized,
    Placeholder,
    /// The original doubles as the derivative.
    PassThrough,
    /// Nothing to generate.
    Keep,
}

const REGISTRY: &[(MediaKind, DerivativeType, Generator)] = &[
    (MediaKind::Image, DerivativeType::Thumbnail, Generator::ImageThumbnail),
    (MediaKind::Image, DerivativeType::Optimized, Generator::ImageOptimized),
    (MediaKind::Image, DerivativeType::Original, Generator::ImageOriginal),
    (MediaKind::Video, DerivativeType::Thumbnail, Generator::VideoThumbnail),
    (MediaKind::Video, DerivativeType::Optimized, Generator::EncodedOptimized),
    (MediaKind::Audio, DerivativeType::Thumbnail, Generator::Placeholder),
    (MediaKind::Audio, DerivativeType::Optimized, Generator::EncodedOptimized),
    (MediaKind::Generic, DerivativeType::Thumbnail, Generator::Placeholder),
    (MediaKind::Generic, DerivativeType::Optimized, Generator::PassThrough),
    (MediaKind::External, DerivativeType::Thumbnail, Generator::Placeholder),
    (MediaKind::External, DerivativeType::Optimized, Generator::PassThrough),
];

/// The generator registered for a kind and derivative type.
pub fn generator_for(kind: MediaKind, derivative: DerivativeType) -> Generator {
    REGISTRY
        .iter()
        .find(|(k, d, _)| *k == kind && *d == derivative)
        .map(|(_, _, g)| *g)
        .unwrap_or(Generator::Keep)
}

/// Services a generator runs with.
pub struct GenerationEnv<'a> {
    pub settings: &'a GallerySettings,
    pub backend: &'a dyn ImageBackend,
    pub encoder: EncoderRunner,
    pub cancel: CancellationSignal,
    pub context: EventContext,
}

impl<'a> GenerationEnv<'a> {
    pub fn new(ctx: &'a GalleryContext, settings: &'a GallerySettings, context: EventContext) -> Self {
        Self {
            settings,
            backend: ctx.backend.as_ref(),
            encoder: ctx.encoder(settings),
            cancel: CancellationSignal::new(),
            context,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationSignal) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Generator {
    /// Decide whether the derivative must be (re)created and do so.
    pub fn generate_and_save(
        self,
        media: &mut MediaAsset,
        env: &GenerationEnv,
    ) -> Result<GenerationOutcome, GeneratorError> {
        let outcome = match self {
            Generator::ImageThumbnail => image::thumbnail(media, env),
            Generator::ImageOptimized => image::optimized(media, env),
            Generator::ImageOriginal => image::original(media, env),
            Generator::VideoThumbnail => encoded::video_thumbnail(media, env),
            Generator::EncodedOptimized => encoded::optimized(media, env),
            Generator::Placeholder => placeholder::thumbnail(media, env),
            Generator::PassThrough => Ok(reuse_original(media)),
            Generator::Keep => Ok(GenerationOutcome::Unchanged),
        }?;
        if outcome.changed() {
            tracing::debug!(media = %media.header.id, generator = ?self, ?outcome, "derivative updated");
        }
        Ok(outcome)
    }
}

/// Missing file, forced regeneration or a pending rotation.
pub fn regeneration_required(media: &MediaAsset, derivative: DerivativeType) -> bool {
    !media.record(derivative).exists() || media.regenerate_on_save || media.rotation_requested()
}

/// The original file, which must exist.
fn source_path(media: &MediaAsset) -> Result<PathBuf, GeneratorError> {
    media
        .original
        .physical_path()
        .filter(|p| p.is_file())
        .map(Path::to_path_buf)
        .ok_or_else(|| GeneratorError::SourceMissing(media.original.file_name.clone()))
}

/// Dimensions of the original, from its record or the backend.
fn source_dimensions(media: &MediaAsset, env: &GenerationEnv, source: &Path) -> Result<(u32, u32), GeneratorError> {
    match (media.original.width, media.original.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => Ok(crate::imaging::get_dimensions(env.backend, source)?),
    }
}

/// Where a derivative is written.
///
/// An existing file of the derivative is reused (as long as it is not the
/// original itself and has the wanted extension). Otherwise a collision-free
/// `prefix + name` is picked in the derivative directory, which is created.
pub fn target_path(
    media: &MediaAsset,
    derivative: DerivativeType,
    extension: Option<&str>,
    settings: &GallerySettings,
) -> Result<PathBuf, GeneratorError> {
    let record = media.record(derivative);
    if let Some(existing) = record.physical_path()
        && !record.shares_file_with(&media.original)
        && extension_matches(existing, extension)
    {
        return Ok(existing.to_path_buf());
    }

    let dir = settings.derivative_dir(media.album_dir(), derivative);
    std::fs::create_dir_all(&dir)?;
    let base = if media.original.file_name.is_empty() {
        sanitize_name(&media.title)
    } else {
        media.original.file_name.clone()
    };
    let desired = derivative_file_name(settings.file_prefix(derivative), &base, extension);
    Ok(dir.join(unique_file_name(&dir, &desired)))
}

fn extension_matches(path: &Path, extension: Option<&str>) -> bool {
    match extension {
        None => true,
        Some(ext) => path
            .extension()
            .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext.trim_start_matches('.'))),
    }
}

/// Point the optimized record at the original file.
fn use_original_as_optimized(media: &mut MediaAsset) -> bool {
    let original = media.original.clone();
    media.optimized.copy_from(&original)
}

/// [`use_original_as_optimized`], reported as an outcome.
fn reuse_original(media: &mut MediaAsset) -> GenerationOutcome {
    if use_original_as_optimized(media) {
        GenerationOutcome::Reused
    } else {
        GenerationOutcome::Unchanged
    }
}
