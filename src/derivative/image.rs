//! Image derivatives.
//!
//! The optimized image is only worth a separate file when the original is
//! too big or not a JPEG:
//!
//! ```text
//! required = (missing || forced || rotation pending) && (exceeds trigger || not JPEG)
//! exceeds trigger = size KB > trigger KB || longer side > optimized max length
//! ```
//!
//! When no separate file is required the optimized record points at the
//! original.

use super::{
    GenerationEnv, GenerationOutcome, GeneratorError, regeneration_required, reuse_original,
    source_dimensions, source_path, target_path,
};
use crate::asset::MediaAsset;
use crate::config::GallerySettings;
use crate::imaging::{Quality, ScaledCopy, create_scaled_copy, get_dimensions, transform_in_place};
use crate::types::DerivativeType;
use std::path::Path;

pub(super) fn thumbnail(media: &mut MediaAsset, env: &GenerationEnv) -> Result<GenerationOutcome, GeneratorError> {
    if !regeneration_required(media, DerivativeType::Thumbnail) {
        return Ok(GenerationOutcome::Unchanged);
    }
    let source = source_path(media)?;
    let dims = source_dimensions(media, env, &source)?;
    let target = target_path(media, DerivativeType::Thumbnail, Some("jpg"), env.settings)?;
    let written = create_scaled_copy(
        env.backend,
        &source,
        &target,
        dims,
        &ScaledCopy {
            max_length: env.settings.thumbnail.max_length,
            quality: Quality::new(env.settings.thumbnail.quality),
            orientation: media.source_orientation(),
            upscale: true,
        },
    )?;
    let record = &mut media.thumbnail;
    record.set_physical_path(&target)?;
    record.record_file(Some(written))?;
    Ok(GenerationOutcome::Generated)
}

/// Whether the original is big enough, or in the wrong format, to warrant
/// a separate optimized file.
pub(super) fn optimized_needed(media: &MediaAsset, settings: &GallerySettings) -> bool {
    let original = &media.original;
    let exceeds = original.file_size_kb > settings.optimized.trigger_size_kb
        || original
            .longer_side()
            .is_some_and(|side| side > settings.optimized.max_length);
    let wrong_format = !Path::new(&original.file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| e == "jpg" || e == "jpeg");
    exceeds || wrong_format
}

pub(super) fn optimized(media: &mut MediaAsset, env: &GenerationEnv) -> Result<GenerationOutcome, GeneratorError> {
    let triggered = regeneration_required(media, DerivativeType::Optimized);
    if !(triggered && optimized_needed(media, env.settings)) {
        let unset = media.optimized.file_name.is_empty();
        if unset || media.optimized.shares_file_with(&media.original) {
            return Ok(reuse_original(media));
        }
        return Ok(GenerationOutcome::Unchanged);
    }

    let source = source_path(media)?;
    let dims = source_dimensions(media, env, &source)?;
    let target = target_path(media, DerivativeType::Optimized, Some("jpg"), env.settings)?;
    let written = create_scaled_copy(
        env.backend,
        &source,
        &target,
        dims,
        &ScaledCopy {
            max_length: env.settings.optimized.max_length,
            quality: Quality::new(env.settings.optimized.quality),
            orientation: media.source_orientation(),
            upscale: false,
        },
    )?;
    let record = &mut media.optimized;
    record.set_physical_path(&target)?;
    record.record_file(Some(written))?;
    Ok(GenerationOutcome::Generated)
}

/// Apply a pending rotation to the original file itself.
pub(super) fn original(media: &mut MediaAsset, env: &GenerationEnv) -> Result<GenerationOutcome, GeneratorError> {
    if !media.rotation_requested() || media.original_rotated() {
        return Ok(GenerationOutcome::Unchanged);
    }
    let source = source_path(media)?;
    transform_in_place(
        env.backend,
        &source,
        media.pending_orientation(),
        Quality::new(env.settings.original.quality),
    )?;
    let dims = get_dimensions(env.backend, &source)?;
    media.original.record_file(Some(dims))?;
    media.mark_original_rotated();
    Ok(GenerationOutcome::Generated)
}
