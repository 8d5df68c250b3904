//! Default representations for media without renderable pixels.

use super::{GenerationEnv, GenerationOutcome, GeneratorError, regeneration_required, target_path};
use crate::asset::MediaAsset;
use crate::imaging::{Quality, create_placeholder};
use crate::types::DerivativeType;
use std::path::Path;

pub(super) fn thumbnail(media: &mut MediaAsset, env: &GenerationEnv) -> Result<GenerationOutcome, GeneratorError> {
    if !regeneration_required(media, DerivativeType::Thumbnail) {
        return Ok(GenerationOutcome::Unchanged);
    }
    let target = target_path(media, DerivativeType::Thumbnail, Some("jpg"), env.settings)?;
    write(media, env, DerivativeType::Thumbnail, &target)?;
    Ok(GenerationOutcome::Generated)
}

/// Render a placeholder at `target` and point the record at it.
pub(super) fn write(
    media: &mut MediaAsset,
    env: &GenerationEnv,
    derivative: DerivativeType,
    target: &Path,
) -> Result<(), GeneratorError> {
    let (max_length, quality) = match derivative {
        DerivativeType::Optimized => (env.settings.optimized.max_length, env.settings.optimized.quality),
        _ => (env.settings.thumbnail.max_length, env.settings.thumbnail.quality),
    };
    let written = create_placeholder(env.backend, target, max_length, Quality::new(quality))?;
    let record = media.record_mut(derivative);
    record.set_physical_path(target)?;
    record.record_file(Some(written))?;
    Ok(())
}
