//! High-level image operations.
//!
//! These functions combine calculations with backend execution. They take
//! the derivative settings, compute parameters, and call the backend.

use super::backend::{BackendError, ImageBackend};
use super::calculations::{
    calculate_fit_dimensions, calculate_scaled_dimensions, rotated_dimensions,
};
use super::params::{PlaceholderParams, Quality, ResizeParams, TransformParams};
use crate::types::Orientation;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageOpError {
    /// Corrupt, unknown, or too large to decode even after a cleanup pass.
    #[error("Unsupported or oversized source {path}: {reason}")]
    UnsupportedSource { path: String, reason: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Get image dimensions using the backend.
pub fn get_dimensions(backend: &dyn ImageBackend, path: &Path) -> Result<(u32, u32), ImageOpError> {
    match backend.identify(path) {
        Ok(dims) => Ok(dims.as_tuple()),
        Err(BackendError::Unsupported(reason)) => Err(ImageOpError::UnsupportedSource {
            path: path.display().to_string(),
            reason,
        }),
        Err(e) => Err(e.into()),
    }
}

/// What to produce from a source image.
#[derive(Debug, Clone, Copy)]
pub struct ScaledCopy {
    pub max_length: u32,
    pub quality: Quality,
    pub orientation: Orientation,
    /// Scale sources smaller than `max_length` up to it. Thumbnails do,
    /// optimized copies keep small sources at their size.
    pub upscale: bool,
}

/// Write a copy of `source` scaled to `max_length` on its longer side,
/// oriented as requested. Returns the written dimensions.
///
/// When the backend runs out of resources the copy is retried exactly once
/// after [`ImageBackend::release_resources`]. A second exhaustion, or a
/// source the backend cannot decode, is reported as
/// [`ImageOpError::UnsupportedSource`].
pub fn create_scaled_copy(
    backend: &dyn ImageBackend,
    source: &Path,
    output: &Path,
    source_dims: (u32, u32),
    copy: &ScaledCopy,
) -> Result<(u32, u32), ImageOpError> {
    let oriented = rotated_dimensions(source_dims, copy.orientation.rotation.swaps_axes());
    let (width, height) = if copy.upscale {
        calculate_scaled_dimensions(oriented, copy.max_length)
    } else {
        calculate_fit_dimensions(oriented, copy.max_length)
    };
    let params = ResizeParams {
        source: source.to_path_buf(),
        output: output.to_path_buf(),
        width,
        height,
        quality: copy.quality,
        orientation: copy.orientation,
    };

    let result = match backend.resize(&params) {
        Err(BackendError::ResourceExhausted(reason)) => {
            tracing::warn!(source = %source.display(), "{reason}; retrying after cleanup");
            backend.release_resources();
            backend.resize(&params)
        }
        other => other,
    };

    match result {
        Ok(()) => Ok((width, height)),
        Err(BackendError::ResourceExhausted(reason) | BackendError::Unsupported(reason)) => {
            Err(ImageOpError::UnsupportedSource {
                path: source.display().to_string(),
                reason,
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Rotate/flip an original file in place. Identity orientations are a no-op.
pub fn transform_in_place(
    backend: &dyn ImageBackend,
    path: &Path,
    orientation: Orientation,
    quality: Quality,
) -> Result<(), ImageOpError> {
    if orientation.is_identity() {
        return Ok(());
    }
    backend
        .transform(&TransformParams {
            path: path.to_path_buf(),
            orientation,
            quality,
        })
        .map_err(|e| match e {
            BackendError::ResourceExhausted(reason) | BackendError::Unsupported(reason) => {
                ImageOpError::UnsupportedSource {
                    path: path.display().to_string(),
                    reason,
                }
            }
            other => other.into(),
        })
}

/// Render a placeholder whose longer side is `max_length`, in 4:3 landscape.
pub fn create_placeholder(
    backend: &dyn ImageBackend,
    output: &Path,
    max_length: u32,
    quality: Quality,
) -> Result<(u32, u32), ImageOpError> {
    let width = max_length.max(1);
    let height = (width * 3 / 4).max(1);
    backend.placeholder(&PlaceholderParams {
        output: output.to_path_buf(),
        width,
        height,
        quality,
    })?;
    Ok((width, height))
}
