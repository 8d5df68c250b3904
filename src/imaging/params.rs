//! Requests handed to an [`ImageBackend`](super::backend::ImageBackend).
//!
//! Derivative generators fill these in from settings and the media record;
//! the backend only ever sees paths, target sizes and an orientation.

use crate::types::Orientation;
use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Resize `source` to exactly `width` x `height` after applying
/// `orientation`, and write the result to `output`.
///
/// `width`/`height` are the final (post-rotation) dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub quality: Quality,
    pub orientation: Orientation,
}

/// Rewrite `path` in place with `orientation` applied.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformParams {
    pub path: PathBuf,
    pub orientation: Orientation,
    pub quality: Quality,
}

/// Render a neutral stand-in image, used for media whose pixels cannot be
/// derived (documents, audio, failed video grabs).
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderParams {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub quality: Quality,
}
