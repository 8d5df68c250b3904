//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the operations every backend must
//! support: identify, resize, transform in place, and placeholder rendering.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Tests use the recording `MockBackend` from this module.

use super::params::{PlaceholderParams, ResizeParams, TransformParams};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The decoder ran out of its memory budget. Callers may retry once
    /// after [`ImageBackend::release_resources`].
    #[error("Insufficient resources to process {0}")]
    ResourceExhausted(String),
    /// The file is not an image the backend can decode.
    #[error("Unsupported image: {0}")]
    Unsupported(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Trait for image processing backends.
///
/// Implementations must be `Sync`: bulk regeneration drives one backend from
/// several rayon workers.
pub trait ImageBackend: Send + Sync {
    /// Get image dimensions without a full decode where possible.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Execute a resize operation.
    fn resize(&self, params: &ResizeParams) -> Result<(), BackendError>;

    /// Rotate and/or flip a file in place.
    fn transform(&self, params: &TransformParams) -> Result<(), BackendError>;

    /// Render a placeholder image.
    fn placeholder(&self, params: &PlaceholderParams) -> Result<(), BackendError>;

    /// Drop any memory the backend holds on to. Called before retrying an
    /// operation that failed with [`BackendError::ResourceExhausted`].
    fn release_resources(&self) {}
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::types::Orientation;
    use std::sync::Mutex;

    /// Mock backend that records operations and writes tiny marker files, so
    /// existence checks in the generators behave as with a real backend.
    #[derive(Default)]
    pub struct MockBackend {
        pub identify_results: Mutex<Vec<Dimensions>>,
        /// Errors returned by upcoming `resize` calls, consumed front to back.
        pub resize_failures: Mutex<Vec<BackendError>>,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Identify(String),
        Resize {
            source: String,
            output: String,
            width: u32,
            height: u32,
            quality: u32,
            orientation: Orientation,
        },
        Transform {
            path: String,
            orientation: Orientation,
        },
        Placeholder {
            output: String,
            width: u32,
            height: u32,
        },
        ReleaseResources,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Dimensions are handed out in order; the last one is repeated.
        pub fn with_dimensions(dims: Vec<Dimensions>) -> Self {
            let mut dims = dims;
            dims.reverse();
            Self {
                identify_results: Mutex::new(dims),
                ..Self::default()
            }
        }

        pub fn fail_next_resize(&self, error: BackendError) {
            self.resize_failures.lock().unwrap().push(error);
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn resize_count(&self) -> usize {
            self.get_operations()
                .iter()
                .filter(|op| matches!(op, RecordedOp::Resize { .. }))
                .count()
        }

        fn touch(path: &Path) -> Result<(), BackendError> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, b"mock")?;
            Ok(())
        }
    }

    impl ImageBackend for MockBackend {
        fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Identify(path.to_string_lossy().to_string()));

            let mut results = self.identify_results.lock().unwrap();
            match results.len() {
                0 => Err(BackendError::Unsupported("No mock dimensions".to_string())),
                1 => Ok(results[0]),
                _ => Ok(results.pop().unwrap()),
            }
        }

        fn resize(&self, params: &ResizeParams) -> Result<(), BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Resize {
                source: params.source.to_string_lossy().to_string(),
                output: params.output.to_string_lossy().to_string(),
                width: params.width,
                height: params.height,
                quality: params.quality.value(),
                orientation: params.orientation,
            });
            let mut failures = self.resize_failures.lock().unwrap();
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
            drop(failures);
            Self::touch(&params.output)
        }

        fn transform(&self, params: &TransformParams) -> Result<(), BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Transform {
                path: params.path.to_string_lossy().to_string(),
                orientation: params.orientation,
            });
            Ok(())
        }

        fn placeholder(&self, params: &PlaceholderParams) -> Result<(), BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Placeholder {
                output: params.output.to_string_lossy().to_string(),
                width: params.width,
                height: params.height,
            });
            Self::touch(&params.output)
        }

        fn release_resources(&self) {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::ReleaseResources);
        }
    }

    #[test]
    fn mock_repeats_last_dimensions() {
        let backend = MockBackend::with_dimensions(vec![
            Dimensions {
                width: 800,
                height: 600,
            },
            Dimensions {
                width: 40,
                height: 30,
            },
        ]);

        let first = backend.identify(Path::new("/a.jpg")).unwrap();
        let second = backend.identify(Path::new("/b.jpg")).unwrap();
        let third = backend.identify(Path::new("/c.jpg")).unwrap();
        assert_eq!(first.as_tuple(), (800, 600));
        assert_eq!(second.as_tuple(), (40, 30));
        assert_eq!(third.as_tuple(), (40, 30));
    }

    #[test]
    fn mock_records_resize_and_writes_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = MockBackend::new();
        let output = tmp.path().join("nested/out.jpg");

        backend
            .resize(&ResizeParams {
                source: "/source.jpg".into(),
                output: output.clone(),
                width: 200,
                height: 150,
                quality: super::super::params::Quality::new(70),
                orientation: Orientation::default(),
            })
            .unwrap();

        assert!(output.exists());
        assert!(matches!(
            &backend.get_operations()[0],
            RecordedOp::Resize {
                width: 200,
                height: 150,
                quality: 70,
                ..
            }
        ));
    }

    #[test]
    fn mock_queued_failure_is_returned_once() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = MockBackend::new();
        backend.fail_next_resize(BackendError::ResourceExhausted("big.jpg".into()));
        let params = ResizeParams {
            source: "/big.jpg".into(),
            output: tmp.path().join("out.jpg"),
            width: 10,
            height: 10,
            quality: Default::default(),
            orientation: Orientation::default(),
        };

        assert!(matches!(
            backend.resize(&params),
            Err(BackendError::ResourceExhausted(_))
        ));
        assert!(backend.resize(&params).is_ok());
    }
}
