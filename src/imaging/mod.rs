//! Image processing on top of the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `ImageReader::into_dimensions` |
//! | **Resize → JPEG** | Lanczos3 + `JpegEncoder` |
//! | **Rotate / flip in place** | `rotate90` / `rotate180` / `rotate270` + `fliph` / `flipv` |
//! | **Placeholder** | flat `RgbImage` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{
    aspect_ratio, calculate_fit_dimensions, calculate_scaled_dimensions, rotated_dimensions,
    size_in_kb,
};
pub use operations::{
    ImageOpError, ScaledCopy, create_placeholder, create_scaled_copy, get_dimensions,
    transform_in_place,
};
pub use params::{PlaceholderParams, Quality, ResizeParams, TransformParams};
pub use rust_backend::RustBackend;
