//! External encoder (ffmpeg-compatible) integration.
//!
//! - **Template**: placeholder substitution and the rotation filter chain
//! - **Runner**: process supervision with timeout and cancellation
//! - **Parser**: dimensions, rotation hint and duration from the output text

pub mod parser;
pub mod runner;
pub mod template;

use thiserror::Error;

pub use parser::{EncoderOutput, parse_output};
pub use runner::{CancellationSignal, EncoderInvocation, EncoderRunner};
pub use template::{TemplateValues, render_args, rotation_filter, split_args};

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("No encoder executable configured")]
    NotConfigured,
    #[error("Encoder executable not found: {0}")]
    ToolMissing(String),
    #[error("Failed to start encoder: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Encoder timed out after {timeout_ms} ms: {command}")]
    Timeout { timeout_ms: u64, command: String },
    #[error("Encoder run cancelled")]
    Cancelled,
    #[error("Encoder exited with status {code:?}")]
    NonZeroExit { code: Option<i32>, output: String },
}
