//! Encoder output parsing.
//!
//! The encoder prints one `Stream ... Video: ... WxH ...` line per video
//! stream: the input stream first, the output stream second. The first
//! dimension match is therefore the source, the next one the destination.
//!
//! Rotation metadata is stored as the angle the *player* must apply, which
//! is the inverse of the rotation the picture needs, so 90 maps to a 270
//! correction and vice versa.

use crate::types::Rotation;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static STREAM_DIMENSIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Video:.*?[\s,](\d{2,5})x(\d{2,5})(?:[\s,\[]|$)").expect("valid regex")
});
static ROTATE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*rotate\s*:\s*(-?\d+)").expect("valid regex"));
static DISPLAY_MATRIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"rotation of (-?\d+(?:\.\d+)?) degrees").expect("valid regex")
});
static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid regex")
});
static BITRATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"bitrate:\s*(\d+)\s*kb/s").expect("valid regex"));

/// Structured facts extracted from encoder output text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncoderOutput {
    pub source_dimensions: Option<(u32, u32)>,
    pub destination_dimensions: Option<(u32, u32)>,
    /// Rotation needed to display the source upright.
    pub rotation: Rotation,
    pub duration: Option<Duration>,
    pub bitrate_kbps: Option<u32>,
}

impl EncoderOutput {
    /// Source dimensions as displayed, i.e. with the rotation hint applied.
    pub fn display_dimensions(&self) -> Option<(u32, u32)> {
        self.source_dimensions.map(|(w, h)| {
            if self.rotation.swaps_axes() {
                (h, w)
            } else {
                (w, h)
            }
        })
    }
}

/// Map the stored rotation metadata angle to the correction it implies.
pub fn rotation_from_metadata(degrees: i32) -> Rotation {
    match degrees.rem_euclid(360) {
        90 => Rotation::Rotate270,
        180 => Rotation::Rotate180,
        270 => Rotation::Rotate90,
        _ => Rotation::None,
    }
}

/// Parse free-form encoder output. Missing facts are left unset.
pub fn parse_output(text: &str) -> EncoderOutput {
    let mut dimensions = text.lines().filter_map(|line| {
        let caps = STREAM_DIMENSIONS.captures(line)?;
        let width = caps[1].parse::<u32>().ok()?;
        let height = caps[2].parse::<u32>().ok()?;
        Some((width, height))
    });
    let source_dimensions = dimensions.next();
    let destination_dimensions = dimensions.next();

    let rotation = if let Some(caps) = ROTATE_TAG.captures(text) {
        caps[1]
            .parse::<i32>()
            .map(rotation_from_metadata)
            .unwrap_or_default()
    } else if let Some(caps) = DISPLAY_MATRIX.captures(text) {
        // The display matrix states the counter-clockwise angle, the
        // negation of the rotate tag.
        caps[1]
            .parse::<f64>()
            .map(|deg| rotation_from_metadata(-(deg.round() as i32)))
            .unwrap_or_default()
    } else {
        Rotation::None
    };

    let duration = DURATION.captures(text).and_then(|caps| {
        let hours: u64 = caps[1].parse().ok()?;
        let minutes: u64 = caps[2].parse().ok()?;
        let seconds: f64 = caps[3].parse().ok()?;
        Some(Duration::from_secs(hours * 3600 + minutes * 60) + Duration::from_secs_f64(seconds))
    });

    let bitrate_kbps = BITRATE
        .captures(text)
        .and_then(|caps| caps[1].parse().ok());

    EncoderOutput {
        source_dimensions,
        destination_dimensions,
        rotation,
        duration,
        bitrate_kbps,
    }
}
