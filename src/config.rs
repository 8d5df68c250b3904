//! Gallery settings.
//!
//! Handles loading, validating, and merging gallery configuration files.
//! Configuration is layered: stock defaults are overridden by `gallery.toml`
//! in the configuration directory, which is in turn overridden by an optional
//! per-gallery `gallery-<id>.toml`.
//!
//! ```text
//! config/
//! ├── gallery.toml        # Shared settings (overrides stock defaults)
//! ├── gallery-1.toml      # Gallery 1 overrides
//! └── gallery-2.toml      # Gallery 2 overrides
//! ```
//!
//! ## Derivative directories
//!
//! Thumbnails and optimized files live next to the originals unless an
//! alternate root is configured. With an alternate root, the directory
//! structure below the media root is mirrored:
//!
//! ```text
//! media/010-Travel/001-rome.jpg
//! thumbs/010-Travel/zThumb_001-rome.jpg     # paths.thumbnail_root = "thumbs"
//! ```
//!
//! Config files are sparse: override just the values you want. Unknown keys
//! are rejected to catch typos early.

use crate::types::{DerivativeType, GalleryId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Settings for one gallery.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GallerySettings {
    /// Where originals and (by default) derivatives live.
    pub paths: PathsConfig,
    /// Thumbnail generation.
    pub thumbnail: ThumbnailConfig,
    /// Optimized (web-sized) generation.
    pub optimized: OptimizedConfig,
    /// Original file handling.
    pub original: OriginalConfig,
    /// External encoder (ffmpeg-compatible tool).
    pub encoder: EncoderConfig,
    /// Directory-tree synchronization.
    pub sync: SyncConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for GallerySettings {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            thumbnail: ThumbnailConfig::default(),
            optimized: OptimizedConfig::default(),
            original: OriginalConfig::default(),
            encoder: EncoderConfig::default(),
            sync: SyncConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl GallerySettings {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thumbnail.max_length == 0 {
            return Err(ConfigError::Validation(
                "thumbnail.max_length must be non-zero".into(),
            ));
        }
        if self.optimized.max_length == 0 {
            return Err(ConfigError::Validation(
                "optimized.max_length must be non-zero".into(),
            ));
        }
        for (name, q) in [
            ("thumbnail.quality", self.thumbnail.quality),
            ("optimized.quality", self.optimized.quality),
            ("original.quality", self.original.quality),
        ] {
            if q == 0 || q > 100 {
                return Err(ConfigError::Validation(format!("{name} must be 1-100")));
            }
        }
        if self.thumbnail.file_prefix.is_empty() || self.optimized.file_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "derivative file prefixes must not be empty".into(),
            ));
        }
        if self.thumbnail.file_prefix == self.optimized.file_prefix {
            return Err(ConfigError::Validation(
                "thumbnail and optimized file prefixes must differ".into(),
            ));
        }
        if self.encoder.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "encoder.timeout_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Directory holding a derivative of a file whose original lives in
    /// `original_dir`.
    ///
    /// Originals always resolve to `original_dir`. Thumbnails and optimized
    /// files map `original_dir` below the configured alternate root, or stay
    /// in `original_dir` when no alternate root is configured or the original
    /// directory is outside the media root.
    pub fn derivative_dir(&self, original_dir: &Path, derivative: DerivativeType) -> PathBuf {
        let alternate = match derivative {
            DerivativeType::Original => None,
            DerivativeType::Thumbnail => self.paths.thumbnail_root.as_ref(),
            DerivativeType::Optimized => self.paths.optimized_root.as_ref(),
        };
        match alternate {
            Some(root) => match original_dir.strip_prefix(&self.paths.media_root) {
                Ok(relative) => root.join(relative),
                Err(_) => original_dir.to_path_buf(),
            },
            None => original_dir.to_path_buf(),
        }
    }

    /// Root directory of a derivative type (media root when not relocated).
    pub fn derivative_root(&self, derivative: DerivativeType) -> &Path {
        let alternate = match derivative {
            DerivativeType::Original => None,
            DerivativeType::Thumbnail => self.paths.thumbnail_root.as_deref(),
            DerivativeType::Optimized => self.paths.optimized_root.as_deref(),
        };
        alternate.unwrap_or(&self.paths.media_root)
    }

    /// File name prefix used for a generated derivative.
    pub fn file_prefix(&self, derivative: DerivativeType) -> &str {
        match derivative {
            DerivativeType::Thumbnail => &self.thumbnail.file_prefix,
            DerivativeType::Optimized => &self.optimized.file_prefix,
            DerivativeType::Original => "",
        }
    }

    /// Encoder setting whose source pattern matches a file extension.
    ///
    /// An exact extension match (`.mp3`) wins over a category wildcard
    /// (`*audio`, `*video`).
    pub fn encoder_setting_for(&self, extension: &str) -> Option<&EncoderSetting> {
        let ext = format!(".{}", extension.trim_start_matches('.').to_lowercase());
        let category = match crate::types::MimeCategory::from_extension(&ext) {
            crate::types::MimeCategory::Video => "*video",
            crate::types::MimeCategory::Audio => "*audio",
            crate::types::MimeCategory::Image => "*image",
            crate::types::MimeCategory::Other => "*other",
        };
        self.encoder
            .settings
            .iter()
            .find(|s| s.source.eq_ignore_ascii_case(&ext))
            .or_else(|| {
                self.encoder
                    .settings
                    .iter()
                    .find(|s| s.source.eq_ignore_ascii_case(category))
            })
    }
}

/// Filesystem roots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Directory holding the original files; the root album maps to it.
    pub media_root: PathBuf,
    /// Alternate root for thumbnails (mirrors the media root structure).
    pub thumbnail_root: Option<PathBuf>,
    /// Alternate root for optimized files (mirrors the media root structure).
    pub optimized_root: Option<PathBuf>,
    /// Directory with encoder resources (presets, fonts). Substituted for
    /// `{GalleryResourcesPath}` in encoder arguments.
    pub resources_path: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("media"),
            thumbnail_root: None,
            optimized_root: None,
            resources_path: PathBuf::from("resources"),
        }
    }
}

/// Thumbnail generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailConfig {
    /// Length in pixels of the longer side.
    pub max_length: u32,
    /// JPEG quality (1-100).
    pub quality: u32,
    /// Prefix prepended to generated file names.
    pub file_prefix: String,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_length: 115,
            quality: 70,
            file_prefix: "zThumb_".to_string(),
        }
    }
}

/// Optimized generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizedConfig {
    /// Length in pixels of the longer side.
    pub max_length: u32,
    /// Originals at or below this size (KB) and below `max_length` are
    /// reused as the optimized version.
    pub trigger_size_kb: u64,
    /// JPEG quality (1-100).
    pub quality: u32,
    /// Prefix prepended to generated file names.
    pub file_prefix: String,
}

impl Default for OptimizedConfig {
    fn default() -> Self {
        Self {
            max_length: 1024,
            trigger_size_kb: 50,
            quality: 70,
            file_prefix: "zOpt_".to_string(),
        }
    }
}

/// Original file settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OriginalConfig {
    /// JPEG quality used when a rotation rewrites the original.
    pub quality: u32,
}

impl Default for OriginalConfig {
    fn default() -> Self {
        Self { quality: 95 }
    }
}

/// External encoder settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncoderConfig {
    /// Path to the ffmpeg-compatible executable. When absent, video and
    /// audio fall back to default derivatives.
    pub tool_path: Option<PathBuf>,
    /// Maximum time a single encoder run may take.
    pub timeout_ms: u64,
    /// Position in the video the thumbnail frame is grabbed from.
    pub thumbnail_seek_seconds: u32,
    /// Arguments for a metadata inspection run.
    pub inspect_args: String,
    /// Arguments for grabbing a thumbnail frame.
    pub thumbnail_args: String,
    /// Transcoding settings, first match wins.
    pub settings: Vec<EncoderSetting>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            tool_path: None,
            timeout_ms: 900_000,
            thumbnail_seek_seconds: 3,
            inspect_args: r#"-hide_banner -i "{SourceFilePath}" -t 0 -f null -"#.to_string(),
            thumbnail_args: r#"-ss {SeekSeconds} -i "{SourceFilePath}" -an -vframes 1 -vf "{AutoRotateFilter}" -y "{DestinationFilePath}""#.to_string(),
            settings: default_encoder_settings(),
        }
    }
}

fn default_encoder_settings() -> Vec<EncoderSetting> {
    vec![
        EncoderSetting {
            source: ".mp3".to_string(),
            destination_extension: ".mp3".to_string(),
            args: String::new(),
        },
        EncoderSetting {
            source: "*audio".to_string(),
            destination_extension: ".m4a".to_string(),
            args: r#"-i "{SourceFilePath}" -y "{DestinationFilePath}""#.to_string(),
        },
        EncoderSetting {
            source: "*video".to_string(),
            destination_extension: ".mp4".to_string(),
            args: r#"-y -i "{SourceFilePath}" -vf "scale=min(iw*min({Width}/iw\,{Height}/ih)\,iw):min(ih*min({Width}/iw\,{Height}/ih)\,ih){AutoRotateFilter}" -vcodec libx264 -movflags +faststart -metadata:s:v:0 rotate=0 "{DestinationFilePath}""#.to_string(),
        },
    ]
}

/// One transcoding rule.
///
/// An empty `args` means "no transcoding": the original is used as the
/// optimized file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncoderSetting {
    /// `.ext` for an exact extension, or `*video` / `*audio` for a category.
    pub source: String,
    /// Extension of the produced file, e.g. `.mp4`.
    pub destination_extension: String,
    /// Argument template.
    pub args: String,
}

/// Directory-tree synchronization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Skip files and directories whose name starts with a dot.
    pub skip_hidden: bool,
    /// Regenerate derivatives of existing media during a sync.
    pub regenerate_existing: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            skip_hidden: true,
            regenerate_existing: false,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel regeneration workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Name of the shared settings file in the configuration directory.
pub const SHARED_CONFIG_FILE: &str = "gallery.toml";

/// File name of the per-gallery override.
pub fn gallery_config_file(gallery_id: GalleryId) -> String {
    format!("gallery-{}.toml", gallery_id.0)
}

/// Returns the stock default settings as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(GallerySettings::default())
        .map_err(|e| ConfigError::Validation(format!("default settings must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a TOML file as a raw value. `Ok(None)` when the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge overlays in order onto a base value, then deserialize and validate.
pub fn resolve_settings(
    base: toml::Value,
    overlays: impl IntoIterator<Item = Option<toml::Value>>,
) -> Result<GallerySettings, ConfigError> {
    let merged = overlays
        .into_iter()
        .flatten()
        .fold(base, merge_toml);
    let settings: GallerySettings = merged.try_into()?;
    settings.validate()?;
    Ok(settings)
}

/// Load the settings of a gallery from a configuration directory.
///
/// Relative paths inside the settings are resolved against `config_dir`.
pub fn load_settings(config_dir: &Path, gallery_id: GalleryId) -> Result<GallerySettings, ConfigError> {
    let base = stock_defaults_value()?;
    let shared = load_raw_config(&config_dir.join(SHARED_CONFIG_FILE))?;
    let own = load_raw_config(&config_dir.join(gallery_config_file(gallery_id)))?;
    let mut settings = resolve_settings(base, [shared, own])?;
    settings.paths.media_root = absolutize(config_dir, &settings.paths.media_root);
    settings.paths.resources_path = absolutize(config_dir, &settings.paths.resources_path);
    settings.paths.thumbnail_root = settings
        .paths
        .thumbnail_root
        .map(|p| absolutize(config_dir, &p));
    settings.paths.optimized_root = settings
        .paths
        .optimized_root
        .map(|p| absolutize(config_dir, &p));
    Ok(settings)
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Source of per-gallery settings.
pub trait SettingsProvider: Send + Sync {
    fn load_settings(&self, gallery_id: GalleryId) -> Result<GallerySettings, ConfigError>;
}

/// Loads layered TOML files from a configuration directory.
#[derive(Debug, Clone)]
pub struct FileSettingsProvider {
    config_dir: PathBuf,
}

impl FileSettingsProvider {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }
}

impl SettingsProvider for FileSettingsProvider {
    fn load_settings(&self, gallery_id: GalleryId) -> Result<GallerySettings, ConfigError> {
        load_settings(&self.config_dir, gallery_id)
    }
}

/// Hands out the same settings for every gallery.
#[derive(Debug, Clone)]
pub struct StaticSettingsProvider(pub GallerySettings);

impl SettingsProvider for StaticSettingsProvider {
    fn load_settings(&self, _gallery_id: GalleryId) -> Result<GallerySettings, ConfigError> {
        Ok(self.0.clone())
    }
}

/// Returns a fully-commented stock `gallery.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Gallery Engine Configuration
# ============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Files are layered:
#   config/gallery.toml     -> shared (overrides stock defaults)
#   config/gallery-2.toml   -> gallery 2 only (overrides shared)
#
# Each file only needs the keys it wants to override.
# Unknown keys will cause an error. Relative paths are resolved against the
# configuration directory.

# ---------------------------------------------------------------------------
# Paths
# ---------------------------------------------------------------------------
[paths]
# Originals. The root album of the gallery maps to this directory.
media_root = "media"

# Store thumbnails / optimized files under a different root. The directory
# structure below media_root is mirrored. Omit to keep them next to originals.
# thumbnail_root = "cache/thumbnails"
# optimized_root = "cache/optimized"

# Encoder resources, available to encoder arguments as {GalleryResourcesPath}.
resources_path = "resources"

# ---------------------------------------------------------------------------
# Thumbnails
# ---------------------------------------------------------------------------
[thumbnail]
# Length in pixels of the longer side.
max_length = 115
quality = 70
file_prefix = "zThumb_"

# ---------------------------------------------------------------------------
# Optimized (web-sized) versions
# ---------------------------------------------------------------------------
[optimized]
max_length = 1024
# Originals no larger than this (and no longer than max_length) that are
# already JPEG are reused as-is instead of producing a second file.
trigger_size_kb = 50
quality = 70
file_prefix = "zOpt_"

# ---------------------------------------------------------------------------
# Originals
# ---------------------------------------------------------------------------
[original]
# JPEG quality used when a rotation rewrites the original file.
quality = 95

# ---------------------------------------------------------------------------
# External encoder (ffmpeg)
# ---------------------------------------------------------------------------
[encoder]
# tool_path = "/usr/bin/ffmpeg"
timeout_ms = 900000
thumbnail_seek_seconds = 3
# Placeholders: {SourceFilePath} {DestinationFilePath} {Width} {Height}
# {AspectRatio} {AutoRotateFilter} {SeekSeconds} {BinPath}
# {GalleryResourcesPath}
inspect_args = '-hide_banner -i "{SourceFilePath}" -t 0 -f null -'
thumbnail_args = '-ss {SeekSeconds} -i "{SourceFilePath}" -an -vframes 1 -vf "{AutoRotateFilter}" -y "{DestinationFilePath}"'

# Transcoding rules, first match wins. Empty args = use the original.
[[encoder.settings]]
source = ".mp3"
destination_extension = ".mp3"
args = ""

[[encoder.settings]]
source = "*audio"
destination_extension = ".m4a"
args = '-i "{SourceFilePath}" -y "{DestinationFilePath}"'

[[encoder.settings]]
source = "*video"
destination_extension = ".mp4"
args = '-y -i "{SourceFilePath}" -vf "scale=min(iw*min({Width}/iw\,{Height}/ih)\,iw):min(ih*min({Width}/iw\,{Height}/ih)\,ih){AutoRotateFilter}" -vcodec libx264 -movflags +faststart -metadata:s:v:0 rotate=0 "{DestinationFilePath}"'

# ---------------------------------------------------------------------------
# Synchronization
# ---------------------------------------------------------------------------
[sync]
skip_hidden = true
# Regenerate derivatives of media already in the store.
regenerate_existing = false

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel regeneration workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
