//! Media metadata extraction and resolution.
//!
//! Every media asset carries a list of [`MetaItem`]s. They come from three
//! independent sources, read when the asset is created or re-extracted:
//!
//! - **Filename**: the title, via the `NNN-name` convention.
//!   `001-My-Photo.jpg` becomes "My Photo".
//! - **Sidecar files**: a caption from `001-My-Photo.txt` and a comma
//!   separated tag list from `001-My-Photo.tags`, both next to the original.
//! - **Pixels / encoder**: dimensions from the image backend; duration, bit
//!   rate and display dimensions from an encoder inspection run for video
//!   and audio.
//!
//! Each field is resolved independently; the first non-empty value wins.

use crate::encoder::EncoderOutput;
use crate::naming::title_from_path;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Known metadata fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaName {
    Title,
    Caption,
    FileName,
    FileSizeKb,
    Width,
    Height,
    Duration,
    BitRate,
    Tags,
}

/// One name/value metadata pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaItem {
    pub name: MetaName,
    pub value: String,
}

impl MetaItem {
    pub fn new(name: MetaName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// Value of the first item named `name`.
pub fn find<'a>(items: &'a [MetaItem], name: MetaName) -> Option<&'a str> {
    items
        .iter()
        .find(|item| item.name == name)
        .map(|item| item.value.as_str())
}

/// Replace (or add) the item named `name`.
pub fn set(items: &mut Vec<MetaItem>, name: MetaName, value: impl Into<String>) {
    let value = value.into();
    match items.iter_mut().find(|item| item.name == name) {
        Some(item) => item.value = value,
        None => items.push(MetaItem::new(name, value)),
    }
}

/// Tags of an item list, split from the `Tags` item.
pub fn tags(items: &[MetaItem]) -> Vec<String> {
    find(items, MetaName::Tags)
        .map(parse_tag_list)
        .unwrap_or_default()
}

fn parse_tag_list(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = raw
        .split([',', '\n'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

/// Resolve a metadata field from multiple sources.
///
/// Takes a list of optional values in priority order and returns the first
/// non-None, non-empty value.
pub fn resolve(sources: &[Option<&str>]) -> Option<String> {
    sources
        .iter()
        .filter_map(|opt| {
            opt.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        })
        .next()
}

/// Read a sidecar file with the given extension next to a media file.
///
/// Given `album/001-photo.jpg` and `"txt"`, reads `album/001-photo.txt`.
/// Returns `None` if the file doesn't exist or is empty.
pub fn read_sidecar(media_path: &Path, extension: &str) -> Option<String> {
    let sidecar = media_path.with_extension(extension);
    std::fs::read_to_string(sidecar)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Facts gathered about a media file, merged by [`extract`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractionSources<'a> {
    /// Dimensions reported by the image backend.
    pub dimensions: Option<(u32, u32)>,
    pub file_size_kb: Option<u64>,
    /// Output of an encoder inspection run.
    pub encoder: Option<&'a EncoderOutput>,
    /// Title from an earlier extraction or a user edit.
    pub existing_title: Option<&'a str>,
}

/// Build the metadata list for a media file.
pub fn extract(path: &Path, sources: &ExtractionSources) -> Vec<MetaItem> {
    let mut items = Vec::new();

    let filename_title = title_from_path(path);
    if let Some(title) = resolve(&[sources.existing_title, Some(&filename_title)]) {
        items.push(MetaItem::new(MetaName::Title, title));
    }
    if let Some(caption) = read_sidecar(path, "txt") {
        items.push(MetaItem::new(MetaName::Caption, caption));
    }
    if let Some(name) = path.file_name() {
        items.push(MetaItem::new(
            MetaName::FileName,
            name.to_string_lossy().to_string(),
        ));
    }
    if let Some(kb) = sources.file_size_kb {
        items.push(MetaItem::new(MetaName::FileSizeKb, kb.to_string()));
    }

    let dimensions = sources
        .encoder
        .and_then(EncoderOutput::display_dimensions)
        .or(sources.dimensions);
    if let Some((w, h)) = dimensions {
        items.push(MetaItem::new(MetaName::Width, w.to_string()));
        items.push(MetaItem::new(MetaName::Height, h.to_string()));
    }
    if let Some(encoder) = sources.encoder {
        if let Some(duration) = encoder.duration {
            items.push(MetaItem::new(
                MetaName::Duration,
                format!("{:.2}", duration.as_secs_f64()),
            ));
        }
        if let Some(kbps) = encoder.bitrate_kbps {
            items.push(MetaItem::new(MetaName::BitRate, format!("{kbps} kb/s")));
        }
    }

    if let Some(raw) = read_sidecar(path, "tags") {
        let tags = parse_tag_list(&raw);
        if !tags.is_empty() {
            items.push(MetaItem::new(MetaName::Tags, tags.join(", ")));
        }
    }
    items
}
