//! CLI output formatting for every command.
//!
//! # Information-First Display
//!
//! Output is **information-centric, not file-centric**. Media are shown by
//! positional index and title, with the original file name as secondary
//! context on an indented `Source:` line. Untitled media fall back to their
//! file name in parentheses.
//!
//! # Output Format
//!
//! ## Sync
//!
//! ```text
//! Gallery 1 → /srv/media
//!     Albums: 2 created, 0 removed
//!     Media: 5 created (1 generic), 0 removed, 0 regenerated
//! Failures
//!     /srv/media/locked.jpg: IO error: permission denied
//! ```
//!
//! ## Regenerate
//!
//! ```text
//! Landscapes (2 media)
//!     001 Dawn
//!         Source: 001-dawn.jpg
//!     002 failed: media #14: Original file of 002-dusk.jpg is missing
//! Regenerated 1 media in 1 album, 1 failed
//! ```
//!
//! ## Delete
//!
//! ```text
//! Deleted album #3 Travel
//!     Originals: kept
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::regenerate::{RegenerateEvent, RegenerateSummary};
use crate::sync::SyncSummary;
use crate::types::{AssetId, GalleryId};
use std::path::Path;

// ============================================================================
// Shared entity display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Titled media show their title, untitled ones their file name in parens.
///
/// ```text
/// 001 The Sunset
/// 001 (IMG_0042.jpg)
/// ```
fn media_line(index: usize, title: &str, file_name: &str) -> String {
    if title.is_empty() {
        format!("{} ({})", format_index(index), file_name)
    } else {
        format!("{} {}", format_index(index), title)
    }
}

/// `1 album`, `3 albums`.
fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

// ============================================================================
// Sync output
// ============================================================================

pub fn format_sync_output(gallery: GalleryId, media_root: &Path, summary: &SyncSummary) -> Vec<String> {
    let mut lines = vec![format!("Gallery {} → {}", gallery, media_root.display())];
    lines.push(format!(
        "{}Albums: {} created, {} removed",
        indent(1),
        summary.albums_created,
        summary.albums_removed
    ));
    let generic = if summary.media_as_generic > 0 {
        format!(" ({} generic)", summary.media_as_generic)
    } else {
        String::new()
    };
    lines.push(format!(
        "{}Media: {} created{}, {} removed, {} regenerated",
        indent(1),
        summary.media_created,
        generic,
        summary.media_removed,
        summary.media_regenerated
    ));
    if !summary.failures.is_empty() {
        lines.push("Failures".to_string());
        for (path, error) in &summary.failures {
            lines.push(format!("{}{}: {}", indent(1), path.display(), error));
        }
    }
    lines
}

pub fn print_sync_output(gallery: GalleryId, media_root: &Path, summary: &SyncSummary) {
    for line in format_sync_output(gallery, media_root, summary) {
        println!("{}", line);
    }
}

// ============================================================================
// Regenerate output
// ============================================================================

/// Lines for one progress event. Called from the printer thread as events
/// arrive, so media lines of one album may appear out of index order.
pub fn format_regenerate_event(event: &RegenerateEvent) -> Vec<String> {
    match event {
        RegenerateEvent::AlbumStarted { title, media_count } => {
            vec![format!("{} ({} media)", title, media_count)]
        }
        RegenerateEvent::MediaRegenerated {
            index,
            title,
            file_name,
        } => vec![
            format!("{}{}", indent(1), media_line(*index, title, file_name)),
            format!("{}Source: {}", indent(2), file_name),
        ],
        RegenerateEvent::MediaFailed { index, id, error } => vec![format!(
            "{}{} failed: media #{}: {}",
            indent(1),
            format_index(*index),
            id,
            error
        )],
    }
}

pub fn format_regenerate_summary(summary: &RegenerateSummary) -> Vec<String> {
    let mut line = format!(
        "Regenerated {} media in {}",
        summary.regenerated,
        plural(summary.albums, "album")
    );
    if !summary.failures.is_empty() {
        line.push_str(&format!(", {} failed", summary.failures.len()));
    }
    vec![line]
}

pub fn print_regenerate_summary(summary: &RegenerateSummary) {
    for line in format_regenerate_summary(summary) {
        println!("{}", line);
    }
}

// ============================================================================
// Delete output
// ============================================================================

/// A deleted root album keeps its record and directory; only its content
/// is gone.
pub fn format_delete_output(id: AssetId, title: &str, was_root: bool, keep_originals: bool) -> Vec<String> {
    let header = if was_root {
        format!("Emptied root album #{} {} (record kept)", id, title)
    } else {
        format!("Deleted album #{} {}", id, title)
    };
    let originals = if keep_originals { "kept" } else { "removed" };
    vec![header, format!("{}Originals: {}", indent(1), originals)]
}

pub fn print_delete_output(id: AssetId, title: &str, was_root: bool, keep_originals: bool) {
    for line in format_delete_output(id, title, was_root, keep_originals) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
