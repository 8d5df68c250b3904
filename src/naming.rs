//! File and directory naming.
//!
//! Directories and media files may follow the `NNN-name` convention: an
//! optional numeric prefix that orders the entry within its album, followed by
//! a name. Dashes in the name become spaces in the display title:
//! - `020-My-Best-Photos/` → sequence 20, "My Best Photos"
//! - `001-My-Museum.jpg` → sequence 1, "My Museum"
//!
//! Generated files must never overwrite an existing one, so derivative names
//! and album directory names go through collision avoidance: `name.jpg`,
//! `name(1).jpg`, `name(2).jpg`, ...

use std::path::Path;

/// Result of parsing a numbered entry name like `020-My-Best-Photos`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedName {
    /// Number prefix if present (e.g., `20` from `020-My-Best-Photos`)
    pub number: Option<u32>,
    /// Raw name part after `NNN-`, dashes preserved. Empty if number-only.
    /// For unnumbered entries, this is the full input.
    pub name: String,
    /// Display title: name with dashes converted to spaces.
    pub display_title: String,
}

/// Parse an entry name following the `NNN-name` convention.
///
/// - `"020-My-Best-Photos"` → number=Some(20), display_title="My Best Photos"
/// - `"001"` → number=Some(1), name="", display_title=""
/// - `"wip-drafts"` → number=None, display_title="wip drafts"
pub fn parse_entry_name(name: &str) -> ParsedName {
    if let Some(dash_pos) = name.find('-') {
        let prefix = &name[..dash_pos];
        if let Ok(num) = prefix.parse::<u32>() {
            let raw = &name[dash_pos + 1..];
            return ParsedName {
                number: Some(num),
                name: raw.to_string(),
                display_title: raw.replace('-', " "),
            };
        }
    }
    if let Ok(num) = name.parse::<u32>() {
        return ParsedName {
            number: Some(num),
            name: String::new(),
            display_title: String::new(),
        };
    }
    ParsedName {
        number: None,
        name: name.to_string(),
        display_title: name.replace('-', " "),
    }
}

/// Title of a file: the display title of its stem, or the stem itself when
/// the name is number-only.
pub fn title_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let parsed = parse_entry_name(&stem);
    if parsed.display_title.is_empty() {
        stem
    } else {
        parsed.display_title
    }
}

/// Replace characters that are unsafe in a file or directory name.
///
/// Keeps alphanumerics, `-`, `_`, `.`, parentheses and spaces; everything
/// else becomes `_`. Leading/trailing dots and spaces are stripped.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '(' | ')' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Name of a generated derivative: `prefix` + original stem + extension.
///
/// `extension` overrides the original's extension (without the dot).
pub fn derivative_file_name(prefix: &str, original_name: &str, extension: Option<&str>) -> String {
    let path = Path::new(original_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = extension
        .map(|e| e.trim_start_matches('.').to_string())
        .or_else(|| path.extension().map(|e| e.to_string_lossy().to_string()));
    match ext {
        Some(ext) if !ext.is_empty() => format!("{prefix}{stem}.{ext}"),
        _ => format!("{prefix}{stem}"),
    }
}

/// A file name based on `desired` that does not yet exist in `dir`.
pub fn unique_file_name(dir: &Path, desired: &str) -> String {
    if !dir.join(desired).exists() {
        return desired.to_string();
    }
    let path = Path::new(desired);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (1..)
        .map(|n| format!("{stem}({n}){ext}"))
        .find(|candidate| !dir.join(candidate).exists())
        .unwrap_or_else(|| desired.to_string())
}

/// A directory name based on `desired` that does not yet exist in `parent`.
pub fn unique_directory_name(parent: &Path, desired: &str) -> String {
    let desired = sanitize_name(desired);
    if !parent.join(&desired).exists() {
        return desired;
    }
    (1..)
        .map(|n| format!("{desired}({n})"))
        .find(|candidate| !parent.join(candidate).exists())
        .unwrap_or(desired)
}
