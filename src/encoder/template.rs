//! Encoder argument templating.
//!
//! Argument strings in the settings contain `{Placeholder}` tokens that are
//! resolved per invocation:
//!
//! | Placeholder | Value |
//! |---|---|
//! | `{SourceFilePath}` | absolute path of the input file |
//! | `{DestinationFilePath}` | absolute path of the output file |
//! | `{Width}` / `{Height}` | target dimensions in pixels |
//! | `{AspectRatio}` | source width / height as displayed, two decimals |
//! | `{AutoRotateFilter}` | filter chain for the pending rotation/flip |
//! | `{SeekSeconds}` | thumbnail grab position |
//! | `{BinPath}` | directory of the encoder executable |
//! | `{GalleryResourcesPath}` | configured resources directory |
//!
//! `{AutoRotateFilter}` is comma-joined with adjacent filter text: a leading
//! comma is inserted unless the preceding character is a quote, a comma,
//! whitespace, or the start of the string; a trailing comma likewise. An
//! argument left as an empty `-vf ""` is removed entirely.

use crate::imaging::aspect_ratio;
use crate::types::{Flip, Orientation, Rotation};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

pub const AUTO_ROTATE_PLACEHOLDER: &str = "{AutoRotateFilter}";

static EMPTY_FILTER_ARG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(^|\s+)-(?:vf|filter:v)\s+""(\s|$)"#).expect("valid regex")
});

/// Values substituted into an argument template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateValues<'a> {
    pub source: &'a Path,
    pub destination: Option<&'a Path>,
    pub width: u32,
    pub height: u32,
    /// Upright source dimensions; `{AspectRatio}` falls back to
    /// `width`/`height` when unknown.
    pub source_dimensions: Option<(u32, u32)>,
    pub orientation: Orientation,
    pub seek_seconds: u32,
    pub bin_path: Option<&'a Path>,
    pub resources_path: &'a Path,
}

/// Filter chain for a rotation/flip pair. Rotation is applied first.
pub fn rotation_filter(orientation: Orientation) -> &'static str {
    match (orientation.rotation, orientation.flip) {
        (Rotation::None, Flip::None) => "",
        (Rotation::None, Flip::Horizontal) => "hflip",
        (Rotation::None, Flip::Vertical) => "vflip",
        (Rotation::Rotate90, Flip::None) => "transpose=1",
        (Rotation::Rotate90, Flip::Horizontal) => "transpose=0",
        (Rotation::Rotate90, Flip::Vertical) => "transpose=3",
        (Rotation::Rotate180, Flip::None) => "hflip,vflip",
        (Rotation::Rotate180, Flip::Horizontal) => "vflip",
        (Rotation::Rotate180, Flip::Vertical) => "hflip",
        (Rotation::Rotate270, Flip::None) => "transpose=2",
        (Rotation::Rotate270, Flip::Horizontal) => "transpose=3",
        (Rotation::Rotate270, Flip::Vertical) => "transpose=0",
    }
}

fn needs_separator(neighbor: Option<char>) -> bool {
    match neighbor {
        None => false,
        Some(c) => !(c == '"' || c == '\'' || c == ',' || c.is_whitespace()),
    }
}

/// Replace every `{AutoRotateFilter}` with `filter`, joining it to adjacent
/// filter text with commas.
pub fn insert_rotation_filter(template: &str, filter: &str) -> String {
    if filter.is_empty() {
        return template.replace(AUTO_ROTATE_PLACEHOLDER, "");
    }

    let mut result = String::with_capacity(template.len() + filter.len());
    let mut rest = template;
    while let Some(pos) = rest.find(AUTO_ROTATE_PLACEHOLDER) {
        let before = &rest[..pos];
        let after = &rest[pos + AUTO_ROTATE_PLACEHOLDER.len()..];
        // Earlier output counts as "before" for the first char of this slice.
        let prev = before.chars().last().or_else(|| result.chars().last());
        result.push_str(before);
        if needs_separator(prev) {
            result.push(',');
        }
        result.push_str(filter);
        if needs_separator(after.chars().next()) {
            result.push(',');
        }
        rest = after;
    }
    result.push_str(rest);
    result
}

/// Drop `-vf ""` arguments that ended up empty after substitution.
pub fn strip_empty_filter_args(args: &str) -> String {
    EMPTY_FILTER_ARG
        .replace_all(args, |caps: &regex::Captures| {
            if caps[1].is_empty() || caps[2].is_empty() {
                String::new()
            } else {
                " ".to_string()
            }
        })
        .trim()
        .to_string()
}

/// Resolve every placeholder in `template`.
pub fn render_args(template: &str, values: &TemplateValues) -> String {
    let with_filter = insert_rotation_filter(template, rotation_filter(values.orientation));
    let bin_path = values
        .bin_path
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let resolved = with_filter
        .replace("{SourceFilePath}", &values.source.display().to_string())
        .replace(
            "{DestinationFilePath}",
            &values
                .destination
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        )
        .replace("{Width}", &values.width.to_string())
        .replace("{Height}", &values.height.to_string())
        .replace(
            "{AspectRatio}",
            &format!(
                "{:.2}",
                aspect_ratio(values.source_dimensions.unwrap_or((values.width, values.height)))
            ),
        )
        .replace("{SeekSeconds}", &values.seek_seconds.to_string())
        .replace("{BinPath}", &bin_path)
        .replace(
            "{GalleryResourcesPath}",
            &values.resources_path.display().to_string(),
        );
    strip_empty_filter_args(&resolved)
}

/// Split a resolved argument string into process arguments.
///
/// Whitespace separates arguments except inside double quotes; the quotes
/// themselves are removed. A backslash is kept verbatim, so filter escapes
/// like `\,` reach the encoder unchanged.
pub fn split_args(args: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in args.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    parts.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        parts.push(current);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ORIENTATIONS: [(Rotation, Flip); 12] = [
        (Rotation::None, Flip::None),
        (Rotation::None, Flip::Horizontal),
        (Rotation::None, Flip::Vertical),
        (Rotation::Rotate90, Flip::None),
        (Rotation::Rotate90, Flip::Horizontal),
        (Rotation::Rotate90, Flip::Vertical),
        (Rotation::Rotate180, Flip::None),
        (Rotation::Rotate180, Flip::Horizontal),
        (Rotation::Rotate180, Flip::Vertical),
        (Rotation::Rotate270, Flip::None),
        (Rotation::Rotate270, Flip::Horizontal),
        (Rotation::Rotate270, Flip::Vertical),
    ];

    fn values<'a>(source: &'a Path, dest: &'a Path) -> TemplateValues<'a> {
        TemplateValues {
            source,
            destination: Some(dest),
            width: 640,
            height: 480,
            source_dimensions: None,
            orientation: Orientation::default(),
            seek_seconds: 3,
            bin_path: Some(Path::new("/opt/ffmpeg/bin")),
            resources_path: Path::new("/srv/resources"),
        }
    }

    // =========================================================================
    // Rotation filter
    // =========================================================================

    #[test]
    fn rotation_filter_mapping() {
        let o = |r, f| rotation_filter(Orientation::new(r, f));
        assert_eq!(o(Rotation::None, Flip::None), "");
        assert_eq!(o(Rotation::Rotate90, Flip::None), "transpose=1");
        assert_eq!(o(Rotation::Rotate180, Flip::None), "hflip,vflip");
        assert_eq!(o(Rotation::Rotate270, Flip::None), "transpose=2");
        assert_eq!(o(Rotation::Rotate90, Flip::Vertical), "transpose=3");
    }

    #[test]
    fn filter_between_filter_text_gets_one_comma_each_side() {
        for (r, f) in ALL_ORIENTATIONS {
            let filter = rotation_filter(Orientation::new(r, f));
            if filter.is_empty() {
                continue;
            }
            let out = insert_rotation_filter("scale=2:2{AutoRotateFilter}fps=5", filter);
            assert_eq!(out, format!("scale=2:2,{filter},fps=5"), "{r:?}/{f:?}");
        }
    }

    #[test]
    fn filter_inside_quotes_gets_no_comma() {
        for (r, f) in ALL_ORIENTATIONS {
            let filter = rotation_filter(Orientation::new(r, f));
            let out = insert_rotation_filter(r#"-vf "{AutoRotateFilter}""#, filter);
            assert_eq!(out, format!(r#"-vf "{filter}""#));
        }
    }

    #[test]
    fn filter_at_end_of_quoted_chain_gets_leading_comma_only() {
        let out = insert_rotation_filter(r#"-vf "scale=10:10{AutoRotateFilter}""#, "hflip");
        assert_eq!(out, r#"-vf "scale=10:10,hflip""#);
    }

    #[test]
    fn filter_next_to_existing_comma_is_not_doubled() {
        let out = insert_rotation_filter("a,{AutoRotateFilter},b", "vflip");
        assert_eq!(out, "a,vflip,b");
    }

    #[test]
    fn empty_filter_removes_placeholder_without_commas() {
        let out = insert_rotation_filter("scale=2:2{AutoRotateFilter}", "");
        assert_eq!(out, "scale=2:2");
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    #[test]
    fn render_substitutes_every_placeholder() {
        let src = Path::new("/media/clip.mov");
        let dst = Path::new("/media/zOpt_clip.mp4");
        let out = render_args(
            r#"-ss {SeekSeconds} -i "{SourceFilePath}" -s {Width}x{Height} -aspect {AspectRatio} -fpre "{GalleryResourcesPath}/x.ffpreset" "{BinPath}" "{DestinationFilePath}""#,
            &values(src, dst),
        );
        assert_eq!(
            out,
            r#"-ss 3 -i "/media/clip.mov" -s 640x480 -aspect 1.33 -fpre "/srv/resources/x.ffpreset" "/opt/ffmpeg/bin" "/media/zOpt_clip.mp4""#
        );
    }

    #[test]
    fn aspect_ratio_follows_source_not_bounding_box() {
        let src = Path::new("/media/clip.mov");
        let dst = Path::new("/media/zOpt_clip.mp4");
        let mut values = values(src, dst);
        values.width = 1024;
        values.height = 1024;
        values.source_dimensions = Some((1920, 1080));
        let out = render_args("{AspectRatio} {Width}x{Height}", &values);
        assert_eq!(out, "1.78 1024x1024");
    }

    #[test]
    fn render_strips_empty_filter_argument() {
        let src = Path::new("/media/clip.mov");
        let dst = Path::new("/media/t.jpg");
        let out = render_args(
            r#"-i "{SourceFilePath}" -vf "{AutoRotateFilter}" -y "{DestinationFilePath}""#,
            &values(src, dst),
        );
        assert_eq!(out, r#"-i "/media/clip.mov" -y "/media/t.jpg""#);
    }

    #[test]
    fn render_keeps_filter_argument_when_rotating() {
        let src = Path::new("/m/a.mov");
        let dst = Path::new("/m/b.jpg");
        let mut v = values(src, dst);
        v.orientation = Orientation::new(Rotation::Rotate90, Flip::None);
        let out = render_args(r#"-vf "{AutoRotateFilter}" "{DestinationFilePath}""#, &v);
        assert_eq!(out, r#"-vf "transpose=1" "/m/b.jpg""#);
    }

    // =========================================================================
    // Argument splitting
    // =========================================================================

    #[test]
    fn split_args_honours_quotes() {
        let parts = split_args(r#"-i "/my media/a b.mov" -vf "scale=1\,2" -y out.mp4"#);
        assert_eq!(
            parts,
            vec!["-i", "/my media/a b.mov", "-vf", r"scale=1\,2", "-y", "out.mp4"]
        );
    }

    #[test]
    fn split_args_keeps_empty_quoted_argument() {
        assert_eq!(split_args(r#"-metadata title="" x"#), vec!["-metadata", "title=", "x"]);
        assert_eq!(split_args(r#"a """#), vec!["a", ""]);
    }

    #[test]
    fn split_args_empty_input() {
        assert!(split_args("   ").is_empty());
    }
}
