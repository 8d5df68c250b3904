//! Derivatives produced by the external encoder.
//!
//! Encoder failures never propagate: the runner records them and hands back
//! empty output, and the generator falls back to a placeholder thumbnail or
//! to the original as the optimized file.

use super::{
    GenerationEnv, GenerationOutcome, GeneratorError, placeholder, regeneration_required,
    reuse_original, source_path, target_path, use_original_as_optimized,
};
use crate::asset::MediaAsset;
use crate::encoder::{EncoderInvocation, parse_output};
use crate::imaging::{Quality, ScaledCopy, create_scaled_copy, get_dimensions};
use crate::types::{DerivativeType, Orientation};
use std::path::Path;
use std::time::Duration;

fn timeout(env: &GenerationEnv) -> Duration {
    Duration::from_millis(env.settings.encoder.timeout_ms)
}

/// Grab a frame with the encoder and scale it to thumbnail size. Falls back
/// to a placeholder when no tool is configured or the grab fails.
pub(super) fn video_thumbnail(media: &mut MediaAsset, env: &GenerationEnv) -> Result<GenerationOutcome, GeneratorError> {
    if !regeneration_required(media, DerivativeType::Thumbnail) {
        return Ok(GenerationOutcome::Unchanged);
    }
    let target = target_path(media, DerivativeType::Thumbnail, Some("jpg"), env.settings)?;
    let max_length = env.settings.thumbnail.max_length;

    if env.encoder.is_configured() {
        let source = source_path(media)?;
        let invocation = EncoderInvocation::new(
            &source,
            env.settings.encoder.thumbnail_args.clone(),
            timeout(env),
        )
        .destination(&target)
        .dimensions(max_length, max_length)
        .source_dimensions(media.upright_dimensions())
        .orientation(media.source_orientation())
        .seek_seconds(env.settings.encoder.thumbnail_seek_seconds)
        .cancel_with(env.cancel.clone())
        .context(env.context.clone());

        let output = env.encoder.execute(&invocation);
        if !output.is_empty() && target.is_file() {
            match scale_frame(env, &target) {
                Ok(written) => {
                    media.thumbnail.set_physical_path(&target)?;
                    media.thumbnail.record_file(Some(written))?;
                    return Ok(GenerationOutcome::Generated);
                }
                Err(e) => tracing::warn!(frame = %target.display(), "unusable video frame: {e}"),
            }
        }
    }

    placeholder::write(media, env, DerivativeType::Thumbnail, &target)?;
    Ok(GenerationOutcome::Fallback)
}

/// Resize a grabbed frame in place to thumbnail size.
fn scale_frame(env: &GenerationEnv, frame: &Path) -> Result<(u32, u32), GeneratorError> {
    let dims = get_dimensions(env.backend, frame)?;
    Ok(create_scaled_copy(
        env.backend,
        frame,
        frame,
        dims,
        &ScaledCopy {
            max_length: env.settings.thumbnail.max_length,
            quality: Quality::new(env.settings.thumbnail.quality),
            orientation: Orientation::default(),
            upscale: true,
        },
    )?)
}

/// Transcode video or audio with the encoder setting matching the
/// original's extension.
///
/// A setting with empty arguments (or no setting) means the original is
/// served as is. A failed transcode also falls back to the original.
pub(super) fn optimized(media: &mut MediaAsset, env: &GenerationEnv) -> Result<GenerationOutcome, GeneratorError> {
    let extension = Path::new(&media.original.file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    let setting = env
        .settings
        .encoder_setting_for(&extension)
        .filter(|s| !s.args.trim().is_empty())
        .cloned();
    let Some(setting) = setting else {
        return Ok(reuse_original(media));
    };

    if !regeneration_required(media, DerivativeType::Optimized) {
        return Ok(if media.optimized.file_name.is_empty() {
            reuse_original(media)
        } else {
            GenerationOutcome::Unchanged
        });
    }
    if !env.encoder.is_configured() {
        use_original_as_optimized(media);
        return Ok(GenerationOutcome::Fallback);
    }

    let source = source_path(media)?;
    let target = target_path(
        media,
        DerivativeType::Optimized,
        Some(&setting.destination_extension),
        env.settings,
    )?;
    let max_length = env.settings.optimized.max_length;
    let invocation = EncoderInvocation::new(&source, setting.args.clone(), timeout(env))
        .destination(&target)
        .dimensions(max_length, max_length)
        .source_dimensions(media.upright_dimensions())
        .orientation(media.source_orientation())
        .cancel_with(env.cancel.clone())
        .context(env.context.clone());

    let output = env.encoder.execute(&invocation);
    if output.is_empty() || !target.is_file() {
        if target.is_file() {
            std::fs::remove_file(&target)?;
        }
        use_original_as_optimized(media);
        return Ok(GenerationOutcome::Fallback);
    }

    let parsed = parse_output(&output);
    media.optimized.set_physical_path(&target)?;
    media
        .optimized
        .record_file(parsed.destination_dimensions.or(parsed.display_dimensions()))?;
    Ok(GenerationOutcome::Generated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Album;
    use crate::config::{EncoderSetting, GallerySettings};
    use crate::test_helpers::TestGallery;
    use crate::types::MediaKind;
    use std::path::PathBuf;

    fn add_file(gallery: &TestGallery, root: &mut Album, name: &str) -> MediaAsset {
        let path = gallery.media_root().join(name);
        std::fs::write(&path, b"not really media").unwrap();
        root.add_media_from_file(&gallery.ctx, &path).unwrap()
    }

    /// `/bin/sh` standing in for the encoder, with every template replaced.
    #[cfg(unix)]
    fn shell_encoder(settings: &mut GallerySettings, thumbnail: &str, transcode: &str) {
        settings.encoder.tool_path = Some(PathBuf::from("/bin/sh"));
        settings.encoder.inspect_args = r#"-c "echo inspected""#.to_string();
        settings.encoder.thumbnail_args = thumbnail.to_string();
        settings.encoder.settings = vec![EncoderSetting {
            source: "*video".to_string(),
            destination_extension: ".mp4".to_string(),
            args: transcode.to_string(),
        }];
    }

    #[test]
    fn video_without_encoder_gets_placeholder_and_original() {
        let gallery = TestGallery::new();
        let mut root = gallery.root_album();
        let media = add_file(&gallery, &mut root, "clip.mp4");

        assert_eq!(media.kind, MediaKind::Video);
        assert!(media.thumbnail.exists());
        assert_eq!(media.thumbnail.longer_side(), Some(gallery.settings.thumbnail.max_length));
        assert!(media.optimized.shares_file_with(&media.original));
    }

    #[test]
    fn audio_with_passthrough_setting_reuses_original() {
        let gallery = TestGallery::new();
        let mut root = gallery.root_album();
        let media = add_file(&gallery, &mut root, "song.mp3");

        assert_eq!(media.kind, MediaKind::Audio);
        assert!(media.optimized.shares_file_with(&media.original));
        assert!(gallery.recorder.events().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn grabbed_frame_is_scaled_to_thumbnail() {
        let frame_dir = tempfile::TempDir::new().unwrap();
        let frame = frame_dir.path().join("frame.jpg");
        crate::test_helpers::create_test_jpeg(&frame, 320, 240);
        let grab = format!(r#"-c "cp '{}' '{{DestinationFilePath}}' && echo grabbed""#, frame.display());

        let gallery = TestGallery::with_settings(|s, _| {
            s.thumbnail.max_length = 100;
            shell_encoder(s, &grab, "");
        });
        let mut root = gallery.root_album();
        let media = add_file(&gallery, &mut root, "clip.mp4");

        assert_eq!((media.thumbnail.width, media.thumbnail.height), (Some(100), Some(75)));
        assert_eq!(media.thumbnail.file_name, "zThumb_clip.jpg");
        assert!(gallery.recorder.events().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn transcode_writes_separate_optimized_file() {
        let gallery = TestGallery::with_settings(|s, _| {
            shell_encoder(
                s,
                r#"-c "exit 1""#,
                r#"-c "cp '{SourceFilePath}' '{DestinationFilePath}' && echo transcoded""#,
            );
        });
        let mut root = gallery.root_album();
        let media = add_file(&gallery, &mut root, "clip.mp4");

        assert_eq!(media.optimized.file_name, "zOpt_clip.mp4");
        assert!(media.optimized.exists());
        assert!(!media.optimized.shares_file_with(&media.original));
    }

    #[cfg(unix)]
    #[test]
    fn aspect_ratio_comes_from_upright_source() {
        let gallery = TestGallery::with_settings(|s, _| {
            shell_encoder(
                s,
                r#"-c "exit 1""#,
                r#"-c "echo '{AspectRatio} {Width}x{Height}' > '{DestinationFilePath}' && echo transcoded""#,
            );
            s.encoder.inspect_args =
                r#"-c "echo 'Video: h264, yuv420p, 1920x1080'; echo '    rotate          : 90'""#.to_string();
        });
        let mut root = gallery.root_album();
        let media = add_file(&gallery, &mut root, "clip.mp4");

        assert_eq!((media.original.width, media.original.height), (Some(1080), Some(1920)));
        let rendered = std::fs::read_to_string(gallery.media_root().join("zOpt_clip.mp4")).unwrap();
        let max = gallery.settings.optimized.max_length;
        assert_eq!(rendered.trim(), format!("0.56 {max}x{max}"));
    }

    #[cfg(unix)]
    #[test]
    fn failed_transcode_falls_back_to_original() {
        let gallery = TestGallery::with_settings(|s, _| {
            shell_encoder(
                s,
                r#"-c "exit 1""#,
                r#"-c "echo partial > '{DestinationFilePath}'; echo bad codec 1>&2; exit 2""#,
            );
        });
        let mut root = gallery.root_album();
        let media = add_file(&gallery, &mut root, "clip.mp4");

        assert!(media.optimized.shares_file_with(&media.original));
        assert!(!gallery.media_root().join("zOpt_clip.mp4").exists());
        // Both the frame grab and the transcode failures were recorded.
        assert_eq!(gallery.recorder.events().len(), 2);
        // The frame grab failure still leaves a placeholder thumbnail.
        assert!(media.thumbnail.exists());
    }
}
