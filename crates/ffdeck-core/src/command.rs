//! Argument vectors for the transcoding tool. Everything here is pure: no
//! filesystem access, and absent optional settings simply omit their flag.

use crate::job::{
    AudioAction, ConvertSettings, FrameSettings, GifSettings, ImageFormat, TrimSettings,
    VideoCodec, DEFAULT_AUDIO_CODEC,
};
use std::path::Path;

pub const FRAME_PATTERN_PREFIX: &str = "frame-";
pub const PREVIEW_OFFSET: &str = "00:00:01.000";
pub const PREVIEW_WIDTH: u32 = 320;

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn push_pair(args: &mut Vec<String>, flag: &str, value: impl Into<String>) {
    args.push(flag.to_string());
    args.push(value.into());
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub fn convert_args(settings: &ConvertSettings, input: &Path, output: &Path) -> Vec<String> {
    let mut args = Vec::new();
    push_pair(&mut args, "-i", path_arg(input));

    let video = &settings.video;
    match &video.codec {
        VideoCodec::Copy => push_pair(&mut args, "-c:v", "copy"),
        VideoCodec::Encode(codec) => {
            push_pair(&mut args, "-c:v", codec.as_str());
            if let Some(crf) = video.crf {
                push_pair(&mut args, "-crf", crf.to_string());
            }
            if let Some(bitrate) = video.bitrate_kbps {
                push_pair(&mut args, "-b:v", format!("{bitrate}k"));
            }
            if let Some(resolution) = non_empty(&video.resolution) {
                push_pair(&mut args, "-vf", format!("scale={resolution}"));
            }
            if let Some(rate) = non_empty(&video.frame_rate) {
                push_pair(&mut args, "-r", rate);
            }
            if let Some(pix_fmt) = non_empty(&video.pixel_format) {
                push_pair(&mut args, "-pix_fmt", pix_fmt);
            }
            if let Some(gop) = video.gop {
                push_pair(&mut args, "-g", gop.to_string());
            }
        }
    }

    let audio = &settings.audio;
    match audio.action {
        AudioAction::Copy => push_pair(&mut args, "-c:a", "copy"),
        AudioAction::Convert => {
            let codec = non_empty(&audio.codec).unwrap_or(DEFAULT_AUDIO_CODEC);
            push_pair(&mut args, "-c:a", codec);
            if let Some(bitrate) = audio.bitrate_kbps {
                push_pair(&mut args, "-b:a", format!("{bitrate}k"));
            }
            if let Some(rate) = audio.sample_rate {
                push_pair(&mut args, "-ar", rate.to_string());
            }
        }
        AudioAction::Remove => args.push("-an".to_string()),
    }

    if let Some(limit) = non_empty(&settings.output.time_limit) {
        push_pair(&mut args, "-t", limit);
    }
    if let Some(buffer) = settings.output.buffer_size_kbps {
        push_pair(&mut args, "-bufsize", format!("{buffer}k"));
    }

    push_pair(&mut args, "-y", path_arg(output));
    args
}

/// Lossless cut: stream copy between optional bounds.
pub fn trim_args(settings: &TrimSettings, input: &Path, output: &Path) -> Vec<String> {
    let mut args = Vec::new();
    push_pair(&mut args, "-i", path_arg(input));
    if let Some(start) = non_empty(&settings.start) {
        push_pair(&mut args, "-ss", start);
    }
    if let Some(end) = non_empty(&settings.end) {
        push_pair(&mut args, "-to", end);
    }
    push_pair(&mut args, "-c", "copy");
    push_pair(&mut args, "-y", path_arg(output));
    args
}

pub fn extract_audio_args(input: &Path, output: &Path) -> Vec<String> {
    let mut args = Vec::new();
    push_pair(&mut args, "-i", path_arg(input));
    args.push("-vn".to_string());
    push_pair(&mut args, "-c:a", "copy");
    push_pair(&mut args, "-y", path_arg(output));
    args
}

/// `<dir>/frame-%05d.<ext>`; ffmpeg numbers from 1.
pub fn frame_output_pattern(output_dir: &Path, format: &ImageFormat) -> String {
    path_arg(&output_dir.join(format!(
        "{FRAME_PATTERN_PREFIX}%05d.{}",
        format.extension()
    )))
}

pub fn extract_frames_args(
    settings: &FrameSettings,
    input: &Path,
    output_dir: &Path,
) -> Vec<String> {
    let mut args = Vec::new();
    push_pair(&mut args, "-i", path_arg(input));
    push_pair(&mut args, "-vf", format!("fps={}", settings.fps));
    if settings.format == ImageFormat::Jpg {
        push_pair(&mut args, "-q:v", "2");
    }
    args.push("-y".to_string());
    args.push(frame_output_pattern(output_dir, &settings.format));
    args
}

/// Concat-demuxer invocation reading the list written by [`manifest_text`].
pub fn stitch_args(manifest: &Path, output: &Path) -> Vec<String> {
    let mut args = Vec::new();
    push_pair(&mut args, "-f", "concat");
    push_pair(&mut args, "-safe", "0");
    push_pair(&mut args, "-i", path_arg(manifest));
    push_pair(&mut args, "-c", "copy");
    push_pair(&mut args, "-y", path_arg(output));
    args
}

/// One `file '<path>'` line per input. Embedded single quotes become `'\''`.
pub fn manifest_text<P: AsRef<Path>>(inputs: &[P]) -> String {
    inputs
        .iter()
        .map(|input| {
            let raw = input.as_ref().to_string_lossy();
            format!("file '{}'", raw.replace('\'', r"'\''"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn gif_bounds(settings: &GifSettings, args: &mut Vec<String>) {
    if let Some(start) = non_empty(&settings.start) {
        push_pair(args, "-ss", start);
    }
    if let Some(end) = non_empty(&settings.end) {
        push_pair(args, "-to", end);
    }
}

fn gif_scale_chain(settings: &GifSettings) -> String {
    format!(
        "fps={},scale={}:-1:flags=lanczos",
        settings.effective_fps(),
        settings.effective_width()
    )
}

pub fn gif_palette_args(settings: &GifSettings, input: &Path, palette: &Path) -> Vec<String> {
    let mut args = Vec::new();
    gif_bounds(settings, &mut args);
    push_pair(&mut args, "-i", path_arg(input));
    push_pair(
        &mut args,
        "-vf",
        format!("{},palettegen", gif_scale_chain(settings)),
    );
    push_pair(&mut args, "-y", path_arg(palette));
    args
}

pub fn gif_encode_args(
    settings: &GifSettings,
    input: &Path,
    palette: &Path,
    output: &Path,
) -> Vec<String> {
    let mut args = Vec::new();
    gif_bounds(settings, &mut args);
    push_pair(&mut args, "-i", path_arg(input));
    push_pair(&mut args, "-i", path_arg(palette));
    push_pair(
        &mut args,
        "-lavfi",
        format!("{}[x];[x][1:v]paletteuse", gif_scale_chain(settings)),
    );
    push_pair(&mut args, "-y", path_arg(output));
    args
}

/// Single downscaled frame used as a thumbnail.
pub fn preview_args(input: &Path, output: &Path, at: &str) -> Vec<String> {
    let mut args = Vec::new();
    push_pair(&mut args, "-ss", at);
    push_pair(&mut args, "-i", path_arg(input));
    push_pair(&mut args, "-vframes", "1");
    push_pair(&mut args, "-vf", format!("scale={PREVIEW_WIDTH}:-1"));
    push_pair(&mut args, "-q:v", "3");
    push_pair(&mut args, "-y", path_arg(output));
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{AudioSettings, OutputConstraints, VideoSettings};
    use std::path::PathBuf;

    fn strs(args: &[String]) -> Vec<&str> {
        args.iter().map(String::as_str).collect()
    }

    fn full_video() -> VideoSettings {
        VideoSettings {
            codec: VideoCodec::Encode("libx264".to_string()),
            crf: Some(23),
            bitrate_kbps: Some(2500),
            resolution: Some("1280:720".to_string()),
            frame_rate: Some("30".to_string()),
            pixel_format: Some("yuv420p".to_string()),
            gop: Some(60),
        }
    }

    #[test]
    fn convert_with_encoder_emits_present_flags_in_order() {
        let settings = ConvertSettings {
            video: full_video(),
            audio: AudioSettings {
                action: AudioAction::Convert,
                codec: Some("libopus".to_string()),
                bitrate_kbps: Some(128),
                sample_rate: Some(48_000),
            },
            output: OutputConstraints {
                time_limit: Some("00:00:30".to_string()),
                buffer_size_kbps: Some(5000),
            },
        };
        let args = convert_args(&settings, Path::new("in.mov"), Path::new("out.mp4"));
        assert_eq!(
            strs(&args),
            vec![
                "-i", "in.mov", "-c:v", "libx264", "-crf", "23", "-b:v", "2500k", "-vf",
                "scale=1280:720", "-r", "30", "-pix_fmt", "yuv420p", "-g", "60", "-c:a",
                "libopus", "-b:a", "128k", "-ar", "48000", "-t", "00:00:30", "-bufsize",
                "5000k", "-y", "out.mp4",
            ]
        );
    }

    #[test]
    fn video_copy_never_emits_encoder_flags() {
        let mut video = full_video();
        video.codec = VideoCodec::Copy;
        for action in [AudioAction::Copy, AudioAction::Convert, AudioAction::Remove] {
            let settings = ConvertSettings {
                video: video.clone(),
                audio: AudioSettings {
                    action,
                    ..Default::default()
                },
                output: OutputConstraints::default(),
            };
            let args = convert_args(&settings, Path::new("a.mp4"), Path::new("b.mkv"));
            for flag in ["-crf", "-b:v", "-vf", "-r", "-pix_fmt", "-g"] {
                assert!(!args.iter().any(|a| a == flag), "{flag} leaked into {args:?}");
            }
            assert!(!args.iter().any(|a| a.starts_with("scale=")));
            assert_eq!(&args[2..4], ["-c:v", "copy"]);
        }
    }

    #[test]
    fn audio_remove_emits_an_without_codec() {
        let settings = ConvertSettings {
            video: full_video(),
            audio: AudioSettings {
                action: AudioAction::Remove,
                codec: Some("aac".to_string()),
                bitrate_kbps: Some(192),
                sample_rate: None,
            },
            output: OutputConstraints::default(),
        };
        let args = convert_args(&settings, Path::new("a.mp4"), Path::new("b.mp4"));
        assert!(args.iter().any(|a| a == "-an"));
        assert!(!args.iter().any(|a| a == "-c:a" || a == "-b:a"));
    }

    #[test]
    fn audio_convert_defaults_codec_and_output_is_last() {
        let settings = ConvertSettings {
            audio: AudioSettings {
                action: AudioAction::Convert,
                ..Default::default()
            },
            ..Default::default()
        };
        let args = convert_args(&settings, Path::new("a.mp4"), Path::new("b.mp4"));
        assert_eq!(
            strs(&args),
            vec!["-i", "a.mp4", "-c:v", "copy", "-c:a", "aac", "-y", "b.mp4"]
        );
    }

    #[test]
    fn trim_is_stream_copy_with_optional_bounds() {
        let args = trim_args(
            &TrimSettings {
                start: Some("00:00:05".to_string()),
                end: None,
            },
            Path::new("in.mp4"),
            Path::new("cut.mp4"),
        );
        assert_eq!(
            strs(&args),
            vec!["-i", "in.mp4", "-ss", "00:00:05", "-c", "copy", "-y", "cut.mp4"]
        );
    }

    #[test]
    fn extract_audio_drops_video() {
        let args = extract_audio_args(Path::new("in.mp4"), Path::new("out.m4a"));
        assert_eq!(
            strs(&args),
            vec!["-i", "in.mp4", "-vn", "-c:a", "copy", "-y", "out.m4a"]
        );
    }

    #[test]
    fn extract_frames_adds_quality_only_for_jpg() {
        let dir = PathBuf::from("frames");
        let jpg = extract_frames_args(
            &FrameSettings {
                fps: 2.0,
                format: ImageFormat::Jpg,
            },
            Path::new("in.mp4"),
            &dir,
        );
        assert!(jpg.windows(2).any(|w| w == ["-q:v", "2"]));
        assert!(jpg.iter().any(|a| a == "fps=2"));
        assert_eq!(
            jpg.last().cloned(),
            Some(dir.join("frame-%05d.jpg").to_string_lossy().into_owned())
        );

        let png = extract_frames_args(
            &FrameSettings {
                fps: 0.5,
                format: ImageFormat::Png,
            },
            Path::new("in.mp4"),
            &dir,
        );
        assert!(!png.iter().any(|a| a == "-q:v"));
        assert!(png.iter().any(|a| a == "fps=0.5"));
    }

    #[test]
    fn manifest_escapes_single_quotes() {
        assert_eq!(
            manifest_text(&["a.mp4", "b's.mp4"]),
            "file 'a.mp4'\nfile 'b'\\''s.mp4'"
        );
    }

    #[test]
    fn stitch_uses_concat_demuxer_in_unsafe_mode() {
        let args = stitch_args(Path::new("/tmp/j-manifest.txt"), Path::new("joined.mp4"));
        assert_eq!(
            strs(&args),
            vec![
                "-f", "concat", "-safe", "0", "-i", "/tmp/j-manifest.txt", "-c", "copy", "-y",
                "joined.mp4",
            ]
        );
    }

    #[test]
    fn gif_stages_share_bounds_and_reuse_palette() {
        let settings = GifSettings {
            start: Some("00:00:02".to_string()),
            end: Some("00:00:04".to_string()),
            fps: Some(12.0),
            width: Some(320),
        };
        let palette = Path::new("/tmp/j-palette.png");
        let first = gif_palette_args(&settings, Path::new("in.mp4"), palette);
        let second = gif_encode_args(&settings, Path::new("in.mp4"), palette, Path::new("out.gif"));

        assert_eq!(&first[..4], &second[..4]);
        assert!(first
            .iter()
            .any(|a| a == "fps=12,scale=320:-1:flags=lanczos,palettegen"));
        assert_eq!(first.last().map(String::as_str), Some("/tmp/j-palette.png"));
        assert!(second.windows(2).any(|w| w == ["-i", "/tmp/j-palette.png"]));
        assert!(second
            .iter()
            .any(|a| a == "fps=12,scale=320:-1:flags=lanczos[x];[x][1:v]paletteuse"));
    }

    #[test]
    fn preview_grabs_one_scaled_frame() {
        let args = preview_args(Path::new("in.mp4"), Path::new("thumb.jpg"), PREVIEW_OFFSET);
        assert_eq!(
            strs(&args),
            vec![
                "-ss", "00:00:01.000", "-i", "in.mp4", "-vframes", "1", "-vf", "scale=320:-1",
                "-q:v", "3", "-y", "thumb.jpg",
            ]
        );
    }
}
