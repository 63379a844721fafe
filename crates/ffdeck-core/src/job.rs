use crate::media::MediaDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_GIF_FPS: f64 = 10.0;
pub const DEFAULT_GIF_WIDTH: u32 = 480;
pub const DEFAULT_AUDIO_CODEC: &str = "aac";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("invalid job {job_id}: {reason}")]
    Invalid { job_id: JobId, reason: String },
}

/// Opaque job identifier. Also used to namespace scratch files, see [`JobId::slug`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("job-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filename-safe form of the id.
    pub fn slug(&self) -> String {
        let slug: String = self
            .0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if slug.is_empty() {
            "job".to_string()
        } else {
            slug
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    Convert,
    Trim,
    ExtractAudio,
    ExtractFrames,
    Stitch,
    Gif,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Convert => "CONVERT",
            JobKind::Trim => "TRIM",
            JobKind::ExtractAudio => "EXTRACT_AUDIO",
            JobKind::ExtractFrames => "EXTRACT_FRAMES",
            JobKind::Stitch => "STITCH",
            JobKind::Gif => "GIF",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase().replace('-', "_");
        match normalized.as_str() {
            "convert" => Ok(JobKind::Convert),
            "trim" => Ok(JobKind::Trim),
            "extract_audio" | "audio" => Ok(JobKind::ExtractAudio),
            "extract_frames" | "frames" => Ok(JobKind::ExtractFrames),
            "stitch" | "concat" => Ok(JobKind::Stitch),
            "gif" => Ok(JobKind::Gif),
            other => Err(format!("Unknown job kind: {other}")),
        }
    }
}

/// `copy` passes the video stream through; anything else names an encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VideoCodec {
    Copy,
    Encode(String),
}

impl Default for VideoCodec {
    fn default() -> Self {
        Self::Copy
    }
}

impl From<String> for VideoCodec {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("copy") {
            VideoCodec::Copy
        } else {
            VideoCodec::Encode(trimmed.to_string())
        }
    }
}

impl From<VideoCodec> for String {
    fn from(value: VideoCodec) -> Self {
        match value {
            VideoCodec::Copy => "copy".to_string(),
            VideoCodec::Encode(codec) => codec,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSettings {
    #[serde(default)]
    pub codec: VideoCodec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crf: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
    /// Passed to the scale filter verbatim, e.g. `1280:720` or `1280:-2`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gop: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioAction {
    #[default]
    Copy,
    Convert,
    Remove,
}

impl FromStr for AudioAction {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "copy" => Ok(AudioAction::Copy),
            "convert" | "encode" | "reencode" | "re-encode" => Ok(AudioAction::Convert),
            "remove" | "mute" | "none" => Ok(AudioAction::Remove),
            other => Err(format!("Unknown audio action: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSettings {
    #[serde(default)]
    pub action: AudioAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConstraints {
    /// Timecode accepted by `-t`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_size_kbps: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertSettings {
    #[serde(default)]
    pub video: VideoSettings,
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub output: OutputConstraints,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ImageFormat {
    Jpg,
    Png,
    Bmp,
    Webp,
    Other(String),
}

impl ImageFormat {
    pub fn extension(&self) -> &str {
        match self {
            ImageFormat::Jpg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Webp => "webp",
            ImageFormat::Other(ext) => ext,
        }
    }
}

impl Default for ImageFormat {
    fn default() -> Self {
        Self::Jpg
    }
}

impl From<String> for ImageFormat {
    fn from(value: String) -> Self {
        let normalized = value.trim().trim_start_matches('.').to_lowercase();
        match normalized.as_str() {
            "jpg" | "jpeg" => ImageFormat::Jpg,
            "png" => ImageFormat::Png,
            "bmp" => ImageFormat::Bmp,
            "webp" => ImageFormat::Webp,
            _ => ImageFormat::Other(normalized),
        }
    }
}

impl From<ImageFormat> for String {
    fn from(value: ImageFormat) -> Self {
        value.extension().to_string()
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.trim().is_empty() {
            return Err("empty image format".to_string());
        }
        Ok(ImageFormat::from(input.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSettings {
    pub fps: f64,
    #[serde(default)]
    pub format: ImageFormat,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GifSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
}

impl GifSettings {
    pub fn effective_fps(&self) -> f64 {
        self.fps
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .unwrap_or(DEFAULT_GIF_FPS)
    }

    pub fn effective_width(&self) -> u32 {
        self.width.filter(|w| *w > 0).unwrap_or(DEFAULT_GIF_WIDTH)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobSettings {
    Convert(ConvertSettings),
    Trim(TrimSettings),
    ExtractAudio,
    ExtractFrames(FrameSettings),
    Stitch,
    Gif(GifSettings),
}

impl JobSettings {
    pub fn kind(&self) -> JobKind {
        match self {
            JobSettings::Convert(_) => JobKind::Convert,
            JobSettings::Trim(_) => JobKind::Trim,
            JobSettings::ExtractAudio => JobKind::ExtractAudio,
            JobSettings::ExtractFrames(_) => JobKind::ExtractFrames,
            JobSettings::Stitch => JobKind::Stitch,
            JobSettings::Gif(_) => JobKind::Gif,
        }
    }
}

/// A submitted job. Read-only once handed to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_id: JobId,
    pub kind: JobKind,
    pub inputs: Vec<PathBuf>,
    /// Output file, or the target directory for frame extraction.
    pub output: PathBuf,
    pub settings: JobSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<MediaDescriptor>,
}

impl JobDescriptor {
    pub fn new(
        job_id: JobId,
        settings: JobSettings,
        inputs: Vec<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            job_id,
            kind: settings.kind(),
            inputs,
            output: output.into(),
            settings,
            source: None,
        }
    }

    pub fn with_source(mut self, source: MediaDescriptor) -> Self {
        self.source = Some(source);
        self
    }

    pub fn source_duration(&self) -> Option<f64> {
        self.source.as_ref().and_then(MediaDescriptor::duration_seconds)
    }

    /// Shape checks only; the filesystem is never consulted.
    pub fn validate(&self) -> Result<(), JobError> {
        let invalid = |reason: String| JobError::Invalid {
            job_id: self.job_id.clone(),
            reason,
        };

        if self.settings.kind() != self.kind {
            return Err(invalid(format!(
                "settings for {} submitted as {}",
                self.settings.kind(),
                self.kind
            )));
        }
        if self.inputs.is_empty() {
            return Err(invalid("no input files".to_string()));
        }
        match self.kind {
            JobKind::Stitch if self.inputs.len() < 2 => {
                return Err(invalid(format!(
                    "stitching needs at least 2 inputs, got {}",
                    self.inputs.len()
                )));
            }
            JobKind::Stitch => {}
            _ if self.inputs.len() > 1 => {
                return Err(invalid(format!(
                    "{} takes exactly one input, got {}",
                    self.kind,
                    self.inputs.len()
                )));
            }
            _ => {}
        }
        if let JobSettings::ExtractFrames(frames) = &self.settings {
            if !(frames.fps.is_finite() && frames.fps > 0.0) {
                return Err(invalid(format!("frame rate must be positive, got {}", frames.fps)));
            }
        }
        if self.output.as_os_str().is_empty() {
            return Err(invalid("empty output path".to_string()));
        }
        Ok(())
    }
}
