use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffprobe produced no output")]
    Empty,
    #[error("invalid ffprobe JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Probed description of one media file, as reported by
/// `ffprobe -print_format json -show_format -show_streams`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaDescriptor {
    #[serde(default)]
    pub format: FormatDescriptor,
    #[serde(default)]
    pub streams: Vec<StreamDescriptor>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FormatDescriptor {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub format_name: Option<String>,
    #[serde(default)]
    pub format_long_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub size: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub bit_rate: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub nb_streams: Option<u64>,
    #[serde(default)]
    pub tags: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CodecType {
    Video,
    Audio,
    Subtitle,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamDescriptor {
    #[serde(default, deserialize_with = "lenient_index")]
    pub index: u32,
    #[serde(default)]
    pub codec_type: CodecType,
    #[serde(default)]
    pub codec_name: Option<String>,
    #[serde(default)]
    pub codec_long_name: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub width: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub height: Option<u32>,
    #[serde(default)]
    pub r_frame_rate: Option<String>,
    #[serde(default)]
    pub avg_frame_rate: Option<String>,
    #[serde(default)]
    pub pix_fmt: Option<String>,
    #[serde(default)]
    pub display_aspect_ratio: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub sample_rate: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub channels: Option<u32>,
    #[serde(default)]
    pub channel_layout: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub bit_rate: Option<u64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub duration: Option<f64>,
    #[serde(default)]
    pub tags: BTreeMap<String, Value>,
}

impl MediaDescriptor {
    pub fn from_ffprobe_json(stdout: &[u8]) -> Result<Self, MediaError> {
        if stdout.iter().all(|byte| byte.is_ascii_whitespace()) {
            return Err(MediaError::Empty);
        }
        Ok(serde_json::from_slice(stdout)?)
    }

    /// Container duration, falling back to the longest stream duration.
    /// Zero or non-finite values count as unknown.
    pub fn duration_seconds(&self) -> Option<f64> {
        let container = self.format.duration.filter(|d| d.is_finite() && *d > 0.0);
        container.or_else(|| {
            self.streams
                .iter()
                .filter_map(|stream| stream.duration)
                .filter(|d| d.is_finite() && *d > 0.0)
                .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))))
        })
    }

    pub fn first_video(&self) -> Option<&StreamDescriptor> {
        self.streams
            .iter()
            .find(|stream| stream.codec_type == CodecType::Video)
    }

    pub fn first_audio(&self) -> Option<&StreamDescriptor> {
        self.streams
            .iter()
            .find(|stream| stream.codec_type == CodecType::Audio)
    }

    /// Number of frames an extraction at `fps` is expected to produce:
    /// `floor(duration * fps)`, or 0 when either side is unknown.
    pub fn estimated_frame_count(&self, fps: f64) -> u64 {
        match self.duration_seconds() {
            Some(duration) if fps.is_finite() && fps > 0.0 => (duration * fps).floor() as u64,
            _ => 0,
        }
    }

    /// Container extension suited for a stream-copied audio track.
    pub fn audio_extension(&self) -> Option<String> {
        let codec = self.first_audio()?.codec_name.as_deref()?;
        Some(match codec {
            "aac" => "m4a".to_string(),
            "vorbis" => "ogg".to_string(),
            "pcm_s16le" | "pcm_s24le" => "wav".to_string(),
            other => other.to_string(),
        })
    }
}

impl StreamDescriptor {
    pub fn frame_rate(&self) -> Option<f64> {
        self.r_frame_rate
            .as_deref()
            .and_then(parse_rational)
            .or_else(|| self.avg_frame_rate.as_deref().and_then(parse_rational))
    }

    pub fn resolution(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }

    pub fn language(&self) -> Option<&str> {
        self.tags.get("language").and_then(Value::as_str)
    }
}

/// Parse an ffprobe rational such as `30000/1001`. `0/0` means unknown.
pub fn parse_rational(input: &str) -> Option<f64> {
    let (num, den) = match input.trim().split_once('/') {
        Some((num, den)) => (num.trim().parse::<f64>().ok()?, den.trim().parse::<f64>().ok()?),
        None => (input.trim().parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 {
        return None;
    }
    let value = num / den;
    (value.is_finite() && value > 0.0).then_some(value)
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match val {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    })
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match val {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    })
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_u64(deserializer)?.and_then(|v| u32::try_from(v).ok()))
}

fn lenient_index<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_u32(deserializer)?.unwrap_or_default())
}
