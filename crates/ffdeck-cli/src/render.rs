use anyhow::Result;
use chrono::Utc;
use ffdeck_core::{
    event::{EventPayload, LifecycleEvent},
    media::{CodecType, MediaDescriptor},
    timecode::format_timecode,
};
use serde::Serialize;
use std::io::{self, Write};
use tracing::debug;

#[derive(Serialize)]
struct Stamped<'a> {
    ts: String,
    #[serde(flatten)]
    event: &'a LifecycleEvent,
}

pub fn event(event: &LifecycleEvent, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(&Stamped {
            ts: Utc::now().to_rfc3339(),
            event,
        })?;
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{line}")?;
        stdout.flush()?;
        return Ok(());
    }

    match &event.payload {
        EventPayload::Started { stages } => {
            println!("{} started ({stages} stage{})", event.job_id, plural(*stages));
        }
        EventPayload::Progress {
            percent,
            frame,
            message,
        } => {
            if let Some(message) = message {
                debug!(event = "tool_output", job_id = %event.job_id, line = %message);
            }
            if let Some(percent) = percent {
                match frame {
                    Some(frame) => println!("{} {percent:5.1}% (frame {frame})", event.job_id),
                    None => println!("{} {percent:5.1}%", event.job_id),
                }
            }
        }
        EventPayload::Completed {
            frames, message, ..
        } => match frames {
            Some(frames) => println!("{} {message}: {frames} frames", event.job_id),
            None => println!("{} {message}", event.job_id),
        },
        EventPayload::Failed {
            error,
            exit_code,
            message,
        } => match exit_code {
            Some(code) => eprintln!("{} failed ({error}, exit {code}): {message}", event.job_id),
            None => eprintln!("{} failed ({error}): {message}", event.job_id),
        },
    }
    Ok(())
}

pub fn media(media: &MediaDescriptor, json: bool) -> Result<()> {
    let mut out = io::stdout().lock();
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(media)?)?;
        return Ok(());
    }

    let format = &media.format;
    writeln!(
        out,
        "{}",
        format
            .format_long_name
            .as_deref()
            .or(format.format_name.as_deref())
            .unwrap_or("unknown container")
    )?;
    match media.duration_seconds() {
        Some(seconds) => writeln!(out, "  duration  {} ({seconds:.2}s)", format_timecode(seconds))?,
        None => writeln!(out, "  duration  unknown")?,
    }
    if let Some(bit_rate) = format.bit_rate {
        writeln!(out, "  bitrate   {} kb/s", bit_rate / 1000)?;
    }
    for stream in &media.streams {
        let codec = stream.codec_name.as_deref().unwrap_or("?");
        let detail = match stream.codec_type {
            CodecType::Video => {
                let size = stream
                    .resolution()
                    .map(|(w, h)| format!("{w}x{h}"))
                    .unwrap_or_default();
                let fps = stream
                    .frame_rate()
                    .map(|fps| format!(" {fps:.2} fps"))
                    .unwrap_or_default();
                format!("video {codec} {size}{fps}")
            }
            CodecType::Audio => {
                let rate = stream
                    .sample_rate
                    .map(|hz| format!(" {hz} Hz"))
                    .unwrap_or_default();
                let channels = stream
                    .channels
                    .map(|n| format!(" {n}ch"))
                    .unwrap_or_default();
                format!("audio {codec}{rate}{channels}")
            }
            CodecType::Subtitle => format!("subtitle {codec}"),
            CodecType::Other => format!("data {codec}"),
        };
        match stream.language() {
            Some(lang) => writeln!(out, "  #{} {detail} [{lang}]", stream.index)?,
            None => writeln!(out, "  #{} {detail}", stream.index)?,
        }
    }
    Ok(())
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
