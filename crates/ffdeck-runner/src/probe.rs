use ffdeck_core::media::{MediaDescriptor, MediaError};
use std::{
    io,
    path::{Path, PathBuf},
    process::Stdio,
};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

const PROBE_FLAGS: [&str; 6] = [
    "-v",
    "quiet",
    "-print_format",
    "json",
    "-show_format",
    "-show_streams",
];

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("probing {} failed with exit code {code:?}: {stderr}", path.display())]
    Exit {
        path: PathBuf,
        code: Option<i32>,
        stderr: String,
    },
    #[error("unreadable probe output for {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: MediaError,
    },
}

pub fn probe_args(path: &Path) -> Vec<String> {
    let mut args: Vec<String> = PROBE_FLAGS.iter().map(|flag| flag.to_string()).collect();
    args.push(path.to_string_lossy().into_owned());
    args
}

pub async fn probe(ffprobe: &Path, path: &Path) -> Result<MediaDescriptor, ProbeError> {
    let mut command = Command::new(ffprobe);
    command
        .args(probe_args(path))
        .stdin(Stdio::null())
        .kill_on_drop(true);
    #[cfg(windows)]
    command.creation_flags(0x0800_0000);

    let output = command.output().await.map_err(|source| ProbeError::Spawn {
        program: ffprobe.display().to_string(),
        source,
    })?;
    if !output.status.success() {
        return Err(ProbeError::Exit {
            path: path.to_path_buf(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    let media =
        MediaDescriptor::from_ffprobe_json(&output.stdout).map_err(|source| ProbeError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(
        event = "probe_done",
        path = %path.display(),
        streams = media.streams.len(),
        duration = ?media.duration_seconds()
    );
    Ok(media)
}

/// Probes every input and folds them into one descriptor: the first file's
/// streams with the summed duration. Used for concatenation jobs.
pub async fn probe_all(ffprobe: &Path, paths: &[PathBuf]) -> Result<MediaDescriptor, ProbeError> {
    let mut probed = Vec::with_capacity(paths.len());
    for path in paths {
        probed.push(probe(ffprobe, path).await?);
    }
    Ok(combine(probed))
}

pub fn combine(descriptors: Vec<MediaDescriptor>) -> MediaDescriptor {
    let total: Option<f64> = descriptors
        .iter()
        .map(MediaDescriptor::duration_seconds)
        .sum();
    let mut combined = descriptors.into_iter().next().unwrap_or_default();
    combined.format.duration = total;
    combined
}
