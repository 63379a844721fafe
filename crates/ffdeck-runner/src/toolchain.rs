use crate::config::Config;
use std::{
    env,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("{tool} not found; searched {searched}")]
    MissingBinary { tool: &'static str, searched: String },
    #[error("scratch directory {} is unusable: {source}", path.display())]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Locations of the external tools every job and probe shells out to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Toolchain {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Toolchain {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn resolve(config: &Config) -> Result<Self, SetupError> {
        let path_var = env::var_os("PATH");
        let search: Vec<PathBuf> = path_var
            .as_deref()
            .map(|value| env::split_paths(value).collect())
            .unwrap_or_default();
        Ok(Self {
            ffmpeg: locate(
                FFMPEG,
                config.ffmpeg_path.as_deref(),
                config.bin_dir.as_deref(),
                &search,
            )?,
            ffprobe: locate(
                FFPROBE,
                config.ffprobe_path.as_deref(),
                config.bin_dir.as_deref(),
                &search,
            )?,
        })
    }
}

/// Explicit path first, then the bundled bin directory, then `PATH`.
/// A bare explicit name (`ffmpeg-6`) is looked up on `PATH` as well.
pub fn locate(
    tool: &'static str,
    explicit: Option<&Path>,
    bin_dir: Option<&Path>,
    search: &[PathBuf],
) -> Result<PathBuf, SetupError> {
    if let Some(explicit) = explicit {
        if explicit.is_file() {
            return Ok(explicit.to_path_buf());
        }
        let bare = explicit.components().count() == 1;
        if bare {
            if let Some(found) = find_in(search, &explicit.to_string_lossy()) {
                return Ok(found);
            }
        }
        return Err(SetupError::MissingBinary {
            tool,
            searched: explicit.display().to_string(),
        });
    }

    let mut searched = Vec::new();
    if let Some(dir) = bin_dir {
        if let Some(found) = find_in(&[dir.to_path_buf()], tool) {
            return Ok(found);
        }
        searched.push(dir.display().to_string());
    }
    if let Some(found) = find_in(search, tool) {
        return Ok(found);
    }
    searched.push("PATH".to_string());
    Err(SetupError::MissingBinary {
        tool,
        searched: searched.join(", "),
    })
}

fn find_in(dirs: &[PathBuf], name: &str) -> Option<PathBuf> {
    dirs.iter().find_map(|dir| {
        executable_names(name)
            .into_iter()
            .map(|candidate| dir.join(candidate))
            .find(|candidate| candidate.is_file())
    })
}

#[cfg(windows)]
fn executable_names(name: &str) -> Vec<String> {
    if name.to_ascii_lowercase().ends_with(".exe") {
        vec![name.to_string()]
    } else {
        vec![format!("{name}.exe"), name.to_string()]
    }
}

#[cfg(not(windows))]
fn executable_names(name: &str) -> Vec<String> {
    vec![name.to_string()]
}
