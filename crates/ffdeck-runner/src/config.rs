use serde::Deserialize;
use std::{
    env, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const DEFAULT_EVENT_BUFFER: usize = 1024;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// On-disk shape of `config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub bin_dir: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub event_buffer: Option<usize>,
}

/// Values given on the command line; they win over everything else.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub bin_dir: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub bin_dir: Option<PathBuf>,
    pub scratch_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub log_level: String,
    pub event_buffer: usize,
}

impl Config {
    /// Flags, then `FFDECK_*` environment, then the config file, then defaults.
    pub fn load(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let file = read_file(&config_path())?;
        Ok(Self::layered(overrides, |key| env::var(key).ok(), file))
    }

    pub fn layered<F>(overrides: ConfigOverrides, env_var: F, file: FileConfig) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let from_env = |key: &str| {
            env_var(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let path_from_env = |key: &str| from_env(key).map(PathBuf::from);

        Self {
            ffmpeg_path: overrides
                .ffmpeg_path
                .or_else(|| path_from_env("FFDECK_FFMPEG"))
                .or(file.ffmpeg_path),
            ffprobe_path: overrides
                .ffprobe_path
                .or_else(|| path_from_env("FFDECK_FFPROBE"))
                .or(file.ffprobe_path),
            bin_dir: overrides
                .bin_dir
                .or_else(|| path_from_env("FFDECK_BIN_DIR"))
                .or(file.bin_dir),
            scratch_dir: overrides
                .scratch_dir
                .or_else(|| path_from_env("FFDECK_SCRATCH_DIR"))
                .or(file.scratch_dir)
                .unwrap_or_else(default_scratch_dir),
            log_dir: overrides
                .log_dir
                .or_else(|| path_from_env("FFDECK_LOG_DIR"))
                .or(file.log_dir),
            log_level: overrides
                .log_level
                .or_else(|| from_env("FFDECK_LOG_LEVEL"))
                .or(file.log_level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            event_buffer: file
                .event_buffer
                .filter(|size| *size > 0)
                .unwrap_or(DEFAULT_EVENT_BUFFER),
        }
    }
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = env::var("FFDECK_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::config_dir()
        .unwrap_or_else(env::temp_dir)
        .join("ffdeck/config.toml")
}

/// A missing file is an empty config; a malformed one is an error.
pub fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(FileConfig::default()),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn default_scratch_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("ffdeck").join("scratch"))
        .unwrap_or_else(|| env::temp_dir().join("ffdeck-scratch"))
}
