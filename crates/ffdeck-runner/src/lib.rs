//! Async side of ffdeck: spawns ffmpeg/ffprobe, drives jobs through their
//! stages and publishes lifecycle events.

pub mod config;
pub mod controller;
pub mod preview;
pub mod probe;
pub mod process;
pub mod scratch;
pub mod service;
pub mod toolchain;

pub use config::{Config, ConfigError, ConfigOverrides};
pub use controller::JobController;
pub use service::{EventBatch, JobService, JobTicket};
pub use toolchain::{SetupError, Toolchain};
