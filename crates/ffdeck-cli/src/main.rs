mod logging;
mod render;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ffdeck_core::{
    event::{FailureKind, LifecycleEvent},
    job::{
        AudioAction, AudioSettings, ConvertSettings, FrameSettings, GifSettings, ImageFormat,
        JobDescriptor, JobId, JobSettings, OutputConstraints, TrimSettings, VideoCodec,
        VideoSettings,
    },
    media::MediaDescriptor,
    EventPayload,
};
use ffdeck_runner::{
    probe::probe_all, scratch::ScratchDir, Config, ConfigOverrides, JobService, JobTicket,
    SetupError, Toolchain,
};
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

const EXIT_JOB_FAILED: u8 = 1;
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "ffdeck", version, about = "Probe media and run ffmpeg jobs with progress")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Path to the ffmpeg binary.
    #[arg(long, global = true)]
    ffmpeg: Option<PathBuf>,
    /// Path to the ffprobe binary.
    #[arg(long, global = true)]
    ffprobe: Option<PathBuf>,
    /// Directory holding bundled ffmpeg/ffprobe binaries.
    #[arg(long, global = true)]
    bin_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    scratch_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Emit machine-readable JSON lines instead of text.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print container and stream details.
    Probe { input: PathBuf },
    /// Re-encode or remux a file.
    Convert(ConvertArgs),
    /// Cut a time range without re-encoding.
    Trim {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// Copy the audio track out of a file.
    ExtractAudio {
        input: PathBuf,
        /// Defaults to `<input stem>-audio.<ext>` with an extension matching the codec.
        output: Option<PathBuf>,
    },
    /// Dump frames as numbered images.
    ExtractFrames {
        input: PathBuf,
        output_dir: PathBuf,
        #[arg(long, default_value_t = 1.0)]
        fps: f64,
        #[arg(long, default_value = "jpg")]
        format: ImageFormat,
    },
    /// Concatenate files without re-encoding.
    Stitch {
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Render an animated GIF with a generated palette.
    Gif {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        fps: Option<f64>,
        #[arg(long)]
        width: Option<u32>,
    },
    /// Write a thumbnail to the scratch directory and print its path.
    Preview { input: PathBuf },
}

#[derive(Args, Debug)]
struct ConvertArgs {
    input: PathBuf,
    output: PathBuf,
    /// Video codec, or `copy` to keep the stream as is.
    #[arg(long, default_value = "copy")]
    video_codec: String,
    #[arg(long)]
    crf: Option<u32>,
    /// Video bitrate in kb/s.
    #[arg(long)]
    video_bitrate: Option<u32>,
    /// Target size such as `1280:720` or `1280:-2`.
    #[arg(long)]
    resolution: Option<String>,
    #[arg(long)]
    frame_rate: Option<String>,
    #[arg(long)]
    pix_fmt: Option<String>,
    #[arg(long)]
    gop: Option<u32>,
    /// copy, convert or remove.
    #[arg(long, default_value = "copy")]
    audio: AudioAction,
    #[arg(long)]
    audio_codec: Option<String>,
    /// Audio bitrate in kb/s.
    #[arg(long)]
    audio_bitrate: Option<u32>,
    #[arg(long)]
    sample_rate: Option<u32>,
    /// Stop writing after this much output, e.g. `00:00:30`.
    #[arg(long)]
    time_limit: Option<String>,
    /// Rate-control buffer in kb.
    #[arg(long)]
    bufsize: Option<u32>,
}

impl ConvertArgs {
    fn settings(&self) -> ConvertSettings {
        ConvertSettings {
            video: VideoSettings {
                codec: VideoCodec::from(self.video_codec.clone()),
                crf: self.crf,
                bitrate_kbps: self.video_bitrate,
                resolution: self.resolution.clone(),
                frame_rate: self.frame_rate.clone(),
                pixel_format: self.pix_fmt.clone(),
                gop: self.gop,
            },
            audio: AudioSettings {
                action: self.audio,
                codec: self.audio_codec.clone(),
                bitrate_kbps: self.audio_bitrate,
                sample_rate: self.sample_rate,
            },
            output: OutputConstraints {
                time_limit: self.time_limit.clone(),
                buffer_size_kbps: self.bufsize,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let json = cli.global.json;
    let config = Config::load(overrides(&cli.global)).context("loading configuration")?;
    let _log_guard = logging::init(&config);

    let toolchain = Toolchain::resolve(&config).context("locating ffmpeg tools")?;
    let scratch = ScratchDir::new(&config.scratch_dir);
    scratch
        .ensure()
        .await
        .map_err(|source| SetupError::Scratch {
            path: config.scratch_dir.clone(),
            source,
        })
        .context("preparing scratch directory")?;
    info!(
        event = "startup",
        ffmpeg = %toolchain.ffmpeg.display(),
        ffprobe = %toolchain.ffprobe.display(),
        scratch = %scratch.root().display()
    );
    let service = JobService::with_event_buffer(toolchain, scratch, config.event_buffer);

    match cli.command {
        Command::Probe { input } => {
            let media = service
                .probe(&input)
                .await
                .with_context(|| format!("probing {}", input.display()))?;
            render::media(&media, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Preview { input } => {
            let path = service
                .preview(&input)
                .await
                .with_context(|| format!("generating preview for {}", input.display()))?;
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        command => {
            let job = build_job(&service, command).await?;
            run_job(&service, job, json).await
        }
    }
}

fn overrides(global: &GlobalArgs) -> ConfigOverrides {
    ConfigOverrides {
        ffmpeg_path: global.ffmpeg.clone(),
        ffprobe_path: global.ffprobe.clone(),
        bin_dir: global.bin_dir.clone(),
        scratch_dir: global.scratch_dir.clone(),
        log_dir: global.log_dir.clone(),
        log_level: global.log_level.clone(),
    }
}

async fn build_job(service: &JobService, command: Command) -> Result<JobDescriptor> {
    let job_id = JobId::generate();
    let (mut job, source) = match command {
        Command::Convert(args) => {
            let source = source_of(service, &args.input).await;
            let job = JobDescriptor::new(
                job_id,
                JobSettings::Convert(args.settings()),
                vec![args.input],
                args.output,
            );
            (job, source)
        }
        Command::Trim {
            input,
            output,
            start,
            end,
        } => {
            let source = source_of(service, &input).await;
            let job = JobDescriptor::new(
                job_id,
                JobSettings::Trim(TrimSettings { start, end }),
                vec![input],
                output,
            );
            (job, source)
        }
        Command::ExtractAudio { input, output } => {
            let source = source_of(service, &input).await;
            let output = output.unwrap_or_else(|| {
                let extension = source
                    .as_ref()
                    .and_then(MediaDescriptor::audio_extension)
                    .unwrap_or_else(|| "m4a".to_string());
                let stem = input
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "audio".to_string());
                input.with_file_name(format!("{stem}-audio.{extension}"))
            });
            let job = JobDescriptor::new(job_id, JobSettings::ExtractAudio, vec![input], output);
            (job, source)
        }
        Command::ExtractFrames {
            input,
            output_dir,
            fps,
            format,
        } => {
            let source = source_of(service, &input).await;
            std::fs::create_dir_all(&output_dir)
                .with_context(|| format!("creating {}", output_dir.display()))?;
            let job = JobDescriptor::new(
                job_id,
                JobSettings::ExtractFrames(FrameSettings { fps, format }),
                vec![input],
                output_dir,
            );
            (job, source)
        }
        Command::Stitch { inputs, output } => {
            let inputs = absolute_inputs(inputs)?;
            let source = match probe_all(&service.toolchain().ffprobe, &inputs).await {
                Ok(media) => Some(media),
                Err(err) => {
                    warn!(event = "probe_failed", error = %err);
                    None
                }
            };
            let job = JobDescriptor::new(job_id, JobSettings::Stitch, inputs, output);
            (job, source)
        }
        Command::Gif {
            input,
            output,
            start,
            end,
            fps,
            width,
        } => {
            let source = source_of(service, &input).await;
            let job = JobDescriptor::new(
                job_id,
                JobSettings::Gif(GifSettings {
                    start,
                    end,
                    fps,
                    width,
                }),
                vec![input],
                output,
            );
            (job, source)
        }
        Command::Probe { .. } | Command::Preview { .. } => bail!("not a job command"),
    };
    job.source = source;
    Ok(job)
}

/// Probe failures only cost percentage reporting, so they do not stop the job.
async fn source_of(service: &JobService, input: &Path) -> Option<MediaDescriptor> {
    match service.probe(input).await {
        Ok(media) => Some(media),
        Err(err) => {
            warn!(event = "probe_failed", input = %input.display(), error = %err);
            None
        }
    }
}

async fn run_job(service: &JobService, job: JobDescriptor, json: bool) -> Result<ExitCode> {
    let mut events = service.subscribe();
    let JobTicket {
        job_id,
        mut outcome,
    } = service.submit_tracked(job);
    let mut cancel_sent = false;
    // Once batches were dropped the terminal event may be among them.
    let mut lagged = false;

    loop {
        tokio::select! {
            batch = events.recv(), if !lagged => match batch {
                Ok(batch) => {
                    for event in batch.iter().filter(|event| event.job_id == job_id) {
                        render::event(event, json)?;
                        if event.is_terminal() {
                            return Ok(ExitCode::from(exit_status(event)));
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(event = "events_lagged", job_id = %job_id, skipped);
                    lagged = true;
                }
                Err(RecvError::Closed) => bail!("event stream closed before {job_id} settled"),
            },
            terminal = &mut outcome, if lagged => {
                let terminal =
                    terminal.with_context(|| format!("{job_id} ended without an outcome"))?;
                render::event(&terminal, json)?;
                return Ok(ExitCode::from(exit_status(&terminal)));
            }
            signal = tokio::signal::ctrl_c(), if !cancel_sent => {
                if signal.is_ok() {
                    cancel_sent = true;
                    info!(event = "cancel_requested", job_id = %job_id);
                    service.cancel(&job_id);
                }
            }
        }
    }
}

/// The concat manifest lives in the scratch directory and ffmpeg resolves its
/// relative entries against that directory, so inputs are anchored to the
/// working directory first.
fn absolute_inputs(inputs: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    inputs
        .into_iter()
        .map(|input| {
            std::path::absolute(&input)
                .with_context(|| format!("resolving {}", input.display()))
        })
        .collect()
}

fn exit_status(event: &LifecycleEvent) -> u8 {
    match &event.payload {
        EventPayload::Completed { .. } => 0,
        EventPayload::Failed {
            error: FailureKind::Cancelled,
            ..
        } => EXIT_CANCELLED,
        _ => EXIT_JOB_FAILED,
    }
}
