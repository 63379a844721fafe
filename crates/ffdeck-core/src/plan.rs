use crate::command::{
    convert_args, extract_audio_args, extract_frames_args, gif_encode_args, gif_palette_args,
    manifest_text, stitch_args, trim_args,
};
use crate::job::{JobDescriptor, JobSettings};
use crate::progress::{effective_duration, ProgressMapper};
use crate::timecode::parse_timecode;
use std::path::{Path, PathBuf};

pub const GIF_PALETTE_WEIGHT: f64 = 25.0;
pub const GIF_ENCODE_WEIGHT: f64 = 75.0;

/// Job-namespaced scratch locations handed in by whoever owns the scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchPaths {
    pub manifest: PathBuf,
    pub palette: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFile {
    pub path: PathBuf,
    pub contents: String,
}

/// One external-process invocation belonging to a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStage {
    pub label: &'static str,
    pub args: Vec<String>,
    /// Share of the whole job, in percent.
    pub weight: f64,
    pub mapper: ProgressMapper,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagePlan {
    pub stages: Vec<JobStage>,
    /// Written before the first stage runs.
    pub manifest: Option<ManifestFile>,
    /// Every scratch file the plan may create; removed when the job ends.
    pub scratch: Vec<PathBuf>,
    /// Expected frame count for frame extraction jobs.
    pub frame_total: Option<u64>,
}

impl StagePlan {
    pub fn weights(&self) -> impl Iterator<Item = f64> + '_ {
        self.stages.iter().map(|stage| stage.weight)
    }
}

/// Argument vectors, one per stage, for the given settings.
pub fn stage_args(
    settings: &JobSettings,
    inputs: &[PathBuf],
    output: &Path,
    scratch: &ScratchPaths,
) -> Vec<Vec<String>> {
    let input = inputs.first().map(PathBuf::as_path).unwrap_or(Path::new(""));
    match settings {
        JobSettings::Convert(convert) => vec![convert_args(convert, input, output)],
        JobSettings::Trim(trim) => vec![trim_args(trim, input, output)],
        JobSettings::ExtractAudio => vec![extract_audio_args(input, output)],
        JobSettings::ExtractFrames(frames) => vec![extract_frames_args(frames, input, output)],
        JobSettings::Stitch => vec![stitch_args(&scratch.manifest, output)],
        JobSettings::Gif(gif) => vec![
            gif_palette_args(gif, input, &scratch.palette),
            gif_encode_args(gif, input, &scratch.palette, output),
        ],
    }
}

pub fn plan_stages(job: &JobDescriptor, scratch: &ScratchPaths) -> StagePlan {
    let mut args = stage_args(&job.settings, &job.inputs, &job.output, scratch).into_iter();
    let mut next_args = || args.next().unwrap_or_default();
    let source_duration = job.source_duration();
    let time_mapper = ProgressMapper::Time {
        duration: source_duration,
    };

    match &job.settings {
        JobSettings::Convert(convert) => {
            let limit = convert
                .output
                .time_limit
                .as_deref()
                .and_then(parse_timecode);
            single_stage(
                "convert",
                next_args(),
                ProgressMapper::Time {
                    duration: effective_duration(source_duration, limit),
                },
            )
        }
        JobSettings::Trim(_) => single_stage("trim", next_args(), time_mapper),
        JobSettings::ExtractAudio => single_stage("extract-audio", next_args(), time_mapper),
        JobSettings::ExtractFrames(frames) => {
            let total = job
                .source
                .as_ref()
                .map(|source| source.estimated_frame_count(frames.fps))
                .unwrap_or(0);
            let mut plan = single_stage(
                "extract-frames",
                next_args(),
                ProgressMapper::Frames { total },
            );
            plan.frame_total = Some(total);
            plan
        }
        JobSettings::Stitch => {
            let mut plan = single_stage("stitch", next_args(), time_mapper);
            plan.manifest = Some(ManifestFile {
                path: scratch.manifest.clone(),
                contents: manifest_text(&job.inputs),
            });
            plan.scratch.push(scratch.manifest.clone());
            plan
        }
        JobSettings::Gif(_) => StagePlan {
            stages: vec![
                JobStage {
                    label: "gif-palette",
                    args: next_args(),
                    weight: GIF_PALETTE_WEIGHT,
                    mapper: ProgressMapper::Fixed,
                },
                JobStage {
                    label: "gif-encode",
                    args: next_args(),
                    weight: GIF_ENCODE_WEIGHT,
                    mapper: ProgressMapper::Fixed,
                },
            ],
            manifest: None,
            scratch: vec![scratch.palette.clone()],
            frame_total: None,
        },
    }
}

fn single_stage(label: &'static str, args: Vec<String>, mapper: ProgressMapper) -> StagePlan {
    StagePlan {
        stages: vec![JobStage {
            label,
            args,
            weight: 100.0,
            mapper,
        }],
        manifest: None,
        scratch: Vec::new(),
        frame_total: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{
        ConvertSettings, FrameSettings, GifSettings, ImageFormat, JobId, OutputConstraints,
    };
    use crate::media::{FormatDescriptor, MediaDescriptor};

    fn scratch() -> ScratchPaths {
        ScratchPaths {
            manifest: PathBuf::from("/scratch/j1-manifest.txt"),
            palette: PathBuf::from("/scratch/j1-palette.png"),
        }
    }

    fn media(duration: f64) -> MediaDescriptor {
        MediaDescriptor {
            format: FormatDescriptor {
                duration: Some(duration),
                ..Default::default()
            },
            streams: Vec::new(),
        }
    }

    #[test]
    fn gif_plan_has_two_weighted_stages_and_a_palette_artifact() {
        let job = JobDescriptor::new(
            JobId::new("j1"),
            JobSettings::Gif(GifSettings::default()),
            vec![PathBuf::from("in.mp4")],
            "out.gif",
        );
        let plan = plan_stages(&job, &scratch());
        assert_eq!(plan.stages.len(), 2);
        assert_eq!(plan.weights().sum::<f64>(), 100.0);
        assert_eq!(plan.stages[0].weight, 25.0);
        assert!(plan
            .stages
            .iter()
            .all(|stage| stage.mapper == ProgressMapper::Fixed));
        assert_eq!(plan.scratch, vec![PathBuf::from("/scratch/j1-palette.png")]);
        assert_eq!(
            plan.stages[0].args.last().map(String::as_str),
            Some("/scratch/j1-palette.png")
        );
    }

    #[test]
    fn stitch_plan_carries_manifest() {
        let job = JobDescriptor::new(
            JobId::new("j1"),
            JobSettings::Stitch,
            vec![PathBuf::from("a.mp4"), PathBuf::from("b's.mp4")],
            "joined.mp4",
        );
        let plan = plan_stages(&job, &scratch());
        assert_eq!(plan.stages.len(), 1);
        let manifest = plan.manifest.expect("manifest");
        assert_eq!(manifest.path, PathBuf::from("/scratch/j1-manifest.txt"));
        assert_eq!(manifest.contents, "file 'a.mp4'\nfile 'b'\\''s.mp4'");
        assert_eq!(plan.scratch, vec![manifest.path]);
        assert!(plan.stages[0]
            .args
            .iter()
            .any(|a| a == "/scratch/j1-manifest.txt"));
    }

    #[test]
    fn frame_plan_precomputes_total() {
        let job = JobDescriptor::new(
            JobId::new("j1"),
            JobSettings::ExtractFrames(FrameSettings {
                fps: 2.5,
                format: ImageFormat::Png,
            }),
            vec![PathBuf::from("in.mp4")],
            "frames",
        )
        .with_source(media(120.9));
        let plan = plan_stages(&job, &scratch());
        assert_eq!(plan.frame_total, Some(302));
        assert_eq!(plan.stages[0].mapper, ProgressMapper::Frames { total: 302 });
    }

    #[test]
    fn convert_plan_uses_shorter_time_limit() {
        let job = JobDescriptor::new(
            JobId::new("j1"),
            JobSettings::Convert(ConvertSettings {
                output: OutputConstraints {
                    time_limit: Some("00:00:30".to_string()),
                    buffer_size_kbps: None,
                },
                ..Default::default()
            }),
            vec![PathBuf::from("in.mp4")],
            "out.mp4",
        )
        .with_source(media(120.0));
        let plan = plan_stages(&job, &scratch());
        assert_eq!(
            plan.stages[0].mapper,
            ProgressMapper::Time {
                duration: Some(30.0)
            }
        );
        assert!(plan.scratch.is_empty());
    }

    #[test]
    fn single_stage_kinds_weigh_one_hundred() {
        for settings in [
            JobSettings::ExtractAudio,
            JobSettings::Trim(Default::default()),
            JobSettings::Convert(Default::default()),
        ] {
            let job = JobDescriptor::new(
                JobId::new("j1"),
                settings,
                vec![PathBuf::from("in.mp4")],
                "out.mp4",
            );
            let plan = plan_stages(&job, &scratch());
            assert_eq!(plan.stages.len(), 1);
            assert_eq!(plan.stages[0].weight, 100.0);
            assert!(plan.manifest.is_none());
        }
    }
}
