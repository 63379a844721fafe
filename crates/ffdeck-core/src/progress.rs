use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Which interpretation a stage applies to its diagnostic lines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ProgressMapper {
    /// `time=HH:MM:SS.cc` against an effective duration in seconds.
    Time { duration: Option<f64> },
    /// `frame=N` against an expected frame total.
    Frames { total: u64 },
    /// The stage reports nothing measurable; only its completion counts.
    Fixed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressUpdate {
    /// Stage-local completion in `[0, 100]`.
    pub percent: Option<f64>,
    pub frame: Option<u64>,
    pub elapsed_seconds: Option<f64>,
}

/// Result of feeding one diagnostic line through a mapper. The raw text is
/// always kept so callers can surface it even when it carried no signal.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSignal {
    pub raw: String,
    pub update: Option<ProgressUpdate>,
}

fn time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"time=(\d{2}):(\d{2}):(\d{2})\.(\d{2})").expect("valid time regex")
    })
}

fn frame_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"frame=\s*(\d+)").expect("valid frame regex"))
}

pub fn interpret(mapper: &ProgressMapper, line: &str) -> LineSignal {
    let update = match mapper {
        ProgressMapper::Time { duration } => interpret_time(line, *duration),
        ProgressMapper::Frames { total } => interpret_frames(line, *total),
        ProgressMapper::Fixed => None,
    };
    LineSignal {
        raw: line.to_string(),
        update,
    }
}

/// Elapsed output time reported by a `time=` field, in seconds.
pub fn parse_elapsed(line: &str) -> Option<f64> {
    let caps = time_pattern().captures(line)?;
    let field = |idx: usize| caps.get(idx).and_then(|m| m.as_str().parse::<f64>().ok());
    let hours = field(1)?;
    let minutes = field(2)?;
    let seconds = field(3)?;
    let centis = field(4)?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds + centis / 100.0)
}

pub fn parse_frame(line: &str) -> Option<u64> {
    frame_pattern()
        .captures(line)?
        .get(1)?
        .as_str()
        .parse::<u64>()
        .ok()
}

fn interpret_time(line: &str, duration: Option<f64>) -> Option<ProgressUpdate> {
    let elapsed = parse_elapsed(line)?;
    let percent = duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(|d| clamp_percent(elapsed / d * 100.0));
    Some(ProgressUpdate {
        percent,
        frame: None,
        elapsed_seconds: Some(elapsed),
    })
}

fn interpret_frames(line: &str, total: u64) -> Option<ProgressUpdate> {
    let frame = parse_frame(line)?;
    let percent = (total > 0).then(|| clamp_percent(frame as f64 / total as f64 * 100.0));
    Some(ProgressUpdate {
        percent,
        frame: Some(frame),
        elapsed_seconds: None,
    })
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Duration progress is measured against: the probed duration, or the
/// output time limit when one is set and shorter. Unknown or zero → `None`.
pub fn effective_duration(source: Option<f64>, time_limit: Option<f64>) -> Option<f64> {
    let valid = |v: &f64| v.is_finite() && *v > 0.0;
    match (source.filter(valid), time_limit.filter(valid)) {
        (Some(source), Some(limit)) => Some(source.min(limit)),
        (Some(source), None) => Some(source),
        (None, limit) => limit,
    }
}

/// Per-stage high-water mark.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageProgress {
    best: f64,
}

impl StageProgress {
    pub fn observe(&mut self, percent: f64) -> f64 {
        let percent = clamp_percent(percent);
        if percent > self.best {
            self.best = percent;
        }
        self.best
    }
}

/// Folds stage-local percentages into one job-wide figure that never
/// decreases and stays within the running stage's weight band.
#[derive(Debug, Clone)]
pub struct JobProgress {
    weights: Vec<f64>,
    stage: usize,
    completed: f64,
    current: StageProgress,
    reported: f64,
}

impl JobProgress {
    /// Weights are rescaled to sum to 100.
    pub fn new(weights: impl IntoIterator<Item = f64>) -> Self {
        let mut weights: Vec<f64> = weights
            .into_iter()
            .map(|w| if w.is_finite() && w > 0.0 { w } else { 0.0 })
            .collect();
        let sum: f64 = weights.iter().sum();
        if sum > 0.0 {
            for weight in &mut weights {
                *weight = *weight * 100.0 / sum;
            }
        } else if !weights.is_empty() {
            let even = 100.0 / weights.len() as f64;
            weights.iter_mut().for_each(|w| *w = even);
        }
        Self {
            weights,
            stage: 0,
            completed: 0.0,
            current: StageProgress::default(),
            reported: 0.0,
        }
    }

    pub fn stage(&self) -> usize {
        self.stage
    }

    /// Record a stage-local percentage; returns the job-wide figure.
    pub fn observe(&mut self, stage_percent: f64) -> f64 {
        let weight = self.weights.get(self.stage).copied().unwrap_or(0.0);
        let local = self.current.observe(stage_percent);
        let computed = (self.completed + weight * local / 100.0).min(100.0);
        self.reported = self.reported.max(computed);
        self.reported
    }

    /// Mark the running stage done and move to the next one.
    pub fn finish_stage(&mut self) -> f64 {
        if let Some(weight) = self.weights.get(self.stage) {
            self.completed = (self.completed + weight).min(100.0);
            self.stage += 1;
        }
        self.current = StageProgress::default();
        self.reported = self.reported.max(self.completed);
        self.reported
    }

    pub fn complete(&mut self) -> f64 {
        self.stage = self.weights.len();
        self.completed = 100.0;
        self.reported = 100.0;
        self.reported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_line_maps_to_half_of_duration() {
        let mapper = ProgressMapper::Time {
            duration: Some(120.0),
        };
        let line = concat!(
            "frame= 1440 fps=240 q=28.0 size=  1024kB ",
            "time=00:01:00.00 bitrate= 139.8kbits/s speed=10x"
        );
        let signal = interpret(&mapper, line);
        let percent = signal.update.and_then(|u| u.percent).expect("percent");
        assert!((percent - 50.0).abs() < 0.1);
    }

    #[test]
    fn frame_line_maps_against_total() {
        let mapper = ProgressMapper::Frames { total: 300 };
        let update = interpret(&mapper, "frame=  150 fps= 30 q=-0.0 size=N/A")
            .update
            .expect("update");
        assert_eq!(update.percent, Some(50.0));
        assert_eq!(update.frame, Some(150));
    }

    #[test]
    fn frame_line_without_total_is_status_only() {
        let update = interpret(&ProgressMapper::Frames { total: 0 }, "frame=  12")
            .update
            .expect("update");
        assert_eq!(update.percent, None);
        assert_eq!(update.frame, Some(12));
    }

    #[test]
    fn unknown_duration_disables_percent() {
        for duration in [None, Some(0.0), Some(f64::NAN)] {
            let update = interpret(&ProgressMapper::Time { duration }, "time=00:00:10.00")
                .update
                .expect("update");
            assert_eq!(update.percent, None);
            assert_eq!(update.elapsed_seconds, Some(10.0));
        }
    }

    #[test]
    fn unmatched_line_keeps_raw_text() {
        let line = "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'clip.mp4':";
        let signal = interpret(&ProgressMapper::Time { duration: Some(5.0) }, line);
        assert!(signal.update.is_none());
        assert_eq!(signal.raw, line);
    }

    #[test]
    fn first_time_match_wins() {
        assert_eq!(parse_elapsed("time=00:00:02.00 time=00:00:09.00"), Some(2.0));
    }

    #[test]
    fn overshoot_is_clamped() {
        let update = interpret(
            &ProgressMapper::Time {
                duration: Some(10.0),
            },
            "time=00:00:12.50",
        )
        .update
        .expect("update");
        assert_eq!(update.percent, Some(100.0));
    }

    #[test]
    fn effective_duration_prefers_shorter_limit() {
        assert_eq!(effective_duration(Some(120.0), Some(30.0)), Some(30.0));
        assert_eq!(effective_duration(Some(120.0), Some(300.0)), Some(120.0));
        assert_eq!(effective_duration(None, Some(30.0)), Some(30.0));
        assert_eq!(effective_duration(Some(0.0), None), None);
    }

    #[test]
    fn job_progress_never_regresses_on_out_of_order_timestamps() {
        let mapper = ProgressMapper::Time {
            duration: Some(20.0),
        };
        let mut progress = JobProgress::new([100.0]);
        let mut last = 0.0;
        for line in ["time=00:00:10.00", "time=00:00:05.00", "time=00:00:12.00"] {
            let percent = interpret(&mapper, line)
                .update
                .and_then(|u| u.percent)
                .expect("percent");
            let overall = progress.observe(percent);
            assert!(overall >= last);
            last = overall;
        }
        assert_eq!(last, 60.0);
    }

    #[test]
    fn two_stage_weights_cap_each_band() {
        let mut progress = JobProgress::new([25.0, 75.0]);
        assert_eq!(progress.observe(100.0), 25.0);
        assert_eq!(progress.finish_stage(), 25.0);
        assert_eq!(progress.stage(), 1);
        assert_eq!(progress.observe(50.0), 62.5);
        assert_eq!(progress.observe(10.0), 62.5);
        assert_eq!(progress.finish_stage(), 100.0);
        assert_eq!(progress.complete(), 100.0);
    }

    #[test]
    fn weights_are_rescaled() {
        let mut progress = JobProgress::new([1.0, 3.0]);
        assert_eq!(progress.finish_stage(), 25.0);
        let mut even = JobProgress::new([0.0, 0.0]);
        assert_eq!(even.finish_stage(), 50.0);
    }
}
