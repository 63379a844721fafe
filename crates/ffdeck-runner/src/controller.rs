use crate::{
    process::{OutputLine, ProcessRunner, RunnerError},
    scratch::{ScratchDir, ScratchGuard},
};
use ffdeck_core::{
    event::{EventPayload, FailureKind, LifecycleEvent},
    job::{JobDescriptor, JobId},
    plan::{plan_stages, JobStage, StagePlan},
    progress::{interpret, JobProgress},
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

const LINE_BUFFER: usize = 256;

/// Drives one job through its stages and reports everything it does as
/// lifecycle events. `run` always settles with exactly one terminal event.
#[derive(Clone, Debug)]
pub struct JobController {
    ffmpeg: ProcessRunner,
    scratch: ScratchDir,
    events: mpsc::Sender<LifecycleEvent>,
}

struct StageFailure {
    kind: FailureKind,
    exit_code: Option<i32>,
    message: String,
}

impl StageFailure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            exit_code: None,
            message: message.into(),
        }
    }
}

impl From<RunnerError> for StageFailure {
    fn from(err: RunnerError) -> Self {
        let kind = match &err {
            RunnerError::Spawn { .. } => FailureKind::Spawn,
            RunnerError::Wait { .. } => FailureKind::Io,
            RunnerError::Cancelled { .. } => FailureKind::Cancelled,
        };
        Self::new(kind, err.to_string())
    }
}

struct Emitter {
    job_id: JobId,
    seq: u64,
    tx: mpsc::Sender<LifecycleEvent>,
}

impl Emitter {
    async fn emit(&mut self, payload: EventPayload) -> LifecycleEvent {
        let event = LifecycleEvent {
            job_id: self.job_id.clone(),
            seq: self.seq,
            payload,
        };
        self.seq += 1;
        if self.tx.send(event.clone()).await.is_err() {
            debug!(event = "job_event_dropped", job_id = %self.job_id, seq = event.seq);
        }
        event
    }
}

impl JobController {
    pub fn new(
        ffmpeg: ProcessRunner,
        scratch: ScratchDir,
        events: mpsc::Sender<LifecycleEvent>,
    ) -> Self {
        Self {
            ffmpeg,
            scratch,
            events,
        }
    }

    pub async fn run(&self, job: JobDescriptor) -> LifecycleEvent {
        // A receiver whose sender is gone never reports a cancellation.
        let (_, never) = watch::channel(false);
        self.run_cancellable(job, never).await
    }

    /// Returns the terminal event that was emitted.
    pub async fn run_cancellable(
        &self,
        job: JobDescriptor,
        cancel: watch::Receiver<bool>,
    ) -> LifecycleEvent {
        let mut emitter = Emitter {
            job_id: job.job_id.clone(),
            seq: 0,
            tx: self.events.clone(),
        };

        if let Err(err) = job.validate() {
            warn!(event = "job_rejected", job_id = %job.job_id, error = %err);
            return emitter
                .emit(EventPayload::Failed {
                    error: FailureKind::Invalid,
                    exit_code: None,
                    message: err.to_string(),
                })
                .await;
        }

        let plan = plan_stages(&job, &self.scratch.paths_for(&job.job_id));
        let guard = ScratchGuard::new(plan.scratch.clone());
        info!(
            event = "job_start",
            job_id = %job.job_id,
            kind = %job.kind,
            stages = plan.stages.len()
        );
        emitter
            .emit(EventPayload::Started {
                stages: plan.stages.len(),
            })
            .await;

        let outcome = self.execute(&plan, &mut emitter, cancel).await;
        guard.cleanup().await;

        let payload = match outcome {
            Ok(frames) => {
                info!(event = "job_completed", job_id = %job.job_id, frames = ?frames);
                EventPayload::Completed {
                    percent: 100.0,
                    frames,
                    message: format!("{} finished", job.kind),
                }
            }
            Err(failure) => {
                warn!(
                    event = "job_failed",
                    job_id = %job.job_id,
                    error = %failure.kind,
                    exit_code = ?failure.exit_code,
                    message = %failure.message
                );
                EventPayload::Failed {
                    error: failure.kind,
                    exit_code: failure.exit_code,
                    message: failure.message,
                }
            }
        };
        emitter.emit(payload).await
    }

    /// Runs every stage in order. On success returns the final frame count
    /// for jobs that count frames.
    async fn execute(
        &self,
        plan: &StagePlan,
        emitter: &mut Emitter,
        cancel: watch::Receiver<bool>,
    ) -> Result<Option<u64>, StageFailure> {
        if let Some(manifest) = &plan.manifest {
            tokio::fs::write(&manifest.path, &manifest.contents)
                .await
                .map_err(|err| {
                    StageFailure::new(
                        FailureKind::Io,
                        format!(
                            "failed to write concat manifest {}: {err}",
                            manifest.path.display()
                        ),
                    )
                })?;
        }

        let mut progress = JobProgress::new(plan.weights());
        let mut last_frame: Option<u64> = None;
        for (index, stage) in plan.stages.iter().enumerate() {
            if *cancel.borrow() {
                return Err(StageFailure::new(
                    FailureKind::Cancelled,
                    format!("cancelled before {}", stage.label),
                ));
            }
            debug!(
                event = "stage_start",
                job_id = %emitter.job_id,
                stage = stage.label,
                index,
                args = ?stage.args
            );
            self.run_stage(stage, emitter, &mut progress, &mut last_frame, cancel.clone())
                .await?;

            let overall = progress.finish_stage();
            if index + 1 < plan.stages.len() {
                emitter
                    .emit(EventPayload::Progress {
                        percent: Some(overall),
                        frame: None,
                        message: Some(format!("{} done", stage.label)),
                    })
                    .await;
            }
        }
        progress.complete();
        Ok(plan.frame_total.map(|_| last_frame.unwrap_or(0)))
    }

    async fn run_stage(
        &self,
        stage: &JobStage,
        emitter: &mut Emitter,
        progress: &mut JobProgress,
        last_frame: &mut Option<u64>,
        cancel: watch::Receiver<bool>,
    ) -> Result<(), StageFailure> {
        let (tx, mut rx) = mpsc::channel::<OutputLine>(LINE_BUFFER);
        let consume = async {
            while let Some(line) = rx.recv().await {
                let signal = interpret(&stage.mapper, &line.text);
                let (percent, frame) = match signal.update {
                    Some(update) => {
                        if update.frame.is_some() {
                            *last_frame = update.frame;
                        }
                        (update.percent.map(|p| progress.observe(p)), update.frame)
                    }
                    None => (None, None),
                };
                emitter
                    .emit(EventPayload::Progress {
                        percent,
                        frame,
                        message: Some(signal.raw),
                    })
                    .await;
            }
        };
        let (exit, ()) = tokio::join!(
            self.ffmpeg.run_cancellable(&stage.args, tx, cancel),
            consume
        );

        let exit = exit?;
        if exit.success() {
            return Ok(());
        }
        let message = match exit.code {
            Some(code) => format!("{} exited with code {code}", stage.label),
            None => format!("{} was terminated by a signal", stage.label),
        };
        Err(StageFailure {
            kind: FailureKind::Exit,
            exit_code: exit.code,
            message,
        })
    }
}
