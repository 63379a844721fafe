use crate::{
    config::DEFAULT_EVENT_BUFFER,
    controller::JobController,
    preview::{generate_preview, PreviewError},
    probe::{probe, ProbeError},
    process::ProcessRunner,
    scratch::ScratchDir,
    toolchain::Toolchain,
};
use ffdeck_core::{
    event::LifecycleEvent,
    job::{JobDescriptor, JobId},
    media::MediaDescriptor,
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex as StdMutex},
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, warn};

pub type EventBatch = Vec<LifecycleEvent>;

type CancelMap = Arc<StdMutex<HashMap<JobId, watch::Sender<bool>>>>;

/// A submitted job plus a private channel carrying its terminal event.
/// Lagging broadcast subscribers can fall back to `outcome`.
pub struct JobTicket {
    pub job_id: JobId,
    pub outcome: oneshot::Receiver<LifecycleEvent>,
}

/// Entry point for submitting jobs and observing them. Must be created
/// inside a tokio runtime; it spawns the task that batches events.
pub struct JobService {
    toolchain: Toolchain,
    scratch: ScratchDir,
    controller: JobController,
    batches: broadcast::Sender<EventBatch>,
    cancels: CancelMap,
}

impl JobService {
    pub fn new(toolchain: Toolchain, scratch: ScratchDir) -> Self {
        Self::with_event_buffer(toolchain, scratch, DEFAULT_EVENT_BUFFER)
    }

    pub fn with_event_buffer(toolchain: Toolchain, scratch: ScratchDir, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (batches, _) = broadcast::channel(capacity);
        tokio::spawn(forward_batches(event_rx, batches.clone()));

        let controller = JobController::new(
            ProcessRunner::new(&toolchain.ffmpeg),
            scratch.clone(),
            event_tx,
        );
        Self {
            toolchain,
            scratch,
            controller,
            batches,
            cancels: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    pub fn scratch(&self) -> &ScratchDir {
        &self.scratch
    }

    /// Events emitted before a receiver subscribes are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<EventBatch> {
        self.batches.subscribe()
    }

    /// Starts the job in the background; its outcome arrives only as events.
    pub fn submit(&self, job: JobDescriptor) -> JobId {
        self.submit_tracked(job).job_id
    }

    pub fn submit_tracked(&self, job: JobDescriptor) -> JobTicket {
        let job_id = job.job_id.clone();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        match self.cancels.lock() {
            Ok(mut cancels) => {
                if cancels.insert(job_id.clone(), cancel_tx).is_some() {
                    warn!(event = "job_id_reused", job_id = %job_id);
                }
            }
            Err(_) => warn!(event = "cancel_registry_poisoned", job_id = %job_id),
        }

        let (outcome_tx, outcome) = oneshot::channel();
        let controller = self.controller.clone();
        let cancels = self.cancels.clone();
        let task_id = job_id.clone();
        tokio::spawn(async move {
            let terminal = controller.run_cancellable(job, cancel_rx).await;
            if let Ok(mut cancels) = cancels.lock() {
                cancels.remove(&task_id);
            }
            // Dropped tickets are fine.
            let _ = outcome_tx.send(terminal);
        });
        JobTicket { job_id, outcome }
    }

    /// Returns `false` when the job is unknown or already settled.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        let sender = match self.cancels.lock() {
            Ok(cancels) => cancels.get(job_id).cloned(),
            Err(_) => None,
        };
        match sender {
            Some(sender) => {
                debug!(event = "job_cancel_requested", job_id = %job_id);
                sender.send(true).is_ok()
            }
            None => false,
        }
    }

    pub async fn probe(&self, path: &Path) -> Result<MediaDescriptor, ProbeError> {
        probe(&self.toolchain.ffprobe, path).await
    }

    pub async fn preview(&self, path: &Path) -> Result<PathBuf, PreviewError> {
        let runner = ProcessRunner::new(&self.toolchain.ffmpeg);
        generate_preview(&runner, &self.scratch, &JobId::generate(), path).await
    }
}

/// Groups whatever events are already queued into one batch per wakeup.
async fn forward_batches(
    mut events: mpsc::Receiver<LifecycleEvent>,
    batches: broadcast::Sender<EventBatch>,
) {
    while let Some(first) = events.recv().await {
        let mut batch = vec![first];
        while let Ok(next) = events.try_recv() {
            batch.push(next);
        }
        // No subscribers is fine; events are fire-and-forget.
        let _ = batches.send(batch);
    }
}
