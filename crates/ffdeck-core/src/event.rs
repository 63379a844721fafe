use crate::job::JobId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleKind {
    Started,
    Progress,
    Completed,
    Failed,
}

impl LifecycleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleKind::Started => "STARTED",
            LifecycleKind::Progress => "PROGRESS",
            LifecycleKind::Completed => "COMPLETED",
            LifecycleKind::Failed => "FAILED",
        }
    }
}

impl fmt::Display for LifecycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The descriptor was rejected before any process ran.
    Invalid,
    /// The external tool could not be started.
    Spawn,
    /// The external tool ran and exited non-zero (or was killed by a signal).
    Exit,
    /// Scratch artifacts could not be written, or the process could not be awaited.
    Io,
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Invalid => "invalid",
            FailureKind::Spawn => "spawn",
            FailureKind::Exit => "exit",
            FailureKind::Io => "io",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    Started {
        stages: usize,
    },
    Progress {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        percent: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frame: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Completed {
        percent: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frames: Option<u64>,
        message: String,
    },
    Failed {
        error: FailureKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        message: String,
    },
}

/// One-shot notification about a job. `seq` counts from 0 per job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LifecycleEvent {
    pub job_id: JobId,
    pub seq: u64,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl LifecycleEvent {
    pub fn kind(&self) -> LifecycleKind {
        match self.payload {
            EventPayload::Started { .. } => LifecycleKind::Started,
            EventPayload::Progress { .. } => LifecycleKind::Progress,
            EventPayload::Completed { .. } => LifecycleKind::Completed,
            EventPayload::Failed { .. } => LifecycleKind::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind(),
            LifecycleKind::Completed | LifecycleKind::Failed
        )
    }

    pub fn percent(&self) -> Option<f64> {
        match &self.payload {
            EventPayload::Progress { percent, .. } => *percent,
            EventPayload::Completed { percent, .. } => Some(*percent),
            _ => None,
        }
    }
}
