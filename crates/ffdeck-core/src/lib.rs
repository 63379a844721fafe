//! Media job model for ffdeck: descriptors, argument builders, stage
//! planning and progress interpretation. Nothing in here spawns processes
//! or touches the filesystem.

pub mod command;
pub mod event;
pub mod job;
pub mod media;
pub mod plan;
pub mod progress;
pub mod timecode;

pub use event::{EventPayload, FailureKind, LifecycleEvent, LifecycleKind};
pub use job::{JobDescriptor, JobError, JobId, JobKind, JobSettings};
pub use media::{MediaDescriptor, MediaError};
