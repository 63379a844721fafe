#![allow(dead_code)]

use ffdeck_core::{
    event::{LifecycleEvent, LifecycleKind},
    media::{FormatDescriptor, MediaDescriptor},
};
use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};
use tokio::sync::mpsc;

/// Writes an executable `/bin/sh` script standing in for ffmpeg.
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write fake tool");
    let mut perms = fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod fake tool");
    path
}

/// Shell snippet that creates the file named by the last argument.
pub const TOUCH_LAST_ARG: &str = "for last; do :; done\n: > \"$last\"";

pub fn media_with_duration(seconds: f64) -> MediaDescriptor {
    MediaDescriptor {
        format: FormatDescriptor {
            duration: Some(seconds),
            ..Default::default()
        },
        streams: Vec::new(),
    }
}

pub fn drain(rx: &mut mpsc::Receiver<LifecycleEvent>) -> Vec<LifecycleEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn count(events: &[LifecycleEvent], kind: LifecycleKind) -> usize {
    events.iter().filter(|event| event.kind() == kind).count()
}

pub fn percents(events: &[LifecycleEvent]) -> Vec<f64> {
    events.iter().filter_map(LifecycleEvent::percent).collect()
}

pub fn assert_non_decreasing(values: &[f64]) {
    for pair in values.windows(2) {
        assert!(pair[1] >= pair[0], "progress went backwards: {values:?}");
    }
}
