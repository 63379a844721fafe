#![cfg(unix)]

mod support;

use ffdeck_core::{
    event::{EventPayload, FailureKind, LifecycleEvent, LifecycleKind},
    job::{JobDescriptor, JobId, JobSettings, TrimSettings},
};
use ffdeck_runner::{
    probe::ProbeError, scratch::ScratchDir, service::EventBatch, JobService, Toolchain,
};
use std::{collections::HashSet, path::Path, time::Duration};
use support::{fake_tool, TOUCH_LAST_ARG};
use tokio::sync::broadcast;

const PROBE_JSON: &str = r#"{
  "streams": [
    {"index": 0, "codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720, "r_frame_rate": "30/1"},
    {"index": 1, "codec_type": "audio", "codec_name": "aac", "sample_rate": "48000", "channels": 2}
  ],
  "format": {"filename": "clip.mp4", "format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "12.500000", "size": "1048576"}
}"#;

fn service_with(dir: &Path, ffmpeg_body: &str, ffprobe_body: &str) -> JobService {
    let toolchain = Toolchain::new(
        fake_tool(dir, "ffmpeg", ffmpeg_body),
        fake_tool(dir, "ffprobe", ffprobe_body),
    );
    JobService::new(toolchain, ScratchDir::new(dir.join("scratch")))
}

fn trim_job(dir: &Path, id: &str) -> JobDescriptor {
    JobDescriptor::new(
        JobId::new(id),
        JobSettings::Trim(TrimSettings {
            start: Some("00:00:01".to_string()),
            end: Some("00:00:03".to_string()),
        }),
        vec![dir.join("in.mp4")],
        dir.join(format!("{id}.mp4")),
    )
}

/// Collects events until every listed job reached a terminal event.
async fn collect_until_settled(
    rx: &mut broadcast::Receiver<EventBatch>,
    jobs: &[&str],
) -> Vec<LifecycleEvent> {
    let mut pending: HashSet<String> = jobs.iter().map(|id| id.to_string()).collect();
    let mut events = Vec::new();
    let collect = async {
        while !pending.is_empty() {
            let batch = rx.recv().await.expect("event stream open");
            for event in batch {
                if event.is_terminal() {
                    pending.remove(event.job_id.as_str());
                }
                events.push(event);
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(15), collect)
        .await
        .expect("jobs settle");
    events
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn distinct_jobs_run_concurrently() {
    let temp = tempfile::tempdir().expect("tempdir");
    let service = service_with(temp.path(), "sleep 1\nexit 0", "exit 1");
    service.scratch().ensure().await.expect("scratch");
    let mut rx = service.subscribe();

    service.submit(trim_job(temp.path(), "left"));
    service.submit(trim_job(temp.path(), "right"));
    let events = collect_until_settled(&mut rx, &["left", "right"]).await;

    let first_terminal = events
        .iter()
        .position(LifecycleEvent::is_terminal)
        .expect("terminal event");
    let started_before: usize = events[..first_terminal]
        .iter()
        .filter(|event| event.kind() == LifecycleKind::Started)
        .count();
    assert_eq!(started_before, 2, "second job waited for the first");

    for id in ["left", "right"] {
        let own: Vec<&LifecycleEvent> = events
            .iter()
            .filter(|event| event.job_id.as_str() == id)
            .collect();
        assert_eq!(own.first().map(|event| event.kind()), Some(LifecycleKind::Started));
        assert_eq!(own.last().map(|event| event.kind()), Some(LifecycleKind::Completed));
        assert!(own.windows(2).all(|pair| pair[0].seq < pair[1].seq));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ticket_delivers_terminal_event_after_subscriber_lags() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ffmpeg = fake_tool(
        temp.path(),
        "ffmpeg",
        "i=0\nwhile [ $i -lt 40 ]; do\n  echo \"noise $i\" >&2\n  i=$((i + 1))\ndone\nexit 0",
    );
    let ffprobe = fake_tool(temp.path(), "ffprobe", "exit 1");
    let service = JobService::with_event_buffer(
        Toolchain::new(ffmpeg, ffprobe),
        ScratchDir::new(temp.path().join("scratch")),
        1,
    );
    service.scratch().ensure().await.expect("scratch");
    let mut rx = service.subscribe();

    let ticket = service.submit_tracked(trim_job(temp.path(), "chatty"));
    let terminal = tokio::time::timeout(Duration::from_secs(15), ticket.outcome)
        .await
        .expect("job settles")
        .expect("outcome sent");
    assert_eq!(terminal.job_id, ticket.job_id);
    assert_eq!(terminal.kind(), LifecycleKind::Completed);

    // Give the forwarder time to push the tail of the stream.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(matches!(
        rx.recv().await,
        Err(broadcast::error::RecvError::Lagged(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_stops_a_running_job() {
    let temp = tempfile::tempdir().expect("tempdir");
    let service = service_with(temp.path(), "exec sleep 30", "exit 1");
    service.scratch().ensure().await.expect("scratch");
    let mut rx = service.subscribe();

    let job_id = service.submit(trim_job(temp.path(), "long"));
    let started = rx.recv().await.expect("batch");
    assert_eq!(started[0].kind(), LifecycleKind::Started);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(service.cancel(&job_id));

    let events = collect_until_settled(&mut rx, &["long"]).await;
    let terminal = events.last().expect("terminal");
    assert!(matches!(
        terminal.payload,
        EventPayload::Failed {
            error: FailureKind::Cancelled,
            ..
        }
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn probe_parses_tool_output() {
    let temp = tempfile::tempdir().expect("tempdir");
    let service = service_with(
        temp.path(),
        "exit 0",
        &format!("cat <<'JSON'\n{PROBE_JSON}\nJSON"),
    );

    let media = service
        .probe(&temp.path().join("clip.mp4"))
        .await
        .expect("probe");
    assert_eq!(media.duration_seconds(), Some(12.5));
    assert_eq!(
        media.first_video().and_then(|video| video.resolution()),
        Some((1280, 720))
    );
    assert_eq!(media.first_audio().and_then(|a| a.channels), Some(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn probe_failures_are_returned_not_emitted() {
    let temp = tempfile::tempdir().expect("tempdir");
    let failing = service_with(temp.path(), "exit 0", "echo 'No such file' >&2\nexit 1");
    let mut rx = failing.subscribe();
    let err = failing
        .probe(&temp.path().join("missing.mp4"))
        .await
        .expect_err("exit 1");
    match err {
        ProbeError::Exit { code, stderr, .. } => {
            assert_eq!(code, Some(1));
            assert_eq!(stderr, "No such file");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(
        rx.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));

    let garbled_dir = tempfile::tempdir().expect("tempdir");
    let garbled = service_with(garbled_dir.path(), "exit 0", "echo 'not json'");
    let err = garbled
        .probe(Path::new("clip.mp4"))
        .await
        .expect_err("bad json");
    assert!(matches!(err, ProbeError::Parse { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn preview_writes_a_scratch_thumbnail() {
    let temp = tempfile::tempdir().expect("tempdir");
    let service = service_with(temp.path(), TOUCH_LAST_ARG, "exit 1");
    service.scratch().ensure().await.expect("scratch");

    let thumb = service
        .preview(&temp.path().join("clip.mp4"))
        .await
        .expect("preview");
    assert!(thumb.starts_with(service.scratch().root()));
    assert!(thumb.exists());
    assert_eq!(thumb.extension().and_then(|ext| ext.to_str()), Some("jpg"));
}
