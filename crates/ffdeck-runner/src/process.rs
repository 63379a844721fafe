use std::{
    io,
    path::{Path, PathBuf},
    process::Stdio,
};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, warn};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

const READ_CHUNK: usize = 4096;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed waiting on {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} was cancelled")]
    Cancelled { program: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineSource {
    Stdout,
    Stderr,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputLine {
    pub source: LineSource,
    pub text: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs one external tool per call and streams its diagnostic output.
#[derive(Clone, Debug)]
pub struct ProcessRunner {
    program: PathBuf,
}

impl ProcessRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub async fn run(
        &self,
        args: &[String],
        lines: mpsc::Sender<OutputLine>,
    ) -> Result<ProcessExit, RunnerError> {
        self.execute(args, lines, None).await
    }

    /// Like [`ProcessRunner::run`], but kills the child as soon as `cancel`
    /// flips to `true`.
    pub async fn run_cancellable(
        &self,
        args: &[String],
        lines: mpsc::Sender<OutputLine>,
        cancel: watch::Receiver<bool>,
    ) -> Result<ProcessExit, RunnerError> {
        self.execute(args, lines, Some(cancel)).await
    }

    async fn execute(
        &self,
        args: &[String],
        lines: mpsc::Sender<OutputLine>,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<ProcessExit, RunnerError> {
        let program = self.program.display().to_string();
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        command.creation_flags(CREATE_NO_WINDOW);

        debug!(event = "process_spawn", program = %program, args = ?args);
        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            program: program.clone(),
            source,
        })?;

        let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(
                stdout,
                LineSource::Stdout,
                lines.clone(),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(
                stderr,
                LineSource::Stderr,
                lines.clone(),
            )));
        }
        drop(lines);

        let outcome = match cancel {
            Some(mut cancel) => {
                tokio::select! {
                    status = child.wait() => Ok(status),
                    _ = cancel_requested(&mut cancel) => {
                        if let Err(err) = child.kill().await {
                            warn!(event = "process_kill_error", program = %program, error = %err);
                        }
                        Err(RunnerError::Cancelled { program: program.clone() })
                    }
                }
            }
            None => Ok(child.wait().await),
        };

        // Pipes close once the child is gone; drain what is left so no line
        // is lost before the caller sees the settlement.
        for reader in readers {
            let _ = reader.await;
        }

        let status = outcome?.map_err(|source| RunnerError::Wait {
            program: program.clone(),
            source,
        })?;
        let exit = ProcessExit {
            code: status.code(),
        };
        debug!(event = "process_exit", program = %program, code = ?exit.code);
        Ok(exit)
    }
}

async fn cancel_requested(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|flag| *flag).await.is_err() {
        // Sender gone without ever cancelling.
        std::future::pending::<()>().await;
    }
}

/// Splits a byte stream on `\n` and `\r` so carriage-return progress
/// updates surface one by one. Blank segments are skipped.
async fn forward_lines<R>(mut reader: R, source: LineSource, tx: mpsc::Sender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK];
    let mut pending: Vec<u8> = Vec::new();
    let mut open = true;
    loop {
        let read = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(count) => count,
            Err(err) => {
                warn!(event = "process_read_error", source = ?source, error = %err);
                break;
            }
        };
        for byte in &chunk[..read] {
            if *byte == b'\n' || *byte == b'\r' {
                open = emit(&mut pending, source, &tx, open).await;
            } else {
                pending.push(*byte);
            }
        }
    }
    emit(&mut pending, source, &tx, open).await;
}

async fn emit(
    pending: &mut Vec<u8>,
    source: LineSource,
    tx: &mpsc::Sender<OutputLine>,
    open: bool,
) -> bool {
    if pending.is_empty() {
        return open;
    }
    let text = String::from_utf8_lossy(pending).into_owned();
    pending.clear();
    if !open || text.trim().is_empty() {
        return open;
    }
    // Keep draining the pipe even when nobody listens any more.
    tx.send(OutputLine { source, text }).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn splits_carriage_returns_and_decodes_lossily() {
        let input: &[u8] = b"frame=  1\rframe=  2\r\nInput #0\n\xff\xfeoops\n\n";
        let (tx, mut rx) = mpsc::channel(16);
        forward_lines(input, LineSource::Stderr, tx).await;

        let mut seen = Vec::new();
        while let Some(line) = rx.recv().await {
            assert_eq!(line.source, LineSource::Stderr);
            seen.push(line.text);
        }
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], "frame=  1");
        assert_eq!(seen[1], "frame=  2");
        assert_eq!(seen[2], "Input #0");
        assert!(seen[3].ends_with("oops"));
        assert!(seen[3].contains('\u{FFFD}'));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn trailing_segment_without_newline_is_forwarded() {
        let (tx, mut rx) = mpsc::channel(4);
        forward_lines(&b"time=00:00:01.00"[..], LineSource::Stdout, tx).await;
        let line = rx.recv().await.expect("line");
        assert_eq!(line.text, "time=00:00:01.00");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn closed_receiver_does_not_stall_reader() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        forward_lines(&b"a\nb\nc\n"[..], LineSource::Stderr, tx).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_program_is_a_spawn_error() {
        let runner = ProcessRunner::new("/definitely/not/here/ffmpeg");
        let (tx, _rx) = mpsc::channel(4);
        let err = runner.run(&[], tx).await.expect_err("spawn should fail");
        assert!(matches!(err, RunnerError::Spawn { .. }));
        assert!(err.to_string().contains("/definitely/not/here/ffmpeg"));
    }
}
