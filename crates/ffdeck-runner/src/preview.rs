use crate::{
    process::{OutputLine, ProcessRunner, RunnerError},
    scratch::ScratchDir,
};
use ffdeck_core::{
    command::{preview_args, PREVIEW_OFFSET},
    job::JobId,
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error("thumbnail for {} failed with exit code {code:?}: {detail}", input.display())]
    Exit {
        input: PathBuf,
        code: Option<i32>,
        detail: String,
    },
    #[error("no thumbnail produced for {}", input.display())]
    Missing { input: PathBuf },
}

/// Grabs one frame near the start of `input` into a scratch jpg and returns
/// its path. The caller owns the file afterwards.
pub async fn generate_preview(
    ffmpeg: &ProcessRunner,
    scratch: &ScratchDir,
    id: &JobId,
    input: &Path,
) -> Result<PathBuf, PreviewError> {
    let output = scratch.preview_path(id);
    let args = preview_args(input, &output, PREVIEW_OFFSET);
    let (tx, mut rx) = mpsc::channel::<OutputLine>(64);
    let collect = async {
        let mut last = String::new();
        while let Some(line) = rx.recv().await {
            last = line.text;
        }
        last
    };
    let (exit, last_line) = tokio::join!(ffmpeg.run(&args, tx), collect);
    let exit = exit?;
    if !exit.success() {
        return Err(PreviewError::Exit {
            input: input.to_path_buf(),
            code: exit.code,
            detail: last_line,
        });
    }
    if tokio::fs::metadata(&output).await.is_err() {
        return Err(PreviewError::Missing {
            input: input.to_path_buf(),
        });
    }
    debug!(event = "preview_ready", input = %input.display(), output = %output.display());
    Ok(output)
}
