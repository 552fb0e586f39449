//! Narrow process-invocation seam for the container runtime and interpreter.
//!
//! The orchestrator only needs "argument list in, captured output and exit
//! code out". [`TokioProcessRunner`] is the real implementation; tests swap
//! in scripted runners.

use crate::cancel::CancellationToken;
use crate::{AxonError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::debug;

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    /// Exit code; `None` when terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr, for diagnostics.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (true, _) => self.stderr.clone(),
            (_, true) => self.stdout.clone(),
            _ => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Resolve `program` on the host, if present.
    fn locate(&self, program: &str) -> Option<PathBuf>;

    /// Run to completion and capture output. A non-zero exit is not an error;
    /// failing to spawn is. Cancellation kills and reaps the child.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput>;
}

pub type DynProcessRunner = Arc<dyn ProcessRunner>;

/// Runs real processes with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }

    async fn run(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput> {
        cancel.check()?;
        debug!("Running {} {}", program, args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AxonError::ConversionFailed {
                message: format!("Failed to start {}: {}", program, e),
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let finished = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = collect(&mut child, stdout, stderr) => Some(result),
        };

        let Some(result) = finished else {
            // kill() also waits, so the child is reaped before returning.
            let _ = child.kill().await;
            return Err(AxonError::Cancelled);
        };
        let (status, stdout, stderr) = result.map_err(|e| AxonError::ConversionFailed {
            message: format!("{} process error: {}", program, e),
        })?;

        Ok(ProcessOutput {
            code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

async fn collect(
    child: &mut Child,
    stdout: Option<impl AsyncRead + Unpin>,
    stderr: Option<impl AsyncRead + Unpin>,
) -> std::io::Result<(ExitStatus, Vec<u8>, Vec<u8>)> {
    let (status, out, err) = tokio::try_join!(child.wait(), drain(stdout), drain(stderr))?;
    Ok((status, out, err))
}

async fn drain(reader: Option<impl AsyncRead + Unpin>) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}
