//! Running external tools (ImageMagick, lame) with a bounded wall-clock time.
//!
//! Arguments are passed as a fixed list, never through a shell. stderr is
//! captured so failures carry the tool's own diagnostic. The child is killed
//! if the timeout fires or the calling future is dropped.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;

use folio_core::Error;

/// Errors from running an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The executable could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn { program: String, source: std::io::Error },

    /// Waiting for the child or collecting its output failed.
    #[error("failed to collect output of {program}: {source}")]
    Output { program: String, source: std::io::Error },

    /// The tool ran but exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    Exit { program: String, status: ExitStatus, stderr: String },

    /// The tool did not finish in time and was killed.
    #[error("{program} timed out after {timeout_ms}ms")]
    Timeout { program: String, timeout_ms: u64 },
}

impl From<ToolError> for Error {
    fn from(err: ToolError) -> Self {
        Error::TransformFailed(err.to_string())
    }
}

/// Captured output of a successful run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// An external executable plus the time budget for each run.
#[derive(Debug, Clone)]
pub struct Tool {
    program: PathBuf,
    timeout: Duration,
}

impl Tool {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self { program: program.into(), timeout }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run the tool with `args` and wait for it, up to the timeout.
    ///
    /// A non-zero exit, a spawn failure and a timeout are all errors.
    pub async fn run(&self, args: &[OsString]) -> Result<ToolOutput, ToolError> {
        let program = self.program.display().to_string();
        let started = Instant::now();

        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolError::Spawn { program: program.clone(), source })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|source| ToolError::Output { program: program.clone(), source })?,
            Err(_) => {
                tracing::warn!(program = %program, timeout_ms = self.timeout.as_millis() as u64, "tool timed out");
                return Err(ToolError::Timeout { program, timeout_ms: self.timeout.as_millis() as u64 });
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(ToolError::Exit { program, status: output.status, stderr });
        }

        tracing::debug!(program = %program, elapsed_ms = started.elapsed().as_millis() as u64, "tool finished");
        Ok(ToolOutput { stdout: output.stdout, stderr })
    }
}
