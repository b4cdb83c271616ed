//! Process Invoker: one short-lived engine process per call.
//!
//! Stateless between calls. Spawns the engine binary with the generated
//! source, reads stdout/stderr concurrently, and bounds the whole
//! invocation with a wall-clock timeout. A timed-out process is killed
//! and reaped before this module returns.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use tokio::{io::AsyncReadExt, process::Command, time::timeout};
use tracing::{debug, warn};

use crate::{codegen::EngineProgram, error::ToolError};

/// Floor for draining pipes after the engine exits near its deadline.
const PIPE_GRACE: Duration = Duration::from_millis(250);

/// How the engine binary accepts a program on its command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// `wolframscript -c <code>`
    Script,
    /// `WolframKernel -noprompt -run <code>`
    Kernel,
}

/// Raw result of a single engine invocation. Transient, never persisted.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// Exit code; `None` when the process was killed on timeout.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    pub timed_out: bool,
}

#[derive(Debug, Clone)]
pub struct EngineInvoker {
    executable: PathBuf,
    mode: EngineMode,
}

impl EngineInvoker {
    pub fn new(executable: impl Into<PathBuf>, mode: EngineMode) -> Self {
        Self { executable: executable.into(), mode }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub async fn invoke(
        &self,
        program: &EngineProgram,
        limit: Duration,
    ) -> Result<ProcessOutcome, ToolError> {
        let mut cmd = Command::new(&self.executable);
        match self.mode {
            EngineMode::Script => cmd.arg("-c").arg(&program.source),
            EngineMode::Kernel => cmd.arg("-noprompt").arg("-run").arg(&program.source),
        };
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => ToolError::ExecutableNotFound {
                path: self.executable.display().to_string(),
            },
            _ => ToolError::Internal(format!(
                "failed to spawn engine {}: {err}",
                self.executable.display()
            )),
        })?;
        debug!(
            tool = program.tool.name(),
            source = program.diagnostic_source(),
            source_truncated = program.truncated,
            "spawned engine process"
        );

        let stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| ToolError::Internal("engine stdout was not captured".into()))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| ToolError::Internal("engine stderr was not captured".into()))?;

        // Drain both pipes off-task so a chatty engine can never fill a
        // pipe buffer and deadlock against wait(). The buffers are shared
        // so partial output survives a timeout even if something the
        // engine spawned still holds the pipe open.
        let stdout_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let mut stdout_task = tokio::spawn(drain(stdout_pipe, stdout_buf.clone()));
        let mut stderr_task = tokio::spawn(drain(stderr_pipe, stderr_buf.clone()));

        let (status, timed_out) = match timeout(limit, child.wait()).await {
            Ok(Ok(status)) => {
                // Bounded wait: a stray descendant of the engine could
                // hold the pipes open after the engine itself exited.
                let remaining = limit.saturating_sub(started.elapsed()).max(PIPE_GRACE);
                if timeout(remaining, async {
                    let _ = (&mut stdout_task).await;
                    let _ = (&mut stderr_task).await;
                })
                .await
                .is_err()
                {
                    warn!(tool = program.tool.name(), "engine pipes still open after exit");
                    stdout_task.abort();
                    stderr_task.abort();
                }
                (status.code(), false)
            }
            Ok(Err(err)) => {
                return Err(ToolError::Internal(format!("failed to wait on engine: {err}")))
            }
            Err(_) => {
                warn!(
                    tool = program.tool.name(),
                    limit_secs = limit.as_secs(),
                    "engine invocation timed out, killing process"
                );
                // kill() waits for the process, so nothing outlives this
                // call. Readers are aborted rather than awaited: orphans
                // of the engine may keep the pipes open indefinitely.
                if let Err(err) = child.kill().await {
                    warn!(%err, "failed to kill timed-out engine process");
                }
                stdout_task.abort();
                stderr_task.abort();
                (None, true)
            }
        };

        let stdout = take_text(&stdout_buf);
        let stderr = take_text(&stderr_buf);
        let outcome = ProcessOutcome { status, stdout, stderr, elapsed: started.elapsed(), timed_out };
        debug!(
            tool = program.tool.name(),
            status = ?outcome.status,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            timed_out = outcome.timed_out,
            "engine process finished"
        );
        Ok(outcome)
    }
}

async fn drain(mut pipe: impl AsyncReadExt + Unpin, buf: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 8192];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => match buf.lock() {
                Ok(mut guard) => guard.extend_from_slice(&chunk[..n]),
                Err(_) => break,
            },
        }
    }
}

fn take_text(buf: &Arc<Mutex<Vec<u8>>>) -> String {
    match buf.lock() {
        Ok(mut guard) => String::from_utf8_lossy(&std::mem::take(&mut *guard)).into_owned(),
        Err(_) => String::new(),
    }
}
