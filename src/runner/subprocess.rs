//! Subprocess runner - executes real OS processes

use crate::runner::{display_command, CommandOutput, CommandRunner, RunOptions, RunnerError};
use crate::runner::output::{MAX_CAPTURE_BYTES, TIMEOUT_EXIT_CODE};
use async_trait::async_trait;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

/// How long to keep draining pipes after a timed-out process was killed.
/// Grandchildren may still hold the write end open.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Runner that spawns real processes with `tokio::process`
#[derive(Debug, Clone)]
pub struct SubprocessRunner {
    /// Per-stream capture cap in bytes
    capture_limit: usize,
}

/// Bytes captured from one output stream
#[derive(Debug, Default)]
struct Captured {
    text: String,
    truncated: bool,
}

/// Capture buffer shared with the reading task, so a reader that never sees
/// EOF still leaves behind what it read
#[derive(Debug, Default)]
struct CaptureBuffer {
    bytes: Vec<u8>,
    truncated: bool,
}

type SharedCapture = Arc<Mutex<CaptureBuffer>>;

fn snapshot(buffer: &SharedCapture, cut_short: bool) -> Captured {
    let buffer = buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    Captured {
        text: String::from_utf8_lossy(&buffer.bytes).into_owned(),
        truncated: buffer.truncated || cut_short,
    }
}

impl SubprocessRunner {
    pub fn new() -> Self {
        Self {
            capture_limit: MAX_CAPTURE_BYTES,
        }
    }

    /// Override the per-stream capture cap
    pub fn with_capture_limit(mut self, limit: usize) -> Self {
        self.capture_limit = limit;
        self
    }
}

impl Default for SubprocessRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a stream to EOF into `buffer`, keeping at most `limit` bytes
async fn capture<R>(mut reader: R, limit: usize, buffer: SharedCapture) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];

    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            return Ok(());
        }
        let mut buffer = buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let room = limit.saturating_sub(buffer.bytes.len());
        if read > room {
            buffer.bytes.extend_from_slice(&chunk[..room]);
            buffer.truncated = true;
        } else {
            buffer.bytes.extend_from_slice(&chunk[..read]);
        }
    }
}

/// Wait for a capture task, optionally bounded by a grace period.
/// When the grace period runs out, whatever was read so far is returned.
async fn collect(
    mut handle: JoinHandle<std::io::Result<()>>,
    buffer: SharedCapture,
    grace: Option<Duration>,
    program: &str,
) -> Result<Captured, RunnerError> {
    let joined = match grace {
        Some(limit) => match timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                debug!("`{}` output still open after kill, keeping partial capture", program);
                return Ok(snapshot(&buffer, true));
            }
        },
        None => handle.await,
    };

    joined
        .map_err(|e| RunnerError::Internal(format!("Output capture task failed: {}", e)))?
        .map_err(|source| RunnerError::Io {
            program: program.to_string(),
            source,
        })?;
    Ok(snapshot(&buffer, false))
}

/// Kill the child's whole process group so grandchildren release the pipes
fn kill_process_group(child: &Child) {
    let Some(pid) = child.id() else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        debug!("Could not signal process group {}: {}", pid, e);
    }
}

#[async_trait]
impl CommandRunner for SubprocessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        options: &RunOptions,
    ) -> Result<CommandOutput, RunnerError> {
        let command_line = display_command(program, args);
        debug!("Running: {}", command_line);

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        if let Some(cwd) = &options.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &options.env {
            command.env(key, value);
        }

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            program: program.to_string(),
            source,
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::Internal("stdout was not piped".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::Internal("stderr was not piped".to_string()))?;
        let stdout_buffer = SharedCapture::default();
        let stderr_buffer = SharedCapture::default();
        let stdout_task = tokio::spawn(capture(stdout, self.capture_limit, stdout_buffer.clone()));
        let stderr_task = tokio::spawn(capture(stderr, self.capture_limit, stderr_buffer.clone()));

        let io_error = |source: std::io::Error| RunnerError::Io {
            program: program.to_string(),
            source,
        };

        let status = match options.timeout {
            Some(limit) => match timeout(limit, child.wait()).await {
                Ok(status) => Some(status.map_err(io_error)?),
                Err(_) => {
                    warn!(
                        "`{}` exceeded its {}s timeout, killing it",
                        command_line,
                        limit.as_secs()
                    );
                    kill_process_group(&child);
                    child.kill().await.map_err(io_error)?;
                    None
                }
            },
            None => Some(child.wait().await.map_err(io_error)?),
        };

        let grace = status.is_none().then_some(DRAIN_GRACE);
        let (stdout, stderr) = tokio::join!(
            collect(stdout_task, stdout_buffer, grace, program),
            collect(stderr_task, stderr_buffer, grace, program),
        );
        let (stdout, stderr) = (stdout?, stderr?);
        let duration_ms = started.elapsed().as_millis() as u64;

        let (exit_code, timed_out) = match status {
            Some(status) => (status.code().unwrap_or(-1), false),
            None => (TIMEOUT_EXIT_CODE, true),
        };

        debug!(
            "`{}` exited with code {} after {}ms",
            command_line, exit_code, duration_ms
        );

        Ok(CommandOutput {
            exit_code,
            stdout: stdout.text,
            stderr: stderr.text,
            duration_ms,
            timed_out,
            stdout_truncated: stdout.truncated,
            stderr_truncated: stderr.truncated,
        })
    }
}
