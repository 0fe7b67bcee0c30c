//! Command output and runner error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exit code reported when a command is killed for exceeding its timeout
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Maximum bytes kept per output stream; the rest is drained and dropped
pub const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// Error types for command runner operations
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while running `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result of running an external command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Process exit code (`TIMEOUT_EXIT_CODE` on timeout, -1 when killed by a signal)
    pub exit_code: i32,

    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,

    /// Wall-clock duration of the process
    pub duration_ms: u64,

    /// Whether the process was killed for exceeding its timeout
    pub timed_out: bool,

    /// Whether stdout exceeded `MAX_CAPTURE_BYTES`
    pub stdout_truncated: bool,

    /// Whether stderr exceeded `MAX_CAPTURE_BYTES`
    pub stderr_truncated: bool,
}

impl CommandOutput {
    /// A successful output carrying `stdout`
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// A failed output with the given exit code and stderr
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    /// A timed-out output
    pub fn timeout() -> Self {
        Self {
            exit_code: TIMEOUT_EXIT_CODE,
            timed_out: true,
            ..Self::default()
        }
    }

    /// Whether the command exited zero within its timeout
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// Trimmed stdout
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Best diagnostic text: stderr, falling back to stdout
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        let mut text = if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        };
        if self.stderr_truncated || (stderr.is_empty() && self.stdout_truncated) {
            text.push_str("\n[output truncated]");
        }
        text
    }
}
