//! Per-invocation options for the command runner

use std::path::PathBuf;
use std::time::Duration;

/// Options for a single command invocation
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Kill the process if it runs longer than this
    pub timeout: Option<Duration>,

    /// Working directory for the process
    pub cwd: Option<PathBuf>,

    /// Extra environment variables
    pub env: Vec<(String, String)>,

    /// Whether the command changes host state (queries leave this false)
    pub mutating: bool,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a read-only query bounded by `timeout`
    pub fn query(timeout: Duration) -> Self {
        Self::new().with_timeout(timeout)
    }

    /// Options for a state-changing command bounded by `timeout`
    pub fn mutation(timeout: Duration) -> Self {
        Self {
            mutating: true,
            ..Self::query(timeout)
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}
