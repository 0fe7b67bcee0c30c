//! Step contract

use crate::runner::{CommandOutput, RunnerError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Failure class of a step, mapped to a distinct process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Packages,
    Identity,
    Deploy,
    Service,
    Proxy,
    Certificate,
}

impl FailureCategory {
    /// Process exit code reported when a step of this category fails
    pub fn exit_code(self) -> i32 {
        match self {
            FailureCategory::Packages => 10,
            FailureCategory::Identity => 11,
            FailureCategory::Deploy => 12,
            FailureCategory::Service => 13,
            FailureCategory::Proxy => 14,
            FailureCategory::Certificate => 15,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureCategory::Packages => "packages",
            FailureCategory::Identity => "identity",
            FailureCategory::Deploy => "deploy",
            FailureCategory::Service => "service",
            FailureCategory::Proxy => "proxy",
            FailureCategory::Certificate => "certificate",
        }
    }
}

/// What to do when a step's postcondition is not met
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyPolicy {
    /// Fail the step and stop the pipeline
    #[default]
    Abort,
    /// Record a warning and continue
    Warn,
}

/// Error types for step operations
#[derive(Debug, Error)]
pub enum StepError {
    #[error("`{command}` exited with code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("`{command}` timed out: {stderr}")]
    CommandTimedOut { command: String, stderr: String },

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

impl StepError {
    /// Build the error for a command that did not succeed
    pub fn from_output(command: impl Into<String>, output: &CommandOutput) -> Self {
        let command = command.into();
        if output.timed_out {
            StepError::CommandTimedOut {
                command,
                stderr: output.diagnostic(),
            }
        } else {
            StepError::CommandFailed {
                command,
                exit_code: output.exit_code,
                stderr: output.diagnostic(),
            }
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StepError::Io {
            path: path.into(),
            source,
        }
    }

    /// Exit code of the failing command, if there was one
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            StepError::CommandFailed { exit_code, .. } => Some(*exit_code),
            StepError::CommandTimedOut { .. } => Some(crate::runner::TIMEOUT_EXIT_CODE),
            _ => None,
        }
    }

    /// Captured diagnostic output of the failing command, if there was one
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            StepError::CommandFailed { stderr, .. } | StepError::CommandTimedOut { stderr, .. } => {
                Some(stderr)
            }
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StepError::CommandTimedOut { .. })
    }
}

/// A named unit of provisioning work
///
/// `check` answers whether the step's effect is already fully present, `apply`
/// produces the effect and is only called when `check` did not return
/// `Ok(true)`, and `verify` confirms the effect took hold. All state lives in
/// the host; implementations re-query it on every call.
#[async_trait]
pub trait Step: Send + Sync {
    /// Stable step name shown in progress output
    fn name(&self) -> &str;

    /// Failure class used for the process exit code
    fn category(&self) -> FailureCategory;

    /// Whether the effect is already present. `Err` means indeterminate.
    async fn check(&self) -> Result<bool, StepError>;

    /// Produce the effect
    async fn apply(&self) -> Result<(), StepError>;

    /// Whether the postcondition holds after `apply`
    async fn verify(&self) -> Result<bool, StepError>;

    /// How a failed `verify` is treated
    fn verify_policy(&self) -> VerifyPolicy {
        VerifyPolicy::Abort
    }
}
