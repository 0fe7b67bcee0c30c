//! Shared host access for steps

use crate::core::config::ProvisionConfig;
use crate::core::StepError;
use crate::runner::{display_command, CommandOutput, CommandRunner, RunOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// What every step needs to reach the host: the runner and the configuration
#[derive(Clone)]
pub struct HostContext {
    runner: Arc<dyn CommandRunner>,
    pub config: Arc<ProvisionConfig>,
}

impl HostContext {
    pub fn new(config: Arc<ProvisionConfig>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner, config }
    }

    fn query_options(&self) -> RunOptions {
        RunOptions::query(self.config.command_timeout())
    }

    fn mutation_options(&self) -> RunOptions {
        RunOptions::mutation(self.config.command_timeout())
    }

    /// Run a read-only command and return its output whatever the exit code
    pub async fn query(&self, program: &str, args: &[String]) -> Result<CommandOutput, StepError> {
        self.query_with(program, args, self.query_options()).await
    }

    pub async fn query_with(
        &self,
        program: &str,
        args: &[String],
        options: RunOptions,
    ) -> Result<CommandOutput, StepError> {
        debug!("query: {}", display_command(program, args));
        let output = self.runner.run(program, args, &options).await?;
        if output.timed_out {
            return Err(StepError::from_output(display_command(program, args), &output));
        }
        Ok(output)
    }

    /// Whether a read-only command succeeds
    pub async fn probe(&self, program: &str, args: &[String]) -> Result<bool, StepError> {
        Ok(self.query(program, args).await?.success())
    }

    /// Run a read-only command that must succeed
    pub async fn require(&self, program: &str, args: &[String]) -> Result<CommandOutput, StepError> {
        let output = self.query(program, args).await?;
        if !output.success() {
            return Err(StepError::from_output(display_command(program, args), &output));
        }
        Ok(output)
    }

    /// Run a state-changing command that must succeed
    pub async fn mutate(&self, program: &str, args: &[String]) -> Result<CommandOutput, StepError> {
        self.mutate_with(program, args, self.mutation_options()).await
    }

    /// Like [`HostContext::mutate`] with extra options; the call is always flagged as mutating
    pub async fn mutate_with(
        &self,
        program: &str,
        args: &[String],
        mut options: RunOptions,
    ) -> Result<CommandOutput, StepError> {
        options.mutating = true;
        if options.timeout.is_none() {
            options.timeout = Some(self.config.command_timeout());
        }
        let command = display_command(program, args);
        debug!("mutate: {}", command);
        let output = self.runner.run(program, args, &options).await?;
        if !output.success() {
            return Err(StepError::from_output(command, &output));
        }
        Ok(output)
    }

    /// Default options for a mutation, for callers that add cwd or env
    pub fn mutation(&self) -> RunOptions {
        self.mutation_options()
    }
}

/// Read a file, treating a missing file as `None`
pub async fn read_optional(path: &Path) -> Result<Option<String>, StepError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StepError::io(path, e)),
    }
}

/// Write `content` to `path`, creating parent directories. Returns whether the file changed.
pub async fn write_if_changed(path: &Path, content: &str) -> Result<bool, StepError> {
    if read_optional(path).await?.as_deref() == Some(content) {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StepError::io(parent, e))?;
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|e| StepError::io(path, e))?;
    Ok(true)
}
