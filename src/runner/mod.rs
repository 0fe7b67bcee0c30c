//! Command runner for external OS operations

pub mod fake;
pub mod options;
pub mod output;
pub mod subprocess;

use async_trait::async_trait;
pub use fake::{FakeRunner, RecordedCall};
pub use options::RunOptions;
pub use output::{CommandOutput, RunnerError, MAX_CAPTURE_BYTES, TIMEOUT_EXIT_CODE};
pub use subprocess::SubprocessRunner;

/// Trait for running external commands - allows for fake implementations in tests
///
/// A nonzero exit status is a normal result: callers inspect
/// [`CommandOutput::exit_code`]. `Err` is reserved for failures to spawn the
/// process or to read its output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and wait for it to finish
    async fn run(
        &self,
        program: &str,
        args: &[String],
        options: &RunOptions,
    ) -> Result<CommandOutput, RunnerError>;
}

/// Render a command line for logs and error messages
pub fn display_command(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Build an owned argument vector from string slices
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}
