//! Scriptable command runner (for testing or rehearsing a pipeline offline)

use crate::runner::{display_command, CommandOutput, CommandRunner, RunOptions, RunnerError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A command invocation recorded by [`FakeRunner`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
    pub mutating: bool,
}

impl RecordedCall {
    /// The full command line
    pub fn command_line(&self) -> String {
        display_command(&self.program, &self.args)
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Output(CommandOutput),
    SpawnError(String),
}

#[derive(Debug)]
struct Rule {
    prefix: String,
    replies: VecDeque<Reply>,
}

/// Runner that answers from scripted rules and records every call
///
/// Rules match on a prefix of the rendered command line; the most recently
/// added matching rule wins. A rule with several replies hands them out in
/// order and keeps repeating the last one.
#[derive(Debug)]
pub struct FakeRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<RecordedCall>>,
    fallback: CommandOutput,
}

impl FakeRunner {
    /// A runner where unmatched commands succeed with empty output
    pub fn new() -> Self {
        Self::with_fallback(CommandOutput::ok(""))
    }

    /// A runner where unmatched commands return `fallback`
    pub fn with_fallback(fallback: CommandOutput) -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            fallback,
        }
    }

    /// Answer commands starting with `prefix` with `output`
    pub fn on(self, prefix: &str, output: CommandOutput) -> Self {
        self.on_sequence(prefix, vec![output])
    }

    /// Answer commands starting with `prefix` with each output in turn
    pub fn on_sequence(self, prefix: &str, outputs: Vec<CommandOutput>) -> Self {
        self.push_rule(prefix, outputs.into_iter().map(Reply::Output).collect());
        self
    }

    /// Fail to spawn commands starting with `prefix`
    pub fn on_spawn_error(self, prefix: &str, message: &str) -> Self {
        self.push_rule(prefix, VecDeque::from([Reply::SpawnError(message.to_string())]));
        self
    }

    fn push_rule(&self, prefix: &str, replies: VecDeque<Reply>) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                prefix: prefix.to_string(),
                replies,
            });
        }
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Command lines of all calls made so far
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(RecordedCall::command_line).collect()
    }

    /// Calls flagged as state-changing
    pub fn mutating_calls(&self) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.mutating).collect()
    }

    /// Number of calls whose command line starts with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.command_lines()
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }

    fn reply_for(&self, command_line: &str) -> Reply {
        let Ok(mut rules) = self.rules.lock() else {
            return Reply::Output(self.fallback.clone());
        };
        let rule = rules
            .iter_mut()
            .rev()
            .find(|rule| command_line.starts_with(&rule.prefix));

        match rule {
            Some(rule) if rule.replies.len() > 1 => rule
                .replies
                .pop_front()
                .unwrap_or_else(|| Reply::Output(self.fallback.clone())),
            Some(rule) => rule
                .replies
                .front()
                .cloned()
                .unwrap_or_else(|| Reply::Output(self.fallback.clone())),
            None => Reply::Output(self.fallback.clone()),
        }
    }
}

impl Default for FakeRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        options: &RunOptions,
    ) -> Result<CommandOutput, RunnerError> {
        let call = RecordedCall {
            program: program.to_string(),
            args: args.to_vec(),
            mutating: options.mutating,
        };
        let command_line = call.command_line();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }

        match self.reply_for(&command_line) {
            Reply::Output(output) => Ok(output),
            Reply::SpawnError(message) => Err(RunnerError::Spawn {
                program: program.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, message),
            }),
        }
    }
}
