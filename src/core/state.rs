//! Execution state models

use crate::core::step::FailureCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Exit code for a run that failed without a step to blame
pub const UNATTRIBUTED_FAILURE_EXIT_CODE: i32 = 16;

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Pipeline has not started
    NotStarted,
    /// Pipeline is currently running
    Running,
    /// Every step was applied or skipped
    Succeeded,
    /// A step failed and the pipeline stopped
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::NotStarted => "NotStarted",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Succeeded => "Succeeded",
            ExecutionStatus::Failed => "Failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NotStarted" => Some(ExecutionStatus::NotStarted),
            "Running" => Some(ExecutionStatus::Running),
            "Succeeded" => Some(ExecutionStatus::Succeeded),
            "Failed" => Some(ExecutionStatus::Failed),
            _ => None,
        }
    }
}

/// Terminal outcome of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    /// `check` reported the effect already present
    Skipped,
    /// `apply` ran and `verify` confirmed it
    Applied,
    /// `apply` or `verify` failed
    Failed,
}

/// Which part of the step contract was running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Check,
    Apply,
    Verify,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Check => write!(f, "check"),
            Phase::Apply => write!(f, "apply"),
            Phase::Verify => write!(f, "verify"),
        }
    }
}

/// Kind of fatal step failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// An external command reported failure during `apply`
    ApplyFailed,
    /// The postcondition was not reached
    VerifyFailed,
    /// A command or the overall pipeline deadline ran out
    Timeout { phase: Phase },
}

/// A recorded fatal failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub kind: FailureKind,

    /// Human-readable description
    pub message: String,

    /// Exit code of the failing command, if any
    pub exit_code: Option<i32>,

    /// Captured stderr (or stdout) of the failing command
    pub diagnostic: Option<String>,
}

impl StepFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            exit_code: None,
            diagnostic: None,
        }
    }

    /// The distinguished "postcondition not met" failure
    pub fn postcondition_not_met() -> Self {
        Self::new(FailureKind::VerifyFailed, "postcondition not met")
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, FailureKind::Timeout { .. })
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::ApplyFailed => write!(f, "apply failed: {}", self.message),
            FailureKind::VerifyFailed => write!(f, "verify failed: {}", self.message),
            FailureKind::Timeout { phase } => write!(f, "timed out during {}: {}", phase, self.message),
        }
    }
}

/// Record of one finished step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_name: String,
    pub category: FailureCategory,
    pub outcome: StepOutcome,
    pub duration_ms: u64,

    /// Set when `outcome` is `Failed`
    pub error: Option<StepFailure>,

    /// Set when `check` could not determine the state
    pub check_error: Option<String>,

    /// Non-fatal problem, e.g. a tolerated verify failure
    pub warning: Option<String>,
}

impl StepRecord {
    pub fn skipped(&self) -> bool {
        self.outcome == StepOutcome::Skipped
    }
}

/// Ordered record of a pipeline run. Immutable once the run has finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    execution_id: Uuid,
    pipeline_name: String,
    status: ExecutionStatus,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    total_steps: usize,
    /// Names of every step in the pipeline, in run order
    #[serde(default)]
    step_names: Vec<String>,
    records: Vec<StepRecord>,
    failure: Option<String>,
}

impl PipelineResult {
    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn step_names(&self) -> &[String] {
        &self.step_names
    }

    /// Steps that never started because the run stopped early
    pub fn not_run(&self) -> Vec<&str> {
        self.step_names
            .iter()
            .filter(|name| self.record(name).is_none())
            .map(String::as_str)
            .collect()
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn record(&self, step_name: &str) -> Option<&StepRecord> {
        self.records.iter().find(|r| r.step_name == step_name)
    }

    /// Pipeline-level failure not attached to a step record
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }

    pub fn count(&self, outcome: StepOutcome) -> usize {
        self.records.iter().filter(|r| r.outcome == outcome).count()
    }

    /// The record of the step that failed, if any
    pub fn failed_step(&self) -> Option<&StepRecord> {
        self.records.iter().find(|r| r.outcome == StepOutcome::Failed)
    }

    /// Process exit code: 0 on success, else the failing step's category code
    pub fn exit_code(&self) -> i32 {
        match self.status {
            ExecutionStatus::Succeeded => 0,
            _ => self
                .failed_step()
                .map(|r| r.category.exit_code())
                .unwrap_or(UNATTRIBUTED_FAILURE_EXIT_CODE),
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.completed_at
            .and_then(|end| end.signed_duration_since(self.started_at).to_std().ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Mutable run log owned by the sequencer while a pipeline runs
#[derive(Debug)]
pub(crate) struct RunLog {
    result: PipelineResult,
}

impl RunLog {
    /// Created empty at pipeline start
    pub(crate) fn start(pipeline_name: &str, step_names: Vec<String>) -> Self {
        Self {
            result: PipelineResult {
                execution_id: Uuid::new_v4(),
                pipeline_name: pipeline_name.to_string(),
                status: ExecutionStatus::Running,
                started_at: Utc::now(),
                completed_at: None,
                total_steps: step_names.len(),
                step_names,
                records: Vec::new(),
                failure: None,
            },
        }
    }

    pub(crate) fn execution_id(&self) -> Uuid {
        self.result.execution_id
    }

    pub(crate) fn push(&mut self, record: StepRecord) {
        self.result.records.push(record);
    }

    pub(crate) fn set_failure(&mut self, failure: impl Into<String>) {
        self.result.failure = Some(failure.into());
    }

    /// Seal the log; the returned result has no mutators
    pub(crate) fn finish(mut self) -> PipelineResult {
        let failed = self.result.failure.is_some()
            || self
                .result
                .records
                .iter()
                .any(|r| r.outcome == StepOutcome::Failed);
        self.result.status = if failed {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Succeeded
        };
        self.result.completed_at = Some(Utc::now());
        self.result
    }
}
