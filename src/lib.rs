//! provision - idempotent single-host provisioning for a proxied, supervised web service

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod runner;
pub mod steps;

// Re-export commonly used types
pub use core::config::ProvisionConfig;
pub use core::{ExecutionStatus, FailureCategory, Pipeline, PipelineResult, Step, StepError, StepOutcome};
pub use execution::{ExecutionEngine, ExecutionEvent};
pub use runner::{CommandRunner, FakeRunner, SubprocessRunner};
pub use steps::standard_pipeline;
