//! Main execution engine - runs the pipeline's steps in order

use crate::{
    core::{ExecutionStatus, FailureCategory, Pipeline, PipelineResult, RunLog, StepFailure, StepOutcome},
    execution::StepExecutor,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
        total_steps: usize,
    },
    StepStarted {
        index: usize,
        total: usize,
        step: String,
    },
    StepCheckIndeterminate {
        step: String,
        error: String,
    },
    StepSkipped {
        step: String,
        duration_ms: u64,
    },
    StepApplied {
        step: String,
        duration_ms: u64,
    },
    StepWarning {
        step: String,
        warning: String,
    },
    StepFailed {
        step: String,
        category: FailureCategory,
        failure: StepFailure,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
        exit_code: i32,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Main pipeline execution engine
///
/// Steps run strictly in order. The first failed step stops the run; later
/// steps are never checked.
#[derive(Default)]
pub struct ExecutionEngine {
    event_handlers: Vec<EventHandler>,
    timeout: Option<Duration>,
}

impl ExecutionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the whole run; the step running at the deadline fails with a timeout
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Execute the entire pipeline
    pub async fn execute(&self, pipeline: &Pipeline) -> PipelineResult {
        let total = pipeline.len();
        let names = pipeline.step_names().into_iter().map(str::to_string).collect();
        let mut log = RunLog::start(&pipeline.name, names);
        let execution_id = log.execution_id();
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let executor = StepExecutor::new().with_deadline(deadline);

        info!("Starting pipeline execution: {} ({})", pipeline.name, execution_id);
        self.emit_event(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: pipeline.name.clone(),
            total_steps: total,
        });

        for (index, step) in pipeline.steps().iter().enumerate() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                error!("Pipeline deadline exceeded before {}", step.name());
                log.set_failure(format!("pipeline deadline exceeded before {}", step.name()));
                break;
            }

            self.emit_event(ExecutionEvent::StepStarted {
                index: index + 1,
                total,
                step: step.name().to_string(),
            });

            let record = executor.execute(step.as_ref()).await;

            if let Some(check_error) = &record.check_error {
                self.emit_event(ExecutionEvent::StepCheckIndeterminate {
                    step: record.step_name.clone(),
                    error: check_error.clone(),
                });
            }

            let stop = match record.outcome {
                StepOutcome::Skipped => {
                    self.emit_event(ExecutionEvent::StepSkipped {
                        step: record.step_name.clone(),
                        duration_ms: record.duration_ms,
                    });
                    false
                }
                StepOutcome::Applied => {
                    if let Some(warning) = &record.warning {
                        warn!("Step {} applied with warning: {}", record.step_name, warning);
                        self.emit_event(ExecutionEvent::StepWarning {
                            step: record.step_name.clone(),
                            warning: warning.clone(),
                        });
                    }
                    self.emit_event(ExecutionEvent::StepApplied {
                        step: record.step_name.clone(),
                        duration_ms: record.duration_ms,
                    });
                    false
                }
                StepOutcome::Failed => {
                    if let Some(failure) = &record.error {
                        self.emit_event(ExecutionEvent::StepFailed {
                            step: record.step_name.clone(),
                            category: record.category,
                            failure: failure.clone(),
                        });
                    }
                    true
                }
            };

            log.push(record);
            if stop {
                break;
            }
        }

        let result = log.finish();
        info!(
            "Pipeline execution finished: {} - {:?}",
            result.pipeline_name(),
            result.status()
        );
        self.emit_event(ExecutionEvent::PipelineCompleted {
            execution_id,
            status: result.status(),
            exit_code: result.exit_code(),
        });
        result
    }
}
