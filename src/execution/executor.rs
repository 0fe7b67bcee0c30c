//! Step executor - runs one step through check, apply and verify

use crate::core::{
    FailureKind, Phase, Step, StepError, StepFailure, StepOutcome, StepRecord, VerifyPolicy,
};
use std::time::Instant as StdInstant;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

/// Result of the phases that ran before the step settled
enum PhaseResult {
    Skipped,
    Applied { warning: Option<String> },
    Failed(StepFailure),
}

/// Executes a single step
#[derive(Debug, Clone, Copy, Default)]
pub struct StepExecutor {
    deadline: Option<Instant>,
}

impl StepExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort whatever phase is running once `deadline` passes
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Execute a step and return its record
    pub async fn execute(&self, step: &dyn Step) -> StepRecord {
        info!("Executing step: {}", step.name());
        let started = StdInstant::now();
        let mut phase = Phase::Check;
        let mut check_error = None;

        let result = match self.deadline {
            Some(deadline) => {
                let run = timeout_at(deadline, run_phases(step, &mut phase, &mut check_error)).await;
                match run {
                    Ok(result) => result,
                    Err(_) => {
                        error!("Pipeline deadline reached during {} of {}", phase, step.name());
                        PhaseResult::Failed(StepFailure::new(
                            FailureKind::Timeout { phase },
                            "pipeline deadline exceeded",
                        ))
                    }
                }
            }
            None => run_phases(step, &mut phase, &mut check_error).await,
        };

        let (outcome, error, warning) = match result {
            PhaseResult::Skipped => (StepOutcome::Skipped, None, None),
            PhaseResult::Applied { warning } => (StepOutcome::Applied, None, warning),
            PhaseResult::Failed(failure) => (StepOutcome::Failed, Some(failure), None),
        };

        StepRecord {
            step_name: step.name().to_string(),
            category: step.category(),
            outcome,
            duration_ms: started.elapsed().as_millis() as u64,
            error,
            check_error,
            warning,
        }
    }
}

async fn run_phases(
    step: &dyn Step,
    phase: &mut Phase,
    check_error: &mut Option<String>,
) -> PhaseResult {
    *phase = Phase::Check;
    match step.check().await {
        Ok(true) => {
            debug!("Step {} already satisfied", step.name());
            return PhaseResult::Skipped;
        }
        Ok(false) => {}
        Err(e) => {
            warn!("Check for {} was indeterminate, applying: {}", step.name(), e);
            *check_error = Some(e.to_string());
        }
    }

    *phase = Phase::Apply;
    if let Err(e) = step.apply().await {
        error!("Apply failed for {}: {}", step.name(), e);
        return PhaseResult::Failed(failure_from_error(Phase::Apply, FailureKind::ApplyFailed, e));
    }

    *phase = Phase::Verify;
    let failure = match step.verify().await {
        Ok(true) => {
            info!("Step {} applied", step.name());
            return PhaseResult::Applied { warning: None };
        }
        Ok(false) => StepFailure::postcondition_not_met(),
        Err(e) => failure_from_error(Phase::Verify, FailureKind::VerifyFailed, e),
    };

    match step.verify_policy() {
        VerifyPolicy::Abort => {
            error!("Verify failed for {}: {}", step.name(), failure.message);
            PhaseResult::Failed(failure)
        }
        VerifyPolicy::Warn => {
            warn!("Verify failed for {}, continuing: {}", step.name(), failure.message);
            PhaseResult::Applied {
                warning: Some(failure.to_string()),
            }
        }
    }
}

fn failure_from_error(phase: Phase, kind: FailureKind, error: StepError) -> StepFailure {
    let kind = if error.is_timeout() {
        FailureKind::Timeout { phase }
    } else {
        kind
    };
    StepFailure {
        kind,
        message: error.to_string(),
        exit_code: error.exit_code(),
        diagnostic: error.diagnostic().map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FailureCategory;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Scripted {
        check: Result<bool, &'static str>,
        apply: Result<(), i32>,
        verify: bool,
        policy: VerifyPolicy,
        applies: AtomicUsize,
        hang_in_verify: bool,
    }

    impl Scripted {
        fn new(check: Result<bool, &'static str>) -> Self {
            Self {
                check,
                apply: Ok(()),
                verify: true,
                policy: VerifyPolicy::Abort,
                applies: AtomicUsize::new(0),
                hang_in_verify: false,
            }
        }
    }

    #[async_trait]
    impl Step for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn category(&self) -> FailureCategory {
            FailureCategory::Service
        }

        async fn check(&self) -> Result<bool, StepError> {
            self.check.map_err(|m| StepError::Invalid(m.to_string()))
        }

        async fn apply(&self) -> Result<(), StepError> {
            self.applies.fetch_add(1, Ordering::SeqCst);
            self.apply.map_err(|code| StepError::CommandFailed {
                command: "systemctl restart yesdb".to_string(),
                exit_code: code,
                stderr: "Job failed".to_string(),
            })
        }

        async fn verify(&self) -> Result<bool, StepError> {
            if self.hang_in_verify {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(self.verify)
        }

        fn verify_policy(&self) -> VerifyPolicy {
            self.policy
        }
    }

    #[tokio::test]
    async fn test_satisfied_check_skips_apply() {
        let step = Scripted::new(Ok(true));
        let record = StepExecutor::new().execute(&step).await;
        assert_eq!(record.outcome, StepOutcome::Skipped);
        assert_eq!(step.applies.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_indeterminate_check_proceeds_to_apply() {
        let step = Scripted::new(Err("getent unavailable"));
        let record = StepExecutor::new().execute(&step).await;
        assert_eq!(record.outcome, StepOutcome::Applied);
        assert_eq!(record.check_error.as_deref(), Some("getent unavailable"));
        assert_eq!(step.applies.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_apply_failure_carries_exit_code() {
        let mut step = Scripted::new(Ok(false));
        step.apply = Err(1);
        let record = StepExecutor::new().execute(&step).await;

        let failure = record.error.unwrap();
        assert_eq!(failure.kind, FailureKind::ApplyFailed);
        assert_eq!(failure.exit_code, Some(1));
        assert_eq!(failure.diagnostic.as_deref(), Some("Job failed"));
    }

    #[tokio::test]
    async fn test_verify_false_is_postcondition_not_met() {
        let mut step = Scripted::new(Ok(false));
        step.verify = false;
        let record = StepExecutor::new().execute(&step).await;
        assert_eq!(record.outcome, StepOutcome::Failed);
        assert_eq!(record.error, Some(StepFailure::postcondition_not_met()));
    }

    #[tokio::test]
    async fn test_warn_policy_records_warning() {
        let mut step = Scripted::new(Ok(false));
        step.verify = false;
        step.policy = VerifyPolicy::Warn;
        let record = StepExecutor::new().execute(&step).await;
        assert_eq!(record.outcome, StepOutcome::Applied);
        assert!(record.warning.unwrap().contains("postcondition not met"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_reports_phase() {
        let mut step = Scripted::new(Ok(false));
        step.hang_in_verify = true;
        let deadline = Instant::now() + Duration::from_secs(5);
        let record = StepExecutor::new()
            .with_deadline(Some(deadline))
            .execute(&step)
            .await;

        let failure = record.error.unwrap();
        assert_eq!(failure.kind, FailureKind::Timeout { phase: Phase::Verify });
    }
}
