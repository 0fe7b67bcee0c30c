use crate::helpers::*;
use provision::execution::ExecutionEvent;
use provision::runner::CommandOutput;
use provision::StepOutcome;
use std::sync::Arc;

#[tokio::test]
async fn test_failed_check_proceeds_to_apply() {
    let host = TestHost::new();
    let sim = Arc::new(SimulatedHost::new(&host.config));
    sim.fail_times("getent", 1, CommandOutput::failed(1, "getent: unknown database"));

    let report = run_pipeline(&host.config, &sim).await;

    assert!(report.result.is_success());
    let identity = report.result.record("identity").unwrap();
    assert_eq!(identity.outcome, StepOutcome::Applied);
    assert!(identity.check_error.is_some());
    assert_eq!(sim.count("useradd"), 1);
    assert!(report
        .events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::StepCheckIndeterminate { step, .. } if step == "identity")));
}
