use crate::helpers::*;
use provision::core::VerifyPolicy;
use provision::execution::ExecutionEvent;
use provision::StepOutcome;
use std::sync::Arc;

#[tokio::test]
async fn test_warn_policy_continues_past_unhealthy_service() {
    let mut host = TestHost::new();
    host.config.policy.health_failure = VerifyPolicy::Warn;
    let sim = Arc::new(SimulatedHost::new(&host.config));
    sim.service_dies(true);

    let report = run_pipeline(&host.config, &sim).await;

    assert_eq!(report.result.exit_code(), 0);
    let service = report.result.record("service").unwrap();
    assert_eq!(service.outcome, StepOutcome::Applied);
    assert!(service.warning.is_some());
    assert_eq!(report.result.records().len(), 8);
    assert!(report
        .events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::StepWarning { step, .. } if step == "service")));
}
