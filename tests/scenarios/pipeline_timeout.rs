use crate::helpers::*;
use provision::core::{FailureKind, Phase};
use provision::FailureCategory;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_pipeline_deadline_interrupts_hung_command() {
    let host = TestHost::new();
    let sim = Arc::new(SimulatedHost::new(&host.config));
    sim.delay_on("apt-get install", Duration::from_secs(3600));

    let report =
        run_pipeline_with_timeout(&host.config, &sim, Some(Duration::from_millis(200))).await;

    assert_eq!(report.result.exit_code(), FailureCategory::Packages.exit_code());
    let failure = report.result.failed_step().unwrap().error.clone().unwrap();
    assert_eq!(failure.kind, FailureKind::Timeout { phase: Phase::Apply });
    assert_eq!(report.started, vec!["packages"]);
}
