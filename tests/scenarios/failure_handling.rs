use crate::helpers::*;
use provision::core::FailureKind;
use provision::runner::CommandOutput;
use provision::steps::proxy;
use provision::{ExecutionStatus, FailureCategory, StepOutcome};
use std::sync::Arc;

#[tokio::test]
async fn test_package_failure_stops_pipeline() {
    let host = TestHost::new();
    let sim = Arc::new(SimulatedHost::new(&host.config));
    sim.fail_on(
        "apt-get install",
        CommandOutput::failed(100, "E: Unable to locate package python3-venv"),
    );

    let report = run_pipeline(&host.config, &sim).await;

    assert_eq!(report.result.status(), ExecutionStatus::Failed);
    assert_eq!(report.result.exit_code(), FailureCategory::Packages.exit_code());
    assert_eq!(report.started, vec!["packages"]);
    assert_eq!(report.result.records().len(), 1);

    let failure = report.result.failed_step().unwrap().error.clone().unwrap();
    assert_eq!(failure.kind, FailureKind::ApplyFailed);
    assert_eq!(failure.exit_code, Some(100));
    assert_eq!(sim.count("getent"), 0);
    assert_eq!(sim.count("git"), 0);
}

#[tokio::test]
async fn test_dead_service_fails_before_proxy() {
    let host = TestHost::new();
    let sim = Arc::new(SimulatedHost::new(&host.config));
    sim.service_dies(true);

    let report = run_pipeline(&host.config, &sim).await;

    assert_eq!(report.result.exit_code(), FailureCategory::Service.exit_code());
    let failed = report.result.failed_step().unwrap();
    assert_eq!(failed.step_name, "service");
    assert_eq!(failed.error.as_ref().unwrap().kind, FailureKind::VerifyFailed);
    assert_eq!(report.result.count(StepOutcome::Applied), 4);

    let polls = sim.count("systemctl is-active yesdb.service");
    assert!(polls <= host.config.policy.health_attempts as usize + 1);
    assert_eq!(sim.count("nginx"), 0);
    assert!(!proxy::site_path(&host.config).exists());
}

#[tokio::test]
async fn test_certbot_failure_keeps_plain_site() {
    let host = TestHost::new();
    let sim = Arc::new(SimulatedHost::new(&host.config));
    sim.fail_on(
        "certbot",
        CommandOutput::failed(1, "too many certificates already issued"),
    );

    let report = run_pipeline(&host.config, &sim).await;

    assert_eq!(report.result.exit_code(), FailureCategory::Certificate.exit_code());
    assert_eq!(report.result.count(StepOutcome::Applied), 7);

    let site = std::fs::read_to_string(proxy::site_path(&host.config)).unwrap();
    assert!(!site.contains("443"));
    assert!(site.contains("proxy_pass http://"));
}
