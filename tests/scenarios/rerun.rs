use crate::helpers::*;
use provision::StepOutcome;
use std::sync::Arc;

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let host = TestHost::new();
    let sim = Arc::new(SimulatedHost::new(&host.config));

    let first = run_pipeline(&host.config, &sim).await;
    assert!(first.result.is_success());
    let mutations = sim.mutating_calls().len();

    let second = run_pipeline(&host.config, &sim).await;

    assert!(second.result.is_success());
    assert_eq!(second.result.count(StepOutcome::Skipped), 8);
    assert_eq!(sim.mutating_calls().len(), mutations);
}

#[tokio::test]
async fn test_new_commit_redeploys_and_restarts() {
    let host = TestHost::new();
    let sim = Arc::new(SimulatedHost::new(&host.config));
    run_pipeline(&host.config, &sim).await;

    sim.push_commit("9b74c9897bac770ffc029102a200c5de");
    let report = run_pipeline(&host.config, &sim).await;

    assert!(report.result.is_success());
    let applied: Vec<&str> = report
        .result
        .records()
        .iter()
        .filter(|r| r.outcome == StepOutcome::Applied)
        .map(|r| r.step_name.as_str())
        .collect();
    assert_eq!(applied, vec!["deploy", "ownership", "service"]);
    assert_eq!(sim.count("git clone"), 1);
    assert_eq!(sim.count("systemctl restart"), 2);
}

#[tokio::test]
async fn test_edited_unit_is_restored() {
    let host = TestHost::new();
    let sim = Arc::new(SimulatedHost::new(&host.config));
    run_pipeline(&host.config, &sim).await;

    let unit = host.config.service.unit_path(&host.config.paths.unit_dir);
    std::fs::write(&unit, "[Service]\nExecStart=/bin/false\n").unwrap();

    let report = run_pipeline(&host.config, &sim).await;

    assert!(report.result.is_success());
    assert_eq!(report.result.count(StepOutcome::Applied), 1);
    assert_eq!(
        report.result.record("service").unwrap().outcome,
        StepOutcome::Applied
    );
    assert_eq!(std::fs::read_to_string(&unit).unwrap(), host.config.service.render_unit());
}
