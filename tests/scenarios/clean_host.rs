use crate::helpers::*;
use provision::steps::{proxy, STEP_ORDER};
use provision::StepOutcome;
use std::sync::Arc;

#[tokio::test]
async fn test_clean_host_applies_every_step() {
    let host = TestHost::new();
    let sim = Arc::new(SimulatedHost::new(&host.config));

    let report = run_pipeline(&host.config, &sim).await;

    assert!(report.result.is_success(), "{:?}", report.result.records());
    assert_eq!(report.result.exit_code(), 0);
    assert_eq!(report.result.count(StepOutcome::Applied), 8);
    assert_eq!(report.started, STEP_ORDER.to_vec());
}

#[tokio::test]
async fn test_clean_host_ends_with_tls_site() {
    let host = TestHost::new();
    let sim = Arc::new(SimulatedHost::new(&host.config));

    run_pipeline(&host.config, &sim).await;

    let site = std::fs::read_to_string(proxy::site_path(&host.config)).unwrap();
    assert!(site.contains("listen 443 ssl;"));
    assert!(site.contains("return 301 https://$host$request_uri;"));

    let unit = host.config.service.unit_path(&host.config.paths.unit_dir);
    assert_eq!(
        std::fs::read_to_string(unit).unwrap(),
        host.config.service.render_unit()
    );

    let certbot: Vec<String> = sim
        .command_lines()
        .into_iter()
        .filter(|line| line.starts_with("certbot"))
        .collect();
    assert_eq!(certbot.len(), 1);
    assert!(certbot[0].contains("--email ops@example.com"));
    assert!(certbot[0].ends_with("-d db.example.com"));
    assert!(!certbot[0].contains("--force-renewal"));
}

#[tokio::test]
async fn test_proxy_is_configured_before_certificate() {
    let host = TestHost::new();
    let sim = Arc::new(SimulatedHost::new(&host.config));

    run_pipeline(&host.config, &sim).await;

    let lines = sim.command_lines();
    let first = |prefix: &str| lines.iter().position(|l| l.starts_with(prefix)).unwrap();
    assert!(first("apt-get install") < first("useradd"));
    assert!(first("useradd") < first("git clone"));
    assert!(first("git clone") < first("chown"));
    assert!(first("chown") < first("systemctl restart"));
    assert!(first("systemctl restart") < first("nginx -t"));
    assert!(first("systemctl reload-or-restart nginx") < first("certbot"));
}
