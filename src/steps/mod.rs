//! The provisioning steps and the fixed pipeline that runs them

pub mod certificate;
pub mod context;
pub mod deploy;
pub mod identity;
pub mod markers;
pub mod ownership;
pub mod packages;
pub mod proxy;
pub mod reload;
pub mod service;

pub use certificate::CertificateStep;
pub use context::HostContext;
pub use deploy::DeployStep;
pub use identity::IdentityStep;
pub use ownership::OwnershipStep;
pub use packages::PackagesStep;
pub use proxy::ProxyConfigStep;
pub use reload::ProxyReloadStep;
pub use service::ServiceStep;

use crate::core::config::ProvisionConfig;
use crate::core::Pipeline;
use crate::runner::CommandRunner;
use std::sync::Arc;

/// Step names in execution order
pub const STEP_ORDER: [&str; 8] = [
    packages::NAME,
    identity::NAME,
    deploy::NAME,
    ownership::NAME,
    service::NAME,
    proxy::NAME,
    reload::NAME,
    certificate::NAME,
];

/// Build the provisioning pipeline for `config`
///
/// Each step only depends on the ones before it: the service needs the
/// deployed tree, the proxy needs the service it routes to, and the ACME
/// challenge needs the proxy serving the hostname.
pub fn standard_pipeline(config: Arc<ProvisionConfig>, runner: Arc<dyn CommandRunner>) -> Pipeline {
    let host = HostContext::new(config.clone(), runner);
    Pipeline::new(config.name.clone())
        .with_step(Box::new(PackagesStep::new(host.clone())))
        .with_step(Box::new(IdentityStep::new(host.clone())))
        .with_step(Box::new(DeployStep::new(host.clone())))
        .with_step(Box::new(OwnershipStep::new(host.clone())))
        .with_step(Box::new(ServiceStep::new(host.clone())))
        .with_step(Box::new(ProxyConfigStep::new(host.clone())))
        .with_step(Box::new(ProxyReloadStep::new(host.clone())))
        .with_step(Box::new(CertificateStep::new(host)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FailureCategory;
    use crate::runner::FakeRunner;

    #[test]
    fn test_standard_pipeline_order_and_categories() {
        let pipeline = standard_pipeline(
            Arc::new(ProvisionConfig::default()),
            Arc::new(FakeRunner::new()),
        );

        assert_eq!(pipeline.step_names(), STEP_ORDER.to_vec());
        let categories: Vec<FailureCategory> =
            pipeline.steps().iter().map(|s| s.category()).collect();
        assert_eq!(
            categories,
            vec![
                FailureCategory::Packages,
                FailureCategory::Identity,
                FailureCategory::Deploy,
                FailureCategory::Deploy,
                FailureCategory::Service,
                FailureCategory::Proxy,
                FailureCategory::Proxy,
                FailureCategory::Certificate,
            ]
        );
    }
}
