//! Supervised service unit

use crate::core::{FailureCategory, Step, StepError, VerifyPolicy};
use crate::execution::poll_until;
use crate::runner::args;
use crate::steps::context::{read_optional, write_if_changed};
use crate::steps::markers::{MarkerStore, DEPLOY_DIGEST, DEPLOY_REVISION};
use crate::steps::HostContext;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub const NAME: &str = "service";

/// Installs, enables and (re)starts the application unit
pub struct ServiceStep {
    host: HostContext,
    markers: MarkerStore,
}

impl ServiceStep {
    pub fn new(host: HostContext) -> Self {
        let markers = MarkerStore::new(&host.config.paths.state_dir);
        Self { host, markers }
    }

    fn unit(&self) -> String {
        self.host.config.service.unit_file_name()
    }

    fn unit_path(&self) -> PathBuf {
        self.host.config.service.unit_path(&self.host.config.paths.unit_dir)
    }

    /// Marker recording which deployment the running unit was started from
    fn started_from(&self) -> String {
        format!("{}.deployed", self.host.config.service.unit_name)
    }

    async fn deployment(&self) -> Result<String, StepError> {
        let revision = self.markers.read(DEPLOY_REVISION).await?.unwrap_or_default();
        let digest = self.markers.read(DEPLOY_DIGEST).await?.unwrap_or_default();
        Ok(format!("{}:{}", revision, digest))
    }

    async fn systemctl(&self, verb: &str) -> Result<bool, StepError> {
        let unit = self.unit();
        self.host.probe("systemctl", &args([verb, unit.as_str()])).await
    }
}

#[async_trait]
impl Step for ServiceStep {
    fn name(&self) -> &str {
        NAME
    }

    fn category(&self) -> FailureCategory {
        FailureCategory::Service
    }

    async fn check(&self) -> Result<bool, StepError> {
        let rendered = self.host.config.service.render_unit();
        if read_optional(&self.unit_path()).await?.as_deref() != Some(rendered.as_str()) {
            debug!("Unit file {} differs from rendering", self.unit_path().display());
            return Ok(false);
        }
        if !self.markers.matches(&self.started_from(), &self.deployment().await?).await? {
            debug!("{} runs an older deployment", self.unit());
            return Ok(false);
        }
        Ok(self.systemctl("is-enabled").await? && self.systemctl("is-active").await?)
    }

    async fn apply(&self) -> Result<(), StepError> {
        let unit = self.unit();
        let rendered = self.host.config.service.render_unit();
        if write_if_changed(&self.unit_path(), &rendered).await? {
            info!("Wrote {}", self.unit_path().display());
        }

        self.host.mutate("systemctl", &args(["daemon-reload"])).await?;
        self.host
            .mutate("systemctl", &args(["enable", unit.as_str()]))
            .await?;
        self.host
            .mutate("systemctl", &args(["restart", unit.as_str()]))
            .await?;

        let deployment = self.deployment().await?;
        self.markers.write(&self.started_from(), &deployment).await?;
        Ok(())
    }

    /// Poll until the unit has stayed active for the configured number of probes
    async fn verify(&self) -> Result<bool, StepError> {
        let budget = self.host.config.health_budget();
        let healthy = poll_until(budget, || self.systemctl("is-active")).await?;
        if !healthy {
            warn!(
                "{} not active after {} probe(s)",
                self.unit(),
                budget.attempts
            );
        }
        Ok(healthy)
    }

    fn verify_policy(&self) -> VerifyPolicy {
        self.host.config.policy.health_failure
    }
}
