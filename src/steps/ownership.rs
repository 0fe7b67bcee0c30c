//! Ownership of application and data trees

use crate::core::{FailureCategory, Step, StepError};
use crate::runner::args;
use crate::steps::HostContext;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

pub const NAME: &str = "ownership";

/// Hands the deployed tree and data directories to the service account
pub struct OwnershipStep {
    host: HostContext,
}

impl OwnershipStep {
    pub fn new(host: HostContext) -> Self {
        Self { host }
    }

    fn roots(&self) -> Vec<PathBuf> {
        let app = &self.host.config.application;
        let mut roots = vec![app.target_dir.clone()];
        roots.extend(app.data_dirs.iter().cloned());
        roots
    }

    /// Whether every path under every root is owned by the account
    async fn owned(&self) -> Result<bool, StepError> {
        let name = &self.host.config.identity.name;
        for root in self.roots() {
            let root = root.display().to_string();
            let output = self
                .host
                .require(
                    "find",
                    &args([root.as_str(), "!", "-user", name.as_str(), "-print", "-quit"]),
                )
                .await?;
            if !output.stdout_trimmed().is_empty() {
                debug!("{} is not owned by {}", output.stdout_trimmed(), name);
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl Step for OwnershipStep {
    fn name(&self) -> &str {
        NAME
    }

    fn category(&self) -> FailureCategory {
        FailureCategory::Deploy
    }

    async fn check(&self) -> Result<bool, StepError> {
        self.owned().await
    }

    async fn apply(&self) -> Result<(), StepError> {
        let name = &self.host.config.identity.name;
        let owner = format!("{}:{}", name, name);
        for root in self.roots() {
            let root = root.display().to_string();
            self.host
                .mutate("chown", &args(["-R", owner.as_str(), root.as_str()]))
                .await?;
        }
        Ok(())
    }

    async fn verify(&self) -> Result<bool, StepError> {
        self.owned().await
    }
}
