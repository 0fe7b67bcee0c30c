//! System package installation

use crate::core::config::PackageManager;
use crate::core::{FailureCategory, Step, StepError};
use crate::runner::args;
use crate::steps::HostContext;
use async_trait::async_trait;
use tracing::info;

pub const NAME: &str = "packages";

/// Installs the configured packages that are missing
pub struct PackagesStep {
    host: HostContext,
}

impl PackagesStep {
    pub fn new(host: HostContext) -> Self {
        Self { host }
    }

    fn manager(&self) -> PackageManager {
        self.host.config.packages.manager
    }

    async fn installed(&self, package: &str) -> Result<bool, StepError> {
        match self.manager() {
            PackageManager::Apt => {
                let output = self
                    .host
                    .query("dpkg-query", &args(["-W", "-f=${Status}", package]))
                    .await?;
                Ok(output.success() && output.stdout.contains("install ok installed"))
            }
            PackageManager::Dnf => self.host.probe("rpm", &args(["-q", package])).await,
        }
    }

    async fn missing(&self) -> Result<Vec<String>, StepError> {
        let mut missing = Vec::new();
        for package in &self.host.config.packages.names {
            if !self.installed(package).await? {
                missing.push(package.clone());
            }
        }
        Ok(missing)
    }
}

#[async_trait]
impl Step for PackagesStep {
    fn name(&self) -> &str {
        NAME
    }

    fn category(&self) -> FailureCategory {
        FailureCategory::Packages
    }

    async fn check(&self) -> Result<bool, StepError> {
        for package in &self.host.config.packages.names {
            if !self.installed(package).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn apply(&self) -> Result<(), StepError> {
        let missing = self.missing().await?;
        if missing.is_empty() {
            return Ok(());
        }
        info!("Installing packages: {}", missing.join(" "));

        match self.manager() {
            PackageManager::Apt => {
                let options = self
                    .host
                    .mutation()
                    .with_env("DEBIAN_FRONTEND", "noninteractive");
                self.host
                    .mutate_with("apt-get", &args(["update"]), options.clone())
                    .await?;
                let mut install = args(["install", "-y"]);
                install.extend(missing);
                self.host.mutate_with("apt-get", &install, options).await?;
            }
            PackageManager::Dnf => {
                let mut install = args(["install", "-y"]);
                install.extend(missing);
                self.host.mutate("dnf", &install).await?;
            }
        }
        Ok(())
    }

    async fn verify(&self) -> Result<bool, StepError> {
        Ok(self.missing().await?.is_empty())
    }
}
