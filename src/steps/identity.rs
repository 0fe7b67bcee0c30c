//! Dedicated service account

use crate::core::{FailureCategory, Step, StepError};
use crate::runner::args;
use crate::steps::HostContext;
use async_trait::async_trait;

pub const NAME: &str = "identity";

/// `getent` exit code for "key not found"
const GETENT_NOT_FOUND: i32 = 2;

/// Creates the system account the service runs as
pub struct IdentityStep {
    host: HostContext,
}

impl IdentityStep {
    pub fn new(host: HostContext) -> Self {
        Self { host }
    }

    async fn exists(&self) -> Result<bool, StepError> {
        let name = &self.host.config.identity.name;
        let output = self.host.query("getent", &args(["passwd", name.as_str()])).await?;
        match output.exit_code {
            0 => Ok(true),
            GETENT_NOT_FOUND => Ok(false),
            _ => Err(StepError::from_output(format!("getent passwd {}", name), &output)),
        }
    }
}

#[async_trait]
impl Step for IdentityStep {
    fn name(&self) -> &str {
        NAME
    }

    fn category(&self) -> FailureCategory {
        FailureCategory::Identity
    }

    async fn check(&self) -> Result<bool, StepError> {
        self.exists().await
    }

    async fn apply(&self) -> Result<(), StepError> {
        let identity = &self.host.config.identity;
        let home = identity.home.display().to_string();
        let shell = identity.shell.display().to_string();
        self.host
            .mutate(
                "useradd",
                &args([
                    "--system",
                    "--user-group",
                    "--create-home",
                    "--home-dir",
                    home.as_str(),
                    "--shell",
                    shell.as_str(),
                    identity.name.as_str(),
                ]),
            )
            .await?;
        Ok(())
    }

    async fn verify(&self) -> Result<bool, StepError> {
        self.exists().await
    }
}
