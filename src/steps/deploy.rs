//! Application source and runtime environment

use crate::core::{FailureCategory, Step, StepError};
use crate::runner::args;
use crate::steps::markers::{file_digest, MarkerStore, DEPLOY_DIGEST, DEPLOY_REVISION};
use crate::steps::HostContext;
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

pub const NAME: &str = "deploy";

/// Fetches the application at the configured branch and builds its runtime
pub struct DeployStep {
    host: HostContext,
    markers: MarkerStore,
}

impl DeployStep {
    pub fn new(host: HostContext) -> Self {
        let markers = MarkerStore::new(&host.config.paths.state_dir);
        Self { host, markers }
    }

    fn target(&self) -> String {
        self.host.config.application.target_dir.display().to_string()
    }

    /// `git` arguments that operate on the checkout regardless of who owns it
    fn git_in_checkout<'a>(&self, rest: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let target = self.target();
        let safe_directory = format!("safe.directory={}", target);
        let mut git = args(["-c", safe_directory.as_str(), "-C", target.as_str()]);
        git.extend(rest.into_iter().map(str::to_string));
        git
    }

    async fn local_head(&self) -> Result<String, StepError> {
        let output = self
            .host
            .require("git", &self.git_in_checkout(["rev-parse", "HEAD"]))
            .await?;
        Ok(output.stdout_trimmed().to_string())
    }

    async fn remote_head(&self) -> Result<String, StepError> {
        let app = &self.host.config.application;
        let reference = format!("refs/heads/{}", app.branch);
        let output = self
            .host
            .require("git", &args(["ls-remote", app.repository.as_str(), reference.as_str()]))
            .await?;
        output
            .stdout
            .lines()
            .find_map(|line| line.split_whitespace().next())
            .map(str::to_string)
            .ok_or_else(|| {
                StepError::Invalid(format!("branch {} not found in {}", app.branch, app.repository))
            })
    }

    async fn fetch(&self) -> Result<(), StepError> {
        let app = &self.host.config.application;
        if app.target_dir.join(".git").is_dir() {
            info!("Updating {} to {}", self.target(), app.branch);
            self.host
                .mutate(
                    "git",
                    &self.git_in_checkout(["fetch", app.repository.as_str(), app.branch.as_str()]),
                )
                .await?;
            self.host
                .mutate("git", &self.git_in_checkout(["reset", "--hard", "FETCH_HEAD"]))
                .await?;
        } else {
            info!("Cloning {} into {}", app.repository, self.target());
            let target = self.target();
            self.host
                .mutate(
                    "git",
                    &args([
                        "clone",
                        "--branch",
                        app.branch.as_str(),
                        app.repository.as_str(),
                        target.as_str(),
                    ]),
                )
                .await?;
        }
        Ok(())
    }

    async fn build_runtime(&self) -> Result<(), StepError> {
        let app = &self.host.config.application;
        let runtime = app.runtime_dir.display().to_string();

        if !app.runtime_python().exists() {
            self.host
                .mutate(&app.python, &args(["-m", "venv", runtime.as_str()]))
                .await?;
        }

        let pip = app.runtime_pip().display().to_string();
        self.host
            .mutate(&pip, &args(["install", "--upgrade", "pip"]))
            .await?;

        let install = match &app.install_spec {
            Some(spec) => args(["install", spec.as_str()]),
            None => {
                let manifest = app.manifest.display().to_string();
                args(["install", "-r", manifest.as_str()])
            }
        };
        let options = self.host.mutation().with_cwd(&app.target_dir);
        self.host.mutate_with(&pip, &install, options).await?;
        Ok(())
    }

    async fn create_data_dirs(&self) -> Result<(), StepError> {
        for dir in &self.host.config.application.data_dirs {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StepError::io(dir, e))?;
        }
        Ok(())
    }

    async fn satisfied(&self) -> Result<bool, StepError> {
        let app = &self.host.config.application;
        if !app.target_dir.join(".git").is_dir() {
            debug!("No checkout at {}", self.target());
            return Ok(false);
        }

        let local = self.local_head().await?;
        let remote = self.remote_head().await?;
        if local != remote {
            debug!("Checkout at {} but {} is at {}", local, app.branch, remote);
            return Ok(false);
        }
        if !self.markers.matches(DEPLOY_REVISION, &local).await? {
            return Ok(false);
        }

        if !app.runtime_python().exists() {
            return Ok(false);
        }
        let Some(digest) = file_digest(&app.manifest_path()).await? else {
            return Ok(false);
        };
        if !self.markers.matches(DEPLOY_DIGEST, &digest).await? {
            debug!("Dependency manifest changed since last install");
            return Ok(false);
        }

        Ok(app.data_dirs.iter().all(|dir| Path::new(dir).is_dir()))
    }
}

#[async_trait]
impl Step for DeployStep {
    fn name(&self) -> &str {
        NAME
    }

    fn category(&self) -> FailureCategory {
        FailureCategory::Deploy
    }

    async fn check(&self) -> Result<bool, StepError> {
        self.satisfied().await
    }

    async fn apply(&self) -> Result<(), StepError> {
        self.fetch().await?;
        self.create_data_dirs().await?;

        let manifest = self.host.config.application.manifest_path();
        let digest = file_digest(&manifest).await?.ok_or_else(|| {
            StepError::Invalid(format!("dependency manifest {} missing", manifest.display()))
        })?;
        self.build_runtime().await?;

        self.markers.write(DEPLOY_DIGEST, &digest).await?;
        let head = self.local_head().await?;
        self.markers.write(DEPLOY_REVISION, &head).await?;
        Ok(())
    }

    async fn verify(&self) -> Result<bool, StepError> {
        self.satisfied().await
    }
}
