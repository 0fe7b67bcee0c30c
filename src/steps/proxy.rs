//! Reverse proxy site configuration

use crate::core::config::ProvisionConfig;
use crate::core::{FailureCategory, Step, StepError};
use crate::runner::args;
use crate::steps::context::{read_optional, write_if_changed};
use crate::steps::HostContext;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const NAME: &str = "proxy-config";

/// Site file under `sites_available`
pub fn site_path(config: &ProvisionConfig) -> PathBuf {
    config.paths.sites_available.join(config.routing.site_name())
}

/// Symlink under `sites_enabled`
pub fn enabled_path(config: &ProvisionConfig) -> PathBuf {
    config.paths.sites_enabled.join(config.routing.site_name())
}

/// The site as it should be right now: with TLS once a certificate exists
pub fn desired_site(config: &ProvisionConfig) -> String {
    let certificate = config.routing.certificate_paths(&config.paths.certificate_dir);
    if certificate.exist() {
        config.routing.render_site(Some(&certificate))
    } else {
        config.routing.render_site(None)
    }
}

/// Run the proxy's config syntax check
pub async fn test_config(host: &HostContext) -> Result<(), StepError> {
    host.require("nginx", &args(["-t"])).await?;
    Ok(())
}

/// Writes the site, enables it as the only site, and validates the proxy config
pub struct ProxyConfigStep {
    host: HostContext,
}

impl ProxyConfigStep {
    pub fn new(host: HostContext) -> Self {
        Self { host }
    }

    async fn enabled_entries(&self) -> Result<Vec<PathBuf>, StepError> {
        let dir = &self.host.config.paths.sites_enabled;
        let mut entries = Vec::new();
        let mut reader = match tokio::fs::read_dir(dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(StepError::io(dir, e)),
        };
        while let Some(entry) = reader.next_entry().await.map_err(|e| StepError::io(dir, e))? {
            entries.push(entry.path());
        }
        entries.sort();
        Ok(entries)
    }

    async fn linked(&self) -> bool {
        let link = enabled_path(&self.host.config);
        match tokio::fs::read_link(&link).await {
            Ok(target) => target == site_path(&self.host.config),
            Err(_) => false,
        }
    }

    async fn configured(&self) -> Result<bool, StepError> {
        let config = &self.host.config;
        let current = read_optional(&site_path(config)).await?;
        if current.as_deref() != Some(desired_site(config).as_str()) {
            debug!("Site {} differs from rendering", site_path(config).display());
            return Ok(false);
        }
        if !self.linked().await {
            return Ok(false);
        }
        let enabled = self.enabled_entries().await?;
        Ok(enabled == vec![enabled_path(config)])
    }

    async fn link(&self) -> Result<(), StepError> {
        let config = &self.host.config;
        let link = enabled_path(config);
        tokio::fs::create_dir_all(&config.paths.sites_enabled)
            .await
            .map_err(|e| StepError::io(&config.paths.sites_enabled, e))?;

        if !self.linked().await {
            remove_entry(&link).await?;
            tokio::fs::symlink(site_path(config), &link)
                .await
                .map_err(|e| StepError::io(&link, e))?;
        }

        for entry in self.enabled_entries().await? {
            if entry != link {
                info!("Disabling site {}", entry.display());
                remove_entry(&entry).await?;
            }
        }
        Ok(())
    }
}

async fn remove_entry(path: &Path) -> Result<(), StepError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StepError::io(path, e)),
    }
}

#[async_trait]
impl Step for ProxyConfigStep {
    fn name(&self) -> &str {
        NAME
    }

    fn category(&self) -> FailureCategory {
        FailureCategory::Proxy
    }

    async fn check(&self) -> Result<bool, StepError> {
        self.configured().await
    }

    async fn apply(&self) -> Result<(), StepError> {
        let config = &self.host.config;
        if write_if_changed(&site_path(config), &desired_site(config)).await? {
            info!("Wrote {}", site_path(config).display());
        }
        self.link().await?;
        test_config(&self.host).await
    }

    async fn verify(&self) -> Result<bool, StepError> {
        Ok(self.configured().await? && self.host.probe("nginx", &args(["-t"])).await?)
    }
}
