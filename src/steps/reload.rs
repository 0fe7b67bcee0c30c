//! Proxy reload

use crate::core::{FailureCategory, Step, StepError};
use crate::runner::args;
use crate::steps::markers::{file_digest, MarkerStore, PROXY_LOADED};
use crate::steps::proxy::site_path;
use crate::steps::HostContext;
use async_trait::async_trait;
use tracing::{debug, info};

pub const NAME: &str = "proxy-reload";

/// Supervisor unit of the reverse proxy
pub const PROXY_UNIT: &str = "nginx";

/// Whether the proxy is running with the current site file loaded
pub async fn proxy_current(host: &HostContext) -> Result<bool, StepError> {
    if !host.probe("systemctl", &args(["is-active", PROXY_UNIT])).await? {
        debug!("{} is not active", PROXY_UNIT);
        return Ok(false);
    }
    let markers = MarkerStore::new(&host.config.paths.state_dir);
    let Some(digest) = file_digest(&site_path(&host.config)).await? else {
        return Ok(false);
    };
    markers.matches(PROXY_LOADED, &digest).await
}

/// Reload (or start) the proxy and remember which site file it loaded
pub async fn reload_proxy(host: &HostContext) -> Result<(), StepError> {
    info!("Reloading {}", PROXY_UNIT);
    host.mutate("systemctl", &args(["reload-or-restart", PROXY_UNIT]))
        .await?;

    let markers = MarkerStore::new(&host.config.paths.state_dir);
    if let Some(digest) = file_digest(&site_path(&host.config)).await? {
        markers.write(PROXY_LOADED, &digest).await?;
    }
    Ok(())
}

/// Makes the running proxy pick up the site configuration
pub struct ProxyReloadStep {
    host: HostContext,
}

impl ProxyReloadStep {
    pub fn new(host: HostContext) -> Self {
        Self { host }
    }
}

#[async_trait]
impl Step for ProxyReloadStep {
    fn name(&self) -> &str {
        NAME
    }

    fn category(&self) -> FailureCategory {
        FailureCategory::Proxy
    }

    async fn check(&self) -> Result<bool, StepError> {
        proxy_current(&self.host).await
    }

    async fn apply(&self) -> Result<(), StepError> {
        reload_proxy(&self.host).await
    }

    async fn verify(&self) -> Result<bool, StepError> {
        proxy_current(&self.host).await
    }
}
