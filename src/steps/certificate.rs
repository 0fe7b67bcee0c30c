//! TLS certificate for the public hostname

use crate::core::descriptor::CertificatePaths;
use crate::core::{FailureCategory, Step, StepError};
use crate::runner::args;
use crate::steps::context::{read_optional, write_if_changed};
use crate::steps::proxy::{site_path, test_config};
use crate::steps::reload::{proxy_current, reload_proxy};
use crate::steps::HostContext;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use tracing::{debug, info, warn};

pub const NAME: &str = "certificate";

/// Parse the `notAfter=` line printed by `openssl x509 -enddate`
pub fn parse_not_after(output: &str) -> Option<DateTime<Utc>> {
    let pattern = Regex::new(r"notAfter=(.+)").ok()?;
    let raw = pattern.captures(output)?.get(1)?.as_str();
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&normalized, "%b %d %H:%M:%S %Y GMT")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Obtains or renews the certificate and switches the site to TLS
pub struct CertificateStep {
    host: HostContext,
}

impl CertificateStep {
    pub fn new(host: HostContext) -> Self {
        Self { host }
    }

    fn paths(&self) -> CertificatePaths {
        let config = &self.host.config;
        config.routing.certificate_paths(&config.paths.certificate_dir)
    }

    fn tls_site(&self) -> String {
        self.host.config.routing.render_site(Some(&self.paths()))
    }

    async fn expires_at(&self) -> Result<DateTime<Utc>, StepError> {
        let fullchain = self.paths().fullchain.display().to_string();
        let output = self
            .host
            .require(
                "openssl",
                &args(["x509", "-enddate", "-noout", "-in", fullchain.as_str()]),
            )
            .await?;
        parse_not_after(&output.stdout).ok_or_else(|| {
            StepError::Invalid(format!(
                "could not read expiry of {}: {}",
                fullchain,
                output.stdout_trimmed()
            ))
        })
    }

    /// Whether a certificate exists and is not due for renewal
    async fn certificate_valid(&self) -> Result<bool, StepError> {
        if !self.paths().exist() {
            return Ok(false);
        }
        let remaining = self.expires_at().await? - Utc::now();
        let renew_before = self.host.config.policy.renew_before_days;
        debug!("Certificate has {} day(s) left", remaining.num_days());
        Ok(remaining.num_days() >= renew_before)
    }

    async fn site_uses_tls(&self) -> Result<bool, StepError> {
        let current = read_optional(&site_path(&self.host.config)).await?;
        Ok(current.as_deref() == Some(self.tls_site().as_str()))
    }

    async fn obtain(&self) -> Result<(), StepError> {
        let config = &self.host.config;
        let hostname = config.routing.public_hostname.as_str();
        let email = config.routing.certificate_email.as_str();

        let mut certbot = args(["certonly", "--nginx", "--non-interactive", "--agree-tos"]);
        if email.is_empty() {
            certbot.push("--register-unsafely-without-email".to_string());
        } else {
            certbot.extend(args(["--email", email]));
        }
        certbot.extend(args(["-d", hostname]));
        if self.paths().exist() {
            certbot.push("--force-renewal".to_string());
        }
        if config.certificate.staging {
            certbot.push("--staging".to_string());
        }

        info!("Requesting certificate for {}", hostname);
        self.host.mutate("certbot", &certbot).await?;
        Ok(())
    }
}

#[async_trait]
impl Step for CertificateStep {
    fn name(&self) -> &str {
        NAME
    }

    fn category(&self) -> FailureCategory {
        FailureCategory::Certificate
    }

    async fn check(&self) -> Result<bool, StepError> {
        Ok(self.certificate_valid().await?
            && self.site_uses_tls().await?
            && proxy_current(&self.host).await?)
    }

    async fn apply(&self) -> Result<(), StepError> {
        let valid = match self.certificate_valid().await {
            Ok(valid) => valid,
            Err(e) => {
                warn!("Could not read current certificate, renewing: {}", e);
                false
            }
        };
        if !valid {
            self.obtain().await?;
        }
        if !self.paths().exist() {
            return Err(StepError::Invalid(format!(
                "certificate not found at {}",
                self.paths().fullchain.display()
            )));
        }

        write_if_changed(&site_path(&self.host.config), &self.tls_site()).await?;
        test_config(&self.host).await?;
        reload_proxy(&self.host).await
    }

    async fn verify(&self) -> Result<bool, StepError> {
        Ok(self.certificate_valid().await?
            && self.site_uses_tls().await?
            && self.host.probe("nginx", &args(["-t"])).await?)
    }
}
