//! Provisioning configuration from YAML

use crate::core::descriptor::{RestartPolicy, RoutingDescriptor, ServiceDescriptor};
use crate::core::step::VerifyPolicy;
use crate::execution::RetryBudget;
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variables that override config values
pub const ENV_HOSTNAME: &str = "PROVISION_HOSTNAME";
pub const ENV_REPOSITORY: &str = "PROVISION_REPOSITORY";
pub const ENV_BRANCH: &str = "PROVISION_BRANCH";
pub const ENV_EMAIL: &str = "PROVISION_EMAIL";

/// Top-level provisioning configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// Name of the provisioned system, used in history and output
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub packages: PackagesConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub application: ApplicationConfig,

    #[serde(default = "default_service")]
    pub service: ServiceDescriptor,

    #[serde(default = "default_routing")]
    pub routing: RoutingDescriptor,

    #[serde(default)]
    pub certificate: CertificateConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub paths: PathsConfig,
}

/// Package manager flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    #[default]
    Apt,
    Dnf,
}

/// System packages to install
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagesConfig {
    pub manager: PackageManager,
    pub names: Vec<String>,
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            manager: PackageManager::Apt,
            names: [
                "python3",
                "python3-venv",
                "python3-pip",
                "git",
                "nginx",
                "certbot",
                "python3-certbot-nginx",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// The dedicated service account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub name: String,
    pub home: PathBuf,
    pub shell: PathBuf,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: "yesdb".to_string(),
            home: PathBuf::from("/opt/yesdb"),
            shell: PathBuf::from("/usr/sbin/nologin"),
        }
    }
}

/// Where the application comes from and how its runtime is built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Git repository to fetch
    pub repository: String,

    pub branch: String,

    /// Checkout directory
    pub target_dir: PathBuf,

    /// Isolated runtime environment (virtualenv) directory
    pub runtime_dir: PathBuf,

    /// Interpreter used to build the runtime environment
    pub python: String,

    /// Dependency manifest, relative to `target_dir`
    pub manifest: PathBuf,

    /// Package spec for `pip install`; when unset, `-r <manifest>` is used
    pub install_spec: Option<String>,

    /// Directories the application writes to
    pub data_dirs: Vec<PathBuf>,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            repository: "https://github.com/yesdb/yesdb.git".to_string(),
            branch: "main".to_string(),
            target_dir: PathBuf::from("/opt/yesdb/app"),
            runtime_dir: PathBuf::from("/opt/yesdb/app/venv"),
            python: "python3".to_string(),
            manifest: PathBuf::from("pyproject.toml"),
            install_spec: Some(".[server]".to_string()),
            data_dirs: vec![
                PathBuf::from("/var/lib/yesdb"),
                PathBuf::from("/var/lib/yesdb/data"),
            ],
        }
    }
}

impl ApplicationConfig {
    pub fn manifest_path(&self) -> PathBuf {
        self.target_dir.join(&self.manifest)
    }

    pub fn runtime_python(&self) -> PathBuf {
        self.runtime_dir.join("bin").join("python")
    }

    pub fn runtime_pip(&self) -> PathBuf {
        self.runtime_dir.join("bin").join("pip")
    }
}

/// ACME client options
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateConfig {
    /// Use the ACME staging environment
    pub staging: bool,
}

/// Timeouts, retry budgets and failure policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Bound on every external command
    pub command_timeout_secs: u64,

    /// Bound on the whole run
    pub pipeline_timeout_secs: Option<u64>,

    /// Service health poll attempts
    pub health_attempts: u32,

    /// Sleep between health polls
    pub health_interval_ms: u64,

    /// Consecutive healthy polls required
    pub health_settle: u32,

    /// Renew certificates with fewer days left than this
    pub renew_before_days: i64,

    /// What a failed service health check does to the run
    pub health_failure: VerifyPolicy,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 900,
            pipeline_timeout_secs: None,
            health_attempts: 10,
            health_interval_ms: 1000,
            health_settle: 2,
            renew_before_days: 30,
            health_failure: VerifyPolicy::Abort,
        }
    }
}

/// Host paths touched by the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub unit_dir: PathBuf,
    pub sites_available: PathBuf,
    pub sites_enabled: PathBuf,
    pub certificate_dir: PathBuf,

    /// Where the pipeline keeps its own markers
    pub state_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            unit_dir: PathBuf::from("/etc/systemd/system"),
            sites_available: PathBuf::from("/etc/nginx/sites-available"),
            sites_enabled: PathBuf::from("/etc/nginx/sites-enabled"),
            certificate_dir: PathBuf::from("/etc/letsencrypt/live"),
            state_dir: PathBuf::from("/var/lib/provision"),
        }
    }
}

fn default_name() -> String {
    "yesdb".to_string()
}

fn default_service() -> ServiceDescriptor {
    let mut environment = BTreeMap::new();
    environment.insert("YESDB_DATA_DIR".to_string(), "/var/lib/yesdb/data".to_string());
    environment.insert(
        "YESDB_ACCOUNTS_DB".to_string(),
        "/var/lib/yesdb/accounts.db".to_string(),
    );
    environment.insert("YESDB_HOST".to_string(), "127.0.0.1".to_string());
    environment.insert("YESDB_PORT".to_string(), "8000".to_string());

    ServiceDescriptor {
        unit_name: "yesdb".to_string(),
        description: Some("YesDB Cloud API".to_string()),
        exec_path: PathBuf::from("/opt/yesdb/app/venv/bin/uvicorn"),
        exec_args: ["server.main:app", "--host", "127.0.0.1", "--port", "8000"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        working_dir: PathBuf::from("/opt/yesdb/app"),
        owner_identity: "yesdb".to_string(),
        restart_policy: RestartPolicy::Always,
        depends_on_network: true,
        environment,
    }
}

fn default_routing() -> RoutingDescriptor {
    RoutingDescriptor {
        public_hostname: "yesdb.centralindia.cloudapp.azure.com".to_string(),
        upstream_address: "127.0.0.1:8000".to_string(),
        certificate_email: String::new(),
    }
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            packages: PackagesConfig::default(),
            identity: IdentityConfig::default(),
            application: ApplicationConfig::default(),
            service: default_service(),
            routing: default_routing(),
            certificate: CertificateConfig::default(),
            policy: PolicyConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl ProvisionConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::read_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ProvisionConfig =
            serde_yaml::from_str(yaml).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` (or built-in defaults), apply environment overrides, validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(hostname) = lookup(ENV_HOSTNAME) {
            self.routing.public_hostname = hostname;
        }
        if let Some(repository) = lookup(ENV_REPOSITORY) {
            self.application.repository = repository;
        }
        if let Some(branch) = lookup(ENV_BRANCH) {
            self.application.branch = branch;
        }
        if let Some(email) = lookup(ENV_EMAIL) {
            self.routing.certificate_email = email;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let account = Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$")?;
        let hostname = Regex::new(
            r"^([a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,63}$",
        )?;
        let upstream = Regex::new(r"^[A-Za-z0-9.\-]+:\d{1,5}$")?;
        let unit = Regex::new(r"^[A-Za-z0-9@_.\-]+$")?;

        if self.packages.names.is_empty() {
            anyhow::bail!("No packages configured");
        }
        if !account.is_match(&self.identity.name) {
            anyhow::bail!("Invalid identity name: '{}'", self.identity.name);
        }
        if self.service.owner_identity != self.identity.name {
            anyhow::bail!(
                "Service owner '{}' does not match identity '{}'",
                self.service.owner_identity,
                self.identity.name
            );
        }
        if !unit.is_match(&self.service.unit_name) {
            anyhow::bail!("Invalid unit name: '{}'", self.service.unit_name);
        }
        if self.application.repository.trim().is_empty() {
            anyhow::bail!("No application repository configured");
        }
        if self.application.branch.trim().is_empty() {
            anyhow::bail!("No application branch configured");
        }
        if !hostname.is_match(&self.routing.public_hostname) {
            anyhow::bail!("Invalid public hostname: '{}'", self.routing.public_hostname);
        }
        if !upstream.is_match(&self.routing.upstream_address) {
            anyhow::bail!(
                "Upstream address must be host:port, got '{}'",
                self.routing.upstream_address
            );
        }
        let email = &self.routing.certificate_email;
        if !email.is_empty() && !email.contains('@') {
            anyhow::bail!("Invalid certificate email: '{}'", email);
        }
        if self.policy.health_attempts == 0 {
            anyhow::bail!("health_attempts must be at least 1");
        }
        if self.policy.health_settle == 0 || self.policy.health_settle > self.policy.health_attempts {
            anyhow::bail!("health_settle must be between 1 and health_attempts");
        }
        if self.policy.command_timeout_secs == 0 {
            anyhow::bail!("command_timeout_secs must be positive");
        }

        let absolute = [
            ("identity.home", &self.identity.home),
            ("application.target_dir", &self.application.target_dir),
            ("application.runtime_dir", &self.application.runtime_dir),
            ("service.working_dir", &self.service.working_dir),
            ("service.exec_path", &self.service.exec_path),
            ("paths.unit_dir", &self.paths.unit_dir),
            ("paths.sites_available", &self.paths.sites_available),
            ("paths.sites_enabled", &self.paths.sites_enabled),
            ("paths.certificate_dir", &self.paths.certificate_dir),
            ("paths.state_dir", &self.paths.state_dir),
        ];
        for (field, path) in absolute {
            if !path.is_absolute() {
                anyhow::bail!("{} must be an absolute path: {}", field, path.display());
            }
        }
        for dir in &self.application.data_dirs {
            if !dir.is_absolute() {
                anyhow::bail!("Data directory must be an absolute path: {}", dir.display());
            }
        }
        if self.application.manifest.is_absolute() {
            anyhow::bail!("application.manifest must be relative to target_dir");
        }

        Ok(())
    }

    /// Bound on every external command
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.policy.command_timeout_secs)
    }

    /// Bound on the whole run
    pub fn pipeline_timeout(&self) -> Option<Duration> {
        self.policy.pipeline_timeout_secs.map(Duration::from_secs)
    }

    /// Retry budget for the service health poll
    pub fn health_budget(&self) -> RetryBudget {
        RetryBudget::new(
            self.policy.health_attempts,
            Duration::from_millis(self.policy.health_interval_ms),
        )
        .with_settle(self.policy.health_settle)
    }
}
