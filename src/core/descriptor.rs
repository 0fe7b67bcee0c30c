//! Service and routing descriptors
//!
//! Static configuration consumed by the service and proxy steps. Both render
//! deterministically, so rendered output can be compared byte-for-byte against
//! what is on disk.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Supervisor restart policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    #[default]
    Always,
    OnFailure,
    No,
}

impl RestartPolicy {
    pub fn as_systemd(self) -> &'static str {
        match self {
            RestartPolicy::Always => "always",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::No => "no",
        }
    }
}

/// The runtime unit to supervise
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Unit name without the `.service` suffix
    pub unit_name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Executable to run
    pub exec_path: PathBuf,

    /// Arguments passed to the executable
    #[serde(default)]
    pub exec_args: Vec<String>,

    pub working_dir: PathBuf,

    /// Account the unit runs as
    pub owner_identity: String,

    #[serde(default)]
    pub restart_policy: RestartPolicy,

    #[serde(default = "default_true")]
    pub depends_on_network: bool,

    /// Environment variables for the unit
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl ServiceDescriptor {
    /// Unit file name, e.g. `yesdb.service`
    pub fn unit_file_name(&self) -> String {
        format!("{}.service", self.unit_name)
    }

    /// Full path of the unit file under `unit_dir`
    pub fn unit_path(&self, unit_dir: &Path) -> PathBuf {
        unit_dir.join(self.unit_file_name())
    }

    /// Render the systemd unit file
    pub fn render_unit(&self) -> String {
        let description = self
            .description
            .clone()
            .unwrap_or_else(|| format!("{} service", self.unit_name));

        let mut unit = String::new();
        unit.push_str("[Unit]\n");
        unit.push_str(&format!("Description={}\n", description));
        if self.depends_on_network {
            unit.push_str("After=network-online.target\n");
            unit.push_str("Wants=network-online.target\n");
        }

        unit.push_str("\n[Service]\n");
        unit.push_str("Type=simple\n");
        unit.push_str(&format!("User={}\n", self.owner_identity));
        unit.push_str(&format!("Group={}\n", self.owner_identity));
        unit.push_str(&format!("WorkingDirectory={}\n", self.working_dir.display()));
        for (key, value) in &self.environment {
            unit.push_str(&format!("Environment=\"{}={}\"\n", key, value));
        }
        let mut exec = self.exec_path.display().to_string();
        for arg in &self.exec_args {
            exec.push(' ');
            exec.push_str(arg);
        }
        unit.push_str(&format!("ExecStart={}\n", exec));
        unit.push_str(&format!("Restart={}\n", self.restart_policy.as_systemd()));
        if self.restart_policy != RestartPolicy::No {
            unit.push_str("RestartSec=3\n");
        }

        unit.push_str("\n[Install]\n");
        unit.push_str("WantedBy=multi-user.target\n");
        unit
    }
}

/// Paths of the certificate pair for a hostname
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePaths {
    pub fullchain: PathBuf,
    pub private_key: PathBuf,
}

impl CertificatePaths {
    pub fn exist(&self) -> bool {
        self.fullchain.is_file() && self.private_key.is_file()
    }
}

/// The public endpoint and the upstream it proxies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDescriptor {
    pub public_hostname: String,

    /// `host:port` of the application
    pub upstream_address: String,

    /// Contact address for the ACME account
    pub certificate_email: String,
}

impl RoutingDescriptor {
    /// Site config file name
    pub fn site_name(&self) -> &str {
        &self.public_hostname
    }

    /// Where the ACME client stores the live certificate pair
    pub fn certificate_paths(&self, certificate_dir: &Path) -> CertificatePaths {
        let live = certificate_dir.join(&self.public_hostname);
        CertificatePaths {
            fullchain: live.join("fullchain.pem"),
            private_key: live.join("privkey.pem"),
        }
    }

    /// Render the nginx site. With `tls`, port 80 redirects to an HTTPS server
    /// using the given certificate pair.
    pub fn render_site(&self, tls: Option<&CertificatePaths>) -> String {
        let mut site = String::new();
        site.push_str("server {\n");
        site.push_str("    listen 80;\n");
        site.push_str("    listen [::]:80;\n");
        site.push_str(&format!("    server_name {};\n", self.public_hostname));
        site.push('\n');

        match tls {
            None => {
                self.push_proxy_location(&mut site);
                site.push_str("}\n");
            }
            Some(paths) => {
                site.push_str("    location / {\n");
                site.push_str("        return 301 https://$host$request_uri;\n");
                site.push_str("    }\n");
                site.push_str("}\n\n");

                site.push_str("server {\n");
                site.push_str("    listen 443 ssl;\n");
                site.push_str("    listen [::]:443 ssl;\n");
                site.push_str(&format!("    server_name {};\n", self.public_hostname));
                site.push('\n');
                site.push_str(&format!(
                    "    ssl_certificate {};\n",
                    paths.fullchain.display()
                ));
                site.push_str(&format!(
                    "    ssl_certificate_key {};\n",
                    paths.private_key.display()
                ));
                site.push_str("    ssl_protocols TLSv1.2 TLSv1.3;\n");
                site.push('\n');
                self.push_proxy_location(&mut site);
                site.push_str("}\n");
            }
        }
        site
    }

    fn push_proxy_location(&self, site: &mut String) {
        site.push_str("    location / {\n");
        site.push_str(&format!(
            "        proxy_pass http://{};\n",
            self.upstream_address
        ));
        site.push_str("        proxy_set_header Host $host;\n");
        site.push_str("        proxy_set_header X-Real-IP $remote_addr;\n");
        site.push_str("        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n");
        site.push_str("        proxy_set_header X-Forwarded-Proto $scheme;\n");
        site.push_str("    }\n");
    }
}
