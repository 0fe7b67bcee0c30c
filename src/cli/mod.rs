//! Command-line interface

pub mod output;

use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

/// Provision this host to serve the application behind a TLS reverse proxy
#[derive(Debug, Parser, Clone)]
#[command(name = "provision")]
#[command(version)]
#[command(about = "Idempotent single-host provisioning for a proxied, supervised web service", long_about = None)]
pub struct Cli {
    /// Path to provisioning configuration file (built-in defaults when omitted)
    #[arg(short, long, env = "PROVISION_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Abort the run after this many seconds (overrides policy.pipeline_timeout_secs)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,

    /// Show the latest N runs from history instead of provisioning
    #[arg(long, value_name = "N")]
    pub history: Option<usize>,

    /// Validate the configuration and exit
    #[arg(long)]
    pub validate: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_provision() {
        let cli = Cli::try_parse_from(["provision"]).unwrap();
        assert_eq!(cli.history, None);
        assert!(!cli.validate);
        assert!(!cli.json);
        assert_eq!(cli.timeout, None);
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "provision",
            "--config",
            "/etc/provision.yaml",
            "--timeout",
            "1800",
            "--no-history",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/provision.yaml")));
        assert_eq!(cli.timeout, Some(1800));
        assert!(cli.no_history);
        assert!(cli.json);
    }

    #[test]
    fn test_history_limit() {
        let cli = Cli::try_parse_from(["provision", "--history", "5"]).unwrap();
        assert_eq!(cli.history, Some(5));
        assert!(!cli.validate);
    }

    #[test]
    fn test_rejects_subcommands() {
        assert!(Cli::try_parse_from(["provision", "run"]).is_err());
    }
}
