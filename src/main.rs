use provision::cli::output::*;
use provision::cli::Cli;
use provision::core::config::ProvisionConfig;
use provision::execution::ExecutionEngine;
use provision::persistence::{create_summary, InMemoryPersistence, PersistenceBackend};
use provision::runner::SubprocessRunner;
use provision::steps::standard_pipeline;

use anyhow::{Context, Result};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Exit code for errors outside any step
const EXIT_INTERNAL: u8 = 1;
/// Exit code for an unreadable or invalid configuration
const EXIT_CONFIG: u8 = 2;
/// Exit code when not running with root privileges
const EXIT_NOT_ROOT: u8 = 3;

fn main() -> ExitCode {
    let cli = Cli::from_args();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return ExitCode::from(EXIT_INTERNAL);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_INTERNAL)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    if let Some(limit) = cli.history {
        show_history(&cli, limit).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = match ProvisionConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            println!("{} Invalid configuration:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            return Ok(ExitCode::from(EXIT_CONFIG));
        }
    };

    if cli.validate {
        validate(&config, cli.json)?;
        return Ok(ExitCode::SUCCESS);
    }

    if !nix::unistd::Uid::effective().is_root() {
        println!("{} provision must run as root", CROSS);
        return Ok(ExitCode::from(EXIT_NOT_ROOT));
    }

    provision(&cli, config).await
}

async fn provision(cli: &Cli, config: ProvisionConfig) -> Result<ExitCode> {
    let config = Arc::new(config);
    let timeout = cli
        .timeout
        .map(Duration::from_secs)
        .or_else(|| config.pipeline_timeout());

    let pipeline = standard_pipeline(config.clone(), Arc::new(SubprocessRunner::new()));

    let mut engine = ExecutionEngine::new().with_timeout(timeout);
    if !cli.json {
        let reporter = Arc::new(ConsoleReporter::new());
        engine.add_event_handler(move |event| reporter.handle(&event));
    }

    let result = engine.execute(&pipeline).await;

    if !cli.no_history {
        match open_store().await {
            Ok(store) => {
                if let Err(e) = store.save_run(&create_summary(&result)).await {
                    warn!("Could not save run to history: {:#}", e);
                }
            }
            Err(e) => warn!("Could not open history: {:#}", e),
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_run_result(&result);
    }

    let code = u8::try_from(result.exit_code()).unwrap_or(EXIT_INTERNAL);
    Ok(ExitCode::from(code))
}

fn validate(config: &ProvisionConfig, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!("{} Configuration is valid!", CHECK);
    println!("  Name: {}", style(&config.name).bold());
    println!("  Hostname: {}", style(&config.routing.public_hostname).cyan());
    println!(
        "  Source: {} ({})",
        style(&config.application.repository).cyan(),
        config.application.branch
    );
    println!("  Service: {}", style(config.service.unit_file_name()).cyan());
    println!("  Packages: {}", style(config.packages.names.len()).cyan());
    if config.routing.certificate_email.is_empty() {
        println!("  {} No certificate email set; registering without contact", WARN);
    }
    Ok(())
}

async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    #[cfg(feature = "sqlite")]
    {
        let store = provision::persistence::SqliteRunStore::with_default_path()
            .await
            .context("Failed to open run history")?;
        Ok(Arc::new(store))
    }
    #[cfg(not(feature = "sqlite"))]
    {
        Ok(Arc::new(InMemoryPersistence::new()))
    }
}

async fn show_history(cli: &Cli, limit: usize) -> Result<()> {
    let name = match ProvisionConfig::load(cli.config.as_deref()) {
        Ok(config) => config.name,
        Err(_) => ProvisionConfig::default().name,
    };

    let store: Arc<dyn PersistenceBackend> = if cli.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        open_store().await?
    };
    let runs = store.list_runs(&name, limit).await?;

    if cli.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("{} No runs found for {}", INFO, style(&name).bold());
        return Ok(());
    }

    println!("{} Run history for {} (showing latest {}):", INFO, style(&name).bold(), limit);
    for run in &runs {
        println!("  {}", format_run_summary(run));
    }
    Ok(())
}
