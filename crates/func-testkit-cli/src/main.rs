//! func-testkit - run a local Functions host the way the test harness does.
//!
//! `run` starts the host, prints its base address and keeps it alive until
//! Ctrl-C. `args` shows how an argument vector is parsed and rebuilt.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use func_testkit::{
    cmdline, FactorySettings, FunctionApplicationFactory, FunctionLocator, PathLocator,
    ProjectLocator,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "func-testkit")]
#[command(about = "Supervise a local Azure Functions host")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the host and keep it running until Ctrl-C
    Run {
        /// Function project directory
        #[arg(long, conflicts_with = "project")]
        path: Option<PathBuf>,

        /// Function project folder name, searched under the enclosing solution
        #[arg(long)]
        project: Option<String>,

        /// Settings file (JSON, kebab-case keys, durations in milliseconds)
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Explicit path to the `func` executable
        #[arg(long)]
        func: Option<PathBuf>,

        /// Startup deadline in milliseconds
        #[arg(long)]
        startup_delay_ms: Option<u64>,

        /// Shutdown grace window in milliseconds
        #[arg(long)]
        shutdown_delay_ms: Option<u64>,

        /// Relative path polled until the host answers
        #[arg(long)]
        health_check: Option<String>,

        /// Arguments passed to `func start`
        #[arg(last = true, allow_hyphen_values = true)]
        func_args: Vec<String>,
    },

    /// Parse arguments and print the options and the rebuilt argument vector
    Args {
        #[arg(last = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match cli.command {
        Command::Args { args } => print_args(&args),
        Command::Run {
            path,
            project,
            settings,
            func,
            startup_delay_ms,
            shutdown_delay_ms,
            health_check,
            func_args,
        } => {
            let mut factory_settings = match settings {
                Some(file) => load_settings(&file)?,
                None => FactorySettings::new(),
            };
            if let Some(func) = func {
                factory_settings = factory_settings.with_executable_path(func);
            }
            if let Some(ms) = startup_delay_ms {
                factory_settings = factory_settings.with_startup_delay(Duration::from_millis(ms));
            }
            if let Some(ms) = shutdown_delay_ms {
                factory_settings = factory_settings.with_shutdown_delay(Duration::from_millis(ms));
            }
            if let Some(endpoint) = health_check {
                factory_settings = factory_settings.with_health_check_endpoint(endpoint);
            }
            if cli.verbose {
                factory_settings = factory_settings.with_verbose(true);
            }

            let locator: Box<dyn FunctionLocator> = match (path, project) {
                (Some(path), _) => Box::new(PathLocator::new(path)?),
                (None, Some(project)) => Box::new(ProjectLocator::new(&project)?),
                (None, None) => Box::new(PathLocator::new(std::env::current_dir()?)?),
            };

            run_host(locator.as_ref(), &func_args, factory_settings).await
        }
    }
}

fn load_settings(file: &Path) -> Result<FactorySettings> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read settings file {}", file.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Invalid settings file {}", file.display()))
}

fn print_args(args: &[String]) -> Result<()> {
    let options = cmdline::parse(args);
    println!("{}", serde_json::to_string_pretty(&options)?);

    let rebuilt = cmdline::serialize(&options);
    println!("{}", cmdline::to_command_line(&rebuilt));

    if cmdline::parse(&rebuilt) != options {
        bail!("Rebuilt arguments do not parse back to the same options");
    }
    Ok(())
}

async fn run_host(
    locator: &dyn FunctionLocator,
    func_args: &[String],
    settings: FactorySettings,
) -> Result<()> {
    let mut factory = FunctionApplicationFactory::new(locator, func_args, settings)?;
    info!("Starting host in {}", factory.startup_directory().display());

    if let Err(e) = factory.start().await {
        // A host that failed its health check is still running.
        factory.stop().await.ok();
        return Err(e.into());
    }

    if let Some(substitution) = factory.port_substitution() {
        info!(
            "Requested port {} was busy, using {}",
            substitution.requested, substitution.assigned
        );
    }

    // Intentional stdout so wrapper scripts can read the address
    println!("BASE_URL={}", factory.base_url()?);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping host");

    factory.stop().await?;
    Ok(())
}
