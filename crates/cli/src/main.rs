//! Notes fixtures CLI - Main Entry Point
//!
//! Provisions fixture plans against a running notes application through a
//! real browser, and cleans up after previous runs.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use notes_e2e::E2eConfig;

mod commands;
mod output;

use commands::{check, cleanup, provision};

/// Notes fixtures - test-data provisioning for the notes app UI
#[derive(Parser)]
#[command(name = "notes-fixtures")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (YAML); defaults apply when it does not exist
    #[arg(long, default_value = "notes-e2e.yaml", global = true)]
    config: PathBuf,

    /// Application base URL (overrides the config file)
    #[arg(long, env = "NOTES_E2E_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision fixture plans through the UI
    Provision(provision::ProvisionArgs),

    /// Clean up the resources of a previous run
    Cleanup(cleanup::CleanupArgs),

    /// Check that the application is up
    Check,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let mut config = E2eConfig::load(&cli.config)?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }

    match cli.command {
        Commands::Provision(args) => provision::execute(args, config, cli.format).await?,
        Commands::Cleanup(args) => cleanup::execute(args, config, cli.format).await?,
        Commands::Check => check::execute(&config).await?,
        Commands::Version => {
            println!("notes-fixtures v{}", env!("CARGO_PKG_VERSION"));
            println!("UI test-data provisioning for the notes app");
        }
    }

    Ok(())
}
