//! Command-line boundary: thin subcommands over library entry points.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::app::App;
use crate::config::{Config, StrategiesConfig};

#[derive(Debug, Parser)]
#[command(name = "polyflow", about = "Tiered prediction-market collection and trading engine")]
pub struct Cli {
    /// Path to the main configuration document.
    #[arg(long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to the strategies document.
    #[arg(long, default_value = "strategies.toml")]
    pub strategies: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the collection pipeline and trading engine.
    Run,
    /// Run one discovery pass and print the tier census.
    Discover,
    /// Print registry, position, and balance status from the store.
    Status,
}

/// Parse arguments and dispatch. Configuration errors are fatal here, at
/// startup, per the error-handling policy.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    config.logging.init();

    match cli.command {
        Command::Run => {
            let strategies = if cli.strategies.exists() {
                StrategiesConfig::load(&cli.strategies)?
            } else {
                tracing::warn!(
                    path = %cli.strategies.display(),
                    "No strategies document; engine will idle"
                );
                StrategiesConfig::default()
            };
            let app = App::build(config, strategies, cli.config, cli.strategies).await?;
            app.run().await?;
        }
        Command::Discover => crate::app::discover_once(&config).await?,
        Command::Status => crate::app::status(&config).await?,
    }
    Ok(())
}
