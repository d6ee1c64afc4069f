use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use tokengate_common::logging::init_logging;
use tokengate_config::Settings;

mod scenarios;

use scenarios::{Dao, DaoScenarios};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML settings file (defaults to TOKENGATE_* environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level filter, overriding the configured one
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll the initial members and print their reports
    Setup,
    /// Run a full propose, vote and execute cycle
    Governance,
    /// Enroll a new member with the Voter role
    Members,
    /// Print the effective configuration
    Config,
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let settings = match path {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::from_env().context("Failed to load settings from environment")?,
    };
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        settings.log_level = level;
    }

    init_logging(
        settings.log_dir.as_deref().map(Path::new),
        "tokengate",
        &settings.log_level,
    )?;
    debug!(?settings, "Starting tokengate");

    match cli.command {
        Commands::Config => {
            print!("{}", settings.to_yaml()?);
        }
        Commands::Setup => {
            let dao = Dao::new(&settings).await?;
            DaoScenarios::new(&dao).setup_complete_dao().await?;
        }
        Commands::Governance => {
            let dao = Dao::new(&settings).await?;
            DaoScenarios::new(&dao).run_governance_cycle().await?;
        }
        Commands::Members => {
            let dao = Dao::new(&settings).await?;
            DaoScenarios::new(&dao).manage_membership().await?;
        }
    }

    Ok(())
}
