//! Stagehand - run typed job plans from the command line
//!
//! Loads configuration, assembles an orchestrator and drives one command:
//! - List registered job kinds
//! - Validate a plan file without submitting it
//! - Certify and run a plan (optionally as a dry run)
//! - Inspect, list or cancel persisted plans

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod commands;
mod config;

use app::App;
use config::StagehandConfig;

/// Stagehand command-line runner
#[derive(Parser)]
#[command(name = "stagehand")]
#[command(about = "Stagehand - partition, execute and certify job plans", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "STAGEHAND_CONFIG")]
    config: Option<String>,

    /// Log level, overriding the configured one
    #[arg(long, env = "STAGEHAND_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long, env = "STAGEHAND_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered job kinds
    Kinds,

    /// Validate a plan file without submitting it
    Validate {
        /// Path to the plan JSON
        plan: PathBuf,
    },

    /// Certify and run a plan, then print its status report
    Run {
        /// Path to the plan JSON
        plan: PathBuf,

        /// Run without side effects
        #[arg(long)]
        dry_run: bool,

        /// Override the plan id
        #[arg(long)]
        id: Option<String>,

        /// Print lifecycle events as JSON lines before the report
        #[arg(long)]
        events: bool,
    },

    /// Show the status report of a stored plan
    Status { plan_id: String },

    /// List stored plan ids
    Plans,

    /// Cancel a plan that has not finished
    Cancel { plan_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = StagehandConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    let level = cli.log_level.clone().unwrap_or_else(|| config.logging.level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());
    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let app = App::build(&config).await?;

    match cli.command {
        Commands::Kinds => commands::kinds(&app).await,
        Commands::Validate { plan } => commands::validate(&app, &plan).await,
        Commands::Run {
            plan,
            dry_run,
            id,
            events,
        } => {
            commands::run(
                &app,
                commands::RunArgs {
                    path: &plan,
                    dry_run,
                    id,
                    events,
                },
            )
            .await
        }
        Commands::Status { plan_id } => commands::status(&app, plan_id).await,
        Commands::Plans => commands::plans(&app).await,
        Commands::Cancel { plan_id } => commands::cancel(&app, plan_id).await,
    }
}
