//! loopwright CLI — the main entry point.
//!
//! Commands:
//! - `run`    — Drive one request through the agent loop
//! - `tools`  — List the registered tools and their schemas
//! - `config` — Show the effective configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "loopwright",
    about = "loopwright — a bounded tool-calling agent loop",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a config file (default: ~/.loopwright/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive one request through the agent loop
    Run {
        /// The user request to fulfil
        request: String,

        /// Override the global cap on tool invocations
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Override the recovery attempts allowed per failure streak
        #[arg(long)]
        retry_budget: Option<u32>,

        /// Override the per-tool-invocation timeout, in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Use the scripted offline provider instead of a live model
        #[arg(long)]
        offline: bool,
    },

    /// List the registered tools and their schemas
    Tools,

    /// Show the effective configuration (API key redacted)
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            request,
            max_iterations,
            retry_budget,
            timeout_secs,
            offline,
        } => {
            commands::run::run(
                cli.config,
                request,
                commands::run::Overrides {
                    max_iterations,
                    retry_budget,
                    timeout_secs,
                    offline,
                },
            )
            .await?
        }
        Commands::Tools => commands::tools::run(cli.config)?,
        Commands::Config => commands::config_cmd::run(cli.config)?,
    }

    Ok(())
}
