use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::*;
use config::Config;

#[derive(Parser)]
#[command(name = "cachectl")]
#[command(author, version, about = "Cache Engine - in-process caching and memory reclamation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Exercise the demo caches once and print the report
    Report,

    /// Run the background samplers, then print the report
    Monitor {
        /// How long to monitor, in seconds
        #[arg(short, long, default_value = "10")]
        seconds: u64,
    },

    /// Print the effective configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose)?;

    // Load configuration
    let config = if let Some(config_path) = cli.config {
        Config::from_file(&config_path)?
    } else {
        Config::default()
    };

    match cli.command {
        Some(Commands::Config) => {
            show_config(&config)?;
        }
        Some(Commands::Monitor { seconds }) => {
            print_banner();
            run_monitor(&config, seconds).await?;
        }
        Some(Commands::Report) | None => {
            print_banner();
            show_report(&config).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        "cachectl=debug,cache_core=debug,cache_lru=debug,cache_monitor=debug,cache_store=debug,cache_coordinator=debug"
    } else {
        "cachectl=info,cache_monitor=info,cache_coordinator=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

fn print_banner() {
    println!("{}", "Cache Engine v0.1.0".bright_cyan().bold());
    println!(
        "{}",
        "LRU and TTL caches with metrics and memory reclamation\n".bright_black()
    );
}
