//! Feedview - watch captured traffic as a live, scrollable feed
//!
//! Usage:
//!   feedview watch [--query Q]     Tail traffic in the terminal UI
//!   feedview watch --no-tui        Print entries as they arrive
//!   feedview config                Show or update the configuration

mod commands;
mod config;
mod feed;
mod tui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "feedview")]
#[command(author = "Feedview Team")]
#[command(version)]
#[command(about = "Watch captured traffic as a live feed", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Tail captured traffic
    Watch {
        /// Filter expression sent to the backend
        #[arg(short, long, default_value = "")]
        query: String,

        /// Capture backend URL (overrides config)
        #[arg(long, env = "FEEDVIEW_SERVER")]
        server: Option<String>,

        /// Cap on retained entries (overrides config)
        #[arg(long)]
        max_entries: Option<usize>,

        /// Print entries line by line instead of the terminal UI
        #[arg(long)]
        no_tui: bool,
    },

    /// Show or update the configuration
    Config {
        /// Capture backend URL
        #[arg(long)]
        server: Option<String>,

        /// Cap on retained entries
        #[arg(long)]
        max_entries: Option<usize>,

        /// Entries per backfill page
        #[arg(long)]
        page_limit: Option<u32>,

        /// Backfill request timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Ensure config directories exist
    config::ensure_dirs()?;

    let uses_tui = matches!(cli.command, Commands::Watch { no_tui: false, .. });
    init_logging(cli.verbose, uses_tui)?;

    // Handle commands
    match cli.command {
        Commands::Watch {
            query,
            server,
            max_entries,
            no_tui,
        } => {
            let mut config = config::Config::load()?;
            if let Some(server) = server {
                config.server_url = server;
            }
            if let Some(max) = max_entries {
                config.max_entries = max;
            }
            commands::watch::run(config, commands::watch::WatchOptions { query, no_tui }).await?;
        }

        Commands::Config {
            server,
            max_entries,
            page_limit,
            timeout_ms,
        } => {
            let update = commands::config::ConfigUpdate {
                server_url: server,
                max_entries,
                page_limit,
                fetch_timeout_ms: timeout_ms,
            };
            commands::config::run(update).await?;
        }
    }

    Ok(())
}

/// The terminal UI owns the screen, so its logs go to a file
fn init_logging(verbose: bool, to_file: bool) -> Result<()> {
    let log_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{},feedview_cli=info", log_level).into());

    if to_file {
        let path = config::logs_dir().join("feedview.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {:?}", path))?;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .without_time()
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    Ok(())
}
