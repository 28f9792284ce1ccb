//! M3U CLI - Headless driver for the playback core
//!
//! Features:
//! - Format hypothesis order and pipeline recipes for a stream url
//! - Scripted playback simulation against a real session

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;
mod scripted;

/// M3U CLI - Playback core diagnostics
#[derive(Parser)]
#[command(name = "m3u-cli")]
#[command(version)]
#[command(about = "Probe and simulate IPTV playback sessions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the hypothesis order and the pipeline each attempt would build
    Probe {
        /// Stream url
        url: String,

        /// DRM scheme (clearkey, widevine, playready)
        #[arg(long)]
        drm: Option<String>,

        /// License url or key material
        #[arg(long, requires = "drm")]
        key: Option<String>,

        /// Session config file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run a scripted playback against a real session
    Simulate {
        /// Script file (JSON)
        #[arg(short, long)]
        script: PathBuf,

        /// Session config file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    m3u_core::init();

    match cli.command {
        Commands::Probe { url, drm, key, config } => {
            commands::probe(&url, drm.as_deref(), key.as_deref(), config, &cli.format)?;
        }
        Commands::Simulate { script, config } => {
            commands::simulate(&script, config, &cli.format).await?;
        }
    }

    Ok(())
}
