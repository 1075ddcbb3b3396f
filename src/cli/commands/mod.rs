//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod ingest;
mod serve;
mod stats;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "opencup")]
#[command(about = "OpenCUP public-investment dataset: ingestion and query API")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Store directory (Parquet tables and stats.json)
    #[arg(long = "data", global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Build the Parquet store from the raw OpenCUP/ANAC sources
    Ingest {
        /// Directory holding the OpenCup_*.csv extracts
        #[arg(long = "source")]
        source_dir: Option<PathBuf>,

        /// Directory holding cup_json.json and the ANAC archives
        /// (default: <source>/cup_json)
        #[arg(long = "cig-source")]
        cig_source_dir: Option<PathBuf>,

        /// Print the stage report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start the query API server
    Serve {
        /// Address to bind to: PORT, HOST, or HOST:PORT (default: 127.0.0.1:3030)
        bind: Option<String>,
    },

    /// Print the dataset totals as JSON
    Stats,
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (source_dir, cig_source_dir) = match &cli.command {
        Commands::Ingest {
            source_dir,
            cig_source_dir,
            ..
        } => (source_dir.clone(), cig_source_dir.clone()),
        _ => (None, None),
    };
    let options = LoadOptions {
        config_path: cli.config,
        data_dir: cli.data_dir,
        source_dir,
        cig_source_dir,
    };
    let (settings, _config) = load_settings_with_options(options).await;

    match cli.command {
        Commands::Ingest { json, .. } => ingest::cmd_ingest(&settings, json).await,
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.bind.clone());
            serve::cmd_serve(&settings, &bind).await
        }
        Commands::Stats => stats::cmd_stats(&settings).await,
    }
}
