//! Tubetap CLI - headless driver for the interceptor
//!
//! Features:
//! - URL normalization per video classification
//! - Manifest inspection
//! - Request log replay against file-backed providers

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;
mod providers;

/// Tubetap CLI - Request interception toolkit
#[derive(Parser)]
#[command(name = "tubetap")]
#[command(version)]
#[command(about = "Inspect and replay intercepted video requests", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite a request URL the way the interceptor would
    Normalize {
        /// Request URL
        url: String,

        /// Video classification (default, live, upcoming, undefined)
        #[arg(short, long, default_value = "default")]
        classification: String,
    },

    /// Parse a video info manifest and list its streams
    Parse {
        /// Path to the manifest body
        file: PathBuf,
    },

    /// Replay a request log through an interceptor
    Replay {
        /// File with one request URL or control word (open, close, next, closed) per line
        requests: PathBuf,

        /// Directory holding one manifest body per video id
        #[arg(short, long)]
        manifests: PathBuf,

        /// Directory holding `<video_id>.json` metadata documents
        #[arg(long)]
        metadata: Option<PathBuf>,

        /// Interceptor configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Deliver to the external player sink
        #[arg(long)]
        external: bool,

        /// Pause between lines, in milliseconds
        #[arg(long, default_value = "0")]
        settle_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .init();

    tubetap_core::init();

    match cli.command {
        Commands::Normalize { url, classification } => {
            commands::normalize(&url, &classification, &cli.format)?;
        }
        Commands::Parse { file } => {
            commands::parse(&file, &cli.format).await?;
        }
        Commands::Replay {
            requests,
            manifests,
            metadata,
            config,
            external,
            settle_ms,
        } => {
            let options = commands::ReplayOptions {
                manifests,
                metadata,
                config,
                external,
                settle_ms,
            };
            commands::replay(&requests, options, &cli.format).await?;
        }
    }

    Ok(())
}
