//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod check;
mod extract;
mod profile;
mod text;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::helpers::load_config;

#[derive(Parser)]
#[command(name = "lienscan")]
#[command(about = "Extract property addresses from scanned lien and lis pendens filings")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

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
    /// Extract the property address from one or more page images
    Extract {
        /// Captured page images (PNG, JPEG, TIFF, ...)
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Document identifier (defaults to the image file name)
        #[arg(long)]
        id: Option<String>,
        /// Record metadata echoed into diagnostics, as KEY=VALUE (repeatable)
        #[arg(short, long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
        /// Write diagnostic artifacts to this directory
        #[arg(short, long)]
        debug_dir: Option<PathBuf>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
        /// Number of images processed in parallel (default: available cores)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Treat all images as captures of one document and keep the best
        #[arg(long)]
        best: bool,
    },

    /// Run normalization and extraction on saved OCR text
    Text {
        /// Text file (use - for stdin)
        file: PathBuf,
        /// Print the per-pattern trace
        #[arg(long)]
        trace: bool,
        /// Print the normalized text
        #[arg(long)]
        normalized: bool,
    },

    /// Check OCR backend, profile and LLM availability
    Check,

    /// Print the active jurisdiction profile as TOML
    Profile {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Extract {
            images,
            id,
            meta,
            debug_dir,
            json,
            workers,
            best,
        } => {
            let options = extract::ExtractOptions {
                id,
                meta,
                debug_dir,
                json,
                workers,
                best,
            };
            extract::cmd_extract(config, &images, options).await
        }
        Commands::Text {
            file,
            trace,
            normalized,
        } => text::cmd_text(&config, &file, trace, normalized).await,
        Commands::Check => check::cmd_check(&config).await,
        Commands::Profile { output } => profile::cmd_profile(&config, output.as_deref()).await,
    }
}
