//! # Topica CLI Module
//!
//! This module implements the CLI interface for Topica.
//!
//! ## Available Commands
//!
//! - `ingest` - Build one topic map from one or more event streams
//! - `merge` - Build one topic map per stream and merge them into the first
//! - `check` - Validate a single event stream

mod commands;

use crate::config::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use topica_core::TopicMapError;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Topica - topic map construction and merging
///
/// Reads construct-boundary event streams (JSON arrays of events) and builds
/// one merged, deduplicated topic map from them.
#[derive(Parser, Debug)]
#[command(name = "topica")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest event streams into one topic map
    Ingest {
        /// Event stream file (repeat for several streams, ingested in order)
        #[arg(short, long = "file", required = true)]
        files: Vec<PathBuf>,

        /// Print the resulting topic map snapshot
        #[arg(long)]
        dump: bool,
    },

    /// Build a topic map per stream and merge them into the first
    Merge {
        /// Event stream files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print the resulting topic map snapshot
        #[arg(long)]
        dump: bool,
    },

    /// Validate an event stream without keeping the result
    Check {
        /// Event stream file
        #[arg(short, long)]
        file: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), TopicMapError> {
    let config = Config::load(cli.config.as_deref())?;
    let json_mode = cli.json_mode;

    if cli.verbose {
        tracing::info!(
            max_depth = config.ingest.max_depth,
            max_file_size = config.limits.max_file_size,
            "configuration loaded"
        );
    }

    match cli.command {
        Commands::Ingest { files, dump } => cmd_ingest(&files, &config, json_mode, dump),
        Commands::Merge { files, dump } => cmd_merge(&files, &config, json_mode, dump),
        Commands::Check { file } => cmd_check(&file, &config, json_mode),
    }
}
