//! # Fable CLI Module
//!
//! This module implements the CLI interface for Fable.
//!
//! ## Available Commands
//!
//! - `compile` - Compile pack documents into archives
//! - `decompile` - Turn archives back into pack documents
//! - `validate` - List composition issues per node
//! - `simulate` - Drive the playback simulator with key presses
//! - `inspect` - Summarize an archive
//! - `snapshot` - Write the binary snapshot of a pack

mod commands;

use crate::config::FableConfig;
use clap::{Parser, Subcommand, ValueEnum};
use fable_core::FableError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Fable - story pack authoring tool
///
/// Compiles branching image/audio story graphs into portable archives and
/// plays them back the way the device would.
#[derive(Parser, Debug)]
#[command(name = "fable")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a TOML config file
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
    /// Compile pack documents or snapshots into archives
    Compile {
        /// Input packs (JSON document or binary snapshot)
        #[arg(required = true)]
        packs: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decompile archives into JSON pack documents
    Decompile {
        /// Input archives
        #[arg(required = true)]
        archives: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report composition issues
    Validate {
        /// Pack document, snapshot or archive
        pack: PathBuf,

        /// Exit with an error if any issue is an error
        #[arg(long)]
        strict: bool,
    },

    /// Play a pack with a sequence of key presses
    Simulate {
        /// Pack document, snapshot or archive
        pack: PathBuf,

        /// Comma-separated keys (ok, home, left, right, start)
        #[arg(short, long, value_delimiter = ',', default_value = "ok")]
        steps: Vec<Key>,

        /// Seed for random option picks
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the manifest summary and asset list of an archive
    Inspect {
        /// Archive file
        archive: PathBuf,
    },

    /// Write the binary snapshot of a pack
    Snapshot {
        /// Pack document, snapshot or archive
        pack: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Device keys understood by `simulate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Key {
    Ok,
    Home,
    Left,
    Right,
    Start,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli, config: FableConfig) -> Result<(), FableError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Compile { packs, output } => {
            let out_dir = config.output_dir(output);
            cmd_compile(packs, out_dir, &config, json_mode).await
        }
        Commands::Decompile { archives, output } => {
            let out_dir = config.output_dir(output);
            cmd_decompile(archives, out_dir, &config, json_mode).await
        }
        Commands::Validate { pack, strict } => cmd_validate(&pack, &config, json_mode, strict),
        Commands::Simulate { pack, steps, seed } => {
            cmd_simulate(&pack, &config, json_mode, &steps, seed)
        }
        Commands::Inspect { archive } => cmd_inspect(&archive, json_mode),
        Commands::Snapshot { pack, output } => cmd_snapshot(&pack, &config, &output),
    }
}
