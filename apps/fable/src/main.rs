//! # Fable - Story Pack Tool
//!
//! The main binary for the Fable story pack engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              apps/fable (THE BINARY)         │
//! │                                              │
//! │   ┌─────────────┐      ┌──────────────────┐  │
//! │   │   CLI       │      │  Job runner      │  │
//! │   │  (clap)     │      │  (tokio JoinSet) │  │
//! │   └──────┬──────┘      └────────┬─────────┘  │
//! │          └──────────┬───────────┘            │
//! │                     ▼                        │
//! │             ┌───────────────┐                │
//! │             │  fable-core   │                │
//! │             │  (THE LOGIC)  │                │
//! │             └───────────────┘                │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! fable compile forest.json castle.json -o build
//! fable decompile build/forest.zip -o src
//! fable validate forest.json --strict
//! fable simulate forest.json --steps ok,right,ok,home --seed 7
//! fable inspect build/forest.zip
//! fable snapshot forest.json -o forest.fabl
//! ```

use clap::Parser;
use fable::cli;
use fable::config::{FableConfig, LogFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // Config is read before logging exists; its error is reported once the
    // subscriber is installed.
    let loaded = FableConfig::load(cli.config.as_deref());
    let format = loaded
        .as_ref()
        .map(FableConfig::log_format)
        .unwrap_or_default();

    let default_filter = if cli.verbose {
        "fable=debug,fable_core=debug"
    } else if cli.quiet {
        "fable=warn,fable_core=warn"
    } else {
        "fable=info,fable_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = cli::execute(cli, config).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
