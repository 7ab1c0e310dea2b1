//! # Topica - Topic Map Merger
//!
//! The main binary for the Topica topic map engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │            apps/topica (THE BINARY)           │
//! │                                               │
//! │   ┌─────────────┐        ┌──────────────┐     │
//! │   │    CLI      │        │    Config    │     │
//! │   │   (clap)    │        │    (toml)    │     │
//! │   └──────┬──────┘        └──────┬───────┘     │
//! │          └───────────┬──────────┘             │
//! │                      ▼                        │
//! │              ┌───────────────┐                │
//! │              │  topica-core  │                │
//! │              │ (THE ENGINE)  │                │
//! │              └───────────────┘                │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! topica ingest -f people.json -f places.json --dump
//! topica merge left.json right.json --json-mode
//! topica check -f stream.json
//! ```

use clap::Parser;
use topica::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // TOPICA_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("TOPICA_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "topica=info,topica_core=info".into());

    // Logs go to stderr so stdout stays parseable in --json-mode.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Topica startup banner.
fn print_banner() {
    println!(
        r#"
  Topica v{}
  One topic per subject, one statement per fact
"#,
        env!("CARGO_PKG_VERSION")
    );
}
