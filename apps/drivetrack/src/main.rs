//! # drivetrack
//!
//! The main binary for drivetrack, the academic project drive tracker.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for drive, group and mentor operations
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │             apps/drivetrack (THE BINARY)             │
//! │                                                      │
//! │   ┌─────────────┐   ┌─────────────┐   ┌──────────┐   │
//! │   │    CLI      │   │  HTTP API   │   │  config  │   │
//! │   │   (clap)    │   │   (axum)    │   │  (toml)  │   │
//! │   └──────┬──────┘   └──────┬──────┘   └────┬─────┘   │
//! │          └─────────────────┼───────────────┘         │
//! │                            ▼                         │
//! │                  ┌──────────────────┐                │
//! │                  │ drivetrack-core  │                │
//! │                  │   (THE LOGIC)    │                │
//! │                  └──────────────────┘                │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! drivetrack server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! drivetrack seed -i drive.json
//! drivetrack allot -d fyp-2026
//! drivetrack progress -d fyp-2026 --force
//! ```

use clap::Parser;
use drivetrack::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // DRIVETRACK_LOG_FORMAT=json enables machine-parseable output.
    let log_format =
        std::env::var("DRIVETRACK_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "drivetrack=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_banner() {
    println!(
        r#"
  ┌┬┐┬─┐┬┬  ┬┌─┐┌┬┐┬─┐┌─┐┌─┐┬┌─
   ││├┬┘│└┐┌┘├┤  │ ├┬┘├─┤│  ├┴┐
  ─┴┘┴└─┴ └┘ └─┘ ┴ ┴└─┴ ┴└─┘┴ ┴

  Project drive tracker v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
