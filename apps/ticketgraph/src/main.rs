//! # ticketgraph
//!
//! The binary hosting the ticket knowledge graph engine.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for graph operations
//! - Snapshot persistence in a redb database
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │              apps/ticketgraph (THE BINARY)        │
//! │                                                   │
//! │   ┌─────────────┐          ┌─────────────┐        │
//! │   │    CLI      │          │  HTTP API   │        │
//! │   │   (clap)    │          │   (axum)    │        │
//! │   └──────┬──────┘          └──────┬──────┘        │
//! │          └──────────────┬─────────┘               │
//! │                         ▼                         │
//! │               ┌───────────────────┐               │
//! │               │ ticketgraph-core  │               │
//! │               │   (THE LOGIC)     │               │
//! │               └───────────────────┘               │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! ticketgraph server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! ticketgraph status
//! ticketgraph learn -f tickets.json
//! ticketgraph visualize --layout circular -o layout.json
//! ```

use clap::Parser;
use ticketgraph::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // TICKETGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let log_format =
        std::env::var("TICKETGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ticketgraph=info,ticketgraph_core=info,tower_http=debug".into());

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

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
  ticketgraph v{}

  resolved tickets in, insights out
"#,
        env!("CARGO_PKG_VERSION")
    );
}
