//! # ticketgraph CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show graph counters
//! - `learn` - Learn resolved tickets from a JSON file
//! - `insights` - Print ranked insights
//! - `visualize` - Lay out the graph
//! - `export` - Write a snapshot file
//! - `import` - Replace the graph from a snapshot file

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use ticketgraph_core::EngineError;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// ticketgraph - knowledge graph of resolved support tickets
///
/// Learns entities and relations extracted from tickets, mines the graph for
/// insights and lays it out for visualization.
#[derive(Parser, Debug)]
#[command(name = "ticketgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the snapshot database (overrides the configuration)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show graph counters
    Status,

    /// Learn tickets from a JSON file (one object or an array)
    Learn {
        /// Path to the input file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Print ranked insights
    Insights {
        /// Show at most this many insights
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Lay out the graph
    Visualize {
        /// Layout name (force, hierarchical, circular, grid)
        #[arg(short, long, default_value = "force")]
        layout: String,

        /// Write the JSON to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export graph as a snapshot file
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Replace the graph with a snapshot file
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), EngineError> {
    let options = GlobalOptions {
        config: cli.config,
        database: cli.database,
        json_mode: cli.json_mode,
    };

    match cli.command {
        Some(Commands::Server { host, port }) => cmd_server(&options, host, port).await,
        Some(Commands::Status) | None => cmd_status(&options),
        Some(Commands::Learn { file }) => cmd_learn(&options, &file).map(|_| ()),
        Some(Commands::Insights { limit }) => cmd_insights(&options, limit),
        Some(Commands::Visualize { layout, output }) => {
            cmd_visualize(&options, &layout, output.as_deref())
        }
        Some(Commands::Export { output }) => cmd_export(&options, &output),
        Some(Commands::Import { input }) => cmd_import(&options, &input),
    }
}

// =============================================================================
// TESTS
// =============================================================================
