//! pagesync CLI
//!
//! Command-line tools for inspecting and exercising pagesync.
//!
//! # Commands
//!
//! - `decode` - Decode a captured frame
//! - `simulate` - Run a randomized authority/replica session in process

mod commands;

use clap::{Parser, Subcommand};
use commands::simulate::SimulateOptions;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// pagesync command-line tools.
#[derive(Parser)]
#[command(name = "pagesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a frame file (type code byte followed by a CBOR body)
    Decode {
        /// Path to the raw frame
        file: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run a randomized sync session and check that replicas converge
    Simulate {
        /// Number of distinct pages mutated
        #[arg(long, default_value = "8")]
        pages: u64,

        /// Number of distinct item indices per page
        #[arg(long, default_value = "16")]
        items: u32,

        /// Number of mutation rounds
        #[arg(long, default_value = "50")]
        rounds: usize,

        /// Number of replicas
        #[arg(long, default_value = "2")]
        replicas: usize,

        /// Seed for the random generator
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Probability that a replica loses the pushes of a round
        #[arg(long, default_value = "0.0")]
        push_loss: f64,

        /// Coalesce pushes and flush once per round
        #[arg(long)]
        batched: bool,

        /// Largest index list per data-diff request
        #[arg(long, default_value = "64")]
        max_request: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Decode { file, format } => {
            commands::decode::run(&file, &format)?;
        }
        Commands::Simulate {
            pages,
            items,
            rounds,
            replicas,
            seed,
            push_loss,
            batched,
            max_request,
            format,
        } => {
            let options = SimulateOptions {
                pages,
                items,
                rounds,
                replicas,
                seed,
                push_loss,
                batched,
                max_request,
            };
            commands::simulate::run(&options, &format)?;
        }
        Commands::Version => {
            println!("pagesync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
