//! CLI for Lens
//!
//! Commands:
//! - tail: live view of captured queries from a running gateway
//! - clear: delete every captured query
//! - seed: run a demo workload through the capture agent

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod client;
mod commands;
mod output;
mod retry;
mod tail;

#[derive(Parser)]
#[command(name = "lens")]
#[command(about = "Lens - SQL query capture and live tail", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow captured queries as they arrive
    Tail(commands::tail::TailArgs),

    /// Delete every captured query
    Clear(commands::clear::ClearArgs),

    /// Capture a demo workload into the configured store
    Seed(commands::seed::SeedArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result: Result<()> = match cli.command {
        Commands::Tail(args) => {
            init_tracing(args.verbose, "warn");
            commands::tail::run(args).await
        }
        Commands::Clear(args) => {
            init_tracing(args.verbose, "warn");
            commands::clear::run(args).await
        }
        Commands::Seed(args) => {
            init_tracing(args.verbose, "info");
            commands::seed::run(args).await
        }
    };

    if let Err(e) = result {
        output::error(format!("{:#}", e));
        std::process::exit(1);
    }
}

/// The tail view owns the terminal, so it logs at `warn` unless asked.
fn init_tracing(verbose: bool, default_level: &str) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
