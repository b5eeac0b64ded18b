//! testrelay CLI - Main Entry Point
//!
//! Finishes deliveries handed off by reporters whose host process exits
//! early, and inspects queue snapshots.

use clap::{Parser, Subcommand};

use testrelay_cli::commands::{flush, inspect};
use testrelay_cli::output;

/// testrelay CLI - test event delivery
#[derive(Parser)]
#[command(name = "testrelay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deliver the events in a queue snapshot
    Flush(flush::FlushArgs),

    /// Show the events in a queue snapshot
    Inspect(inspect::InspectArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is reserved for command output
    let log_level = if cli.debug { "debug" } else { "info" };
    let filter = if cli.debug {
        tracing_subscriber::EnvFilter::new(log_level)
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Flush(args) => flush::execute(args, cli.format).await?,
        Commands::Inspect(args) => inspect::execute(args, cli.format)?,
        Commands::Version => {
            println!("testrelay CLI v{}", testrelay_common::VERSION);
        }
    }

    Ok(())
}
