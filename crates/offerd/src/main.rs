//! offerd - internet offer comparison aggregator
//!
//! # Usage
//!
//! ```bash
//! # Run the server (default)
//! offerd
//! offerd serve
//!
//! # Verbose logging
//! offerd --log-level debug
//! DEBUG=true offerd
//! ```

mod cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// offerd - internet offer comparison aggregator
#[derive(Parser, Debug)]
#[command(name = "offerd")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the aggregation server
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // DEBUG=true raises the default level; an explicit --log-level wins
    let level = cli.log_level.unwrap_or_else(|| {
        if std::env::var("DEBUG").ok().as_deref() == Some("true") {
            "debug".to_string()
        } else {
            "info".to_string()
        }
    });
    init_logging(&level)?;

    match cli.command {
        Some(Command::Serve) | None => cmd::serve::run().await,
    }
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}
