//! Sonora CLI - Command-line interface
//!
//! Runs the streaming server and inspects the track catalog.

mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use sonora_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "sonora")]
#[command(about = "A byte-range audio streaming server")]
struct Cli {
    /// Console log level
    #[arg(long, global = true, value_enum, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    /// Directory for the full debug log of the last run
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_level.into(), cli.logs_dir.as_deref())
        .context("failed to initialize logging")?;

    commands::handle_command(cli.command).await
}
