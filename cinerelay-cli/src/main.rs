//! Cinerelay CLI - Command-line interface
//!
//! Runs the gateway server or performs a one-off source resolution.

mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use cinerelay_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "cinerelay")]
#[command(about = "Range-aware streaming gateway for an upstream movie catalog")]
#[command(version)]
struct Cli {
    /// Console log level
    #[arg(long, global = true, value_enum, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    /// Directory for the per-run debug log
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())
        .context("failed to initialize logging")?;

    commands::run_command(cli.command).await
}
