//! qlog inspector CLI
//!
//! Walks a directory of qlog traces and prints every anomalous
//! connection close it finds.

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use std::path::PathBuf;

use qlog_inspector::commands::{execute_scan, validate_args, ScanArgs};
use qlog_inspector::pipeline::Role;
use qlog_inspector::utils::config::{
    DEFAULT_DIAGNOSTICS_ADDR, DIAGNOSTICS_ENV, EVENT_CHANNEL_CAPACITY, NUM_WORKERS,
};

/// qlog inspector - find anomalous QUIC connection closes
#[derive(Parser, Debug)]
#[command(name = "qlog-inspector")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory holding qlog traces
    root: PathBuf,

    /// Only scan traces recorded by this side of the connection
    #[arg(long, value_enum)]
    role: Option<Role>,

    /// Number of files decoded concurrently
    #[arg(long, default_value_t = NUM_WORKERS)]
    workers: usize,

    /// Events buffered between decoder and consumer per file
    #[arg(long, default_value_t = EVENT_CHANNEL_CAPACITY)]
    channel_capacity: usize,

    /// Serve health and live stats over HTTP (`--diagnostics` or `--diagnostics=ADDR`)
    #[arg(
        long,
        env = DIAGNOSTICS_ENV,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = DEFAULT_DIAGNOSTICS_ADDR,
        value_name = "ADDR"
    )]
    diagnostics: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let args = ScanArgs {
        root: cli.root,
        role: cli.role,
        workers: cli.workers,
        channel_capacity: cli.channel_capacity,
        diagnostics: cli.diagnostics,
    };

    // Validate args first
    validate_args(&args)?;

    execute_scan(args).await?;

    Ok(())
}
