//! Scan command implementation.
//!
//! The scan command:
//! 1. Optionally starts the diagnostics endpoint
//! 2. Walks the trace directory
//! 3. Decodes every eligible file under the worker limit
//! 4. Prints anomalous connection closes as they are found
//! 5. Logs a summary

use crate::diagnostics;
use crate::output::StdoutSink;
use crate::pipeline::{Role, RunStats, ScanOptions, ScanSummary, Scheduler};
use crate::utils::config::{EVENT_CHANNEL_CAPACITY, NUM_WORKERS};
use anyhow::{Context, Result};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Arguments for the scan command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanArgs {
    /// Directory holding qlog traces
    pub root: PathBuf,

    /// Only files whose name contains this role
    pub role: Option<Role>,

    /// Files decoded concurrently
    pub workers: usize,

    /// Per-file event channel capacity
    pub channel_capacity: usize,

    /// Address for the diagnostics endpoint (None = disabled)
    pub diagnostics: Option<String>,
}

impl Default for ScanArgs {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            role: None,
            workers: NUM_WORKERS,
            channel_capacity: EVENT_CHANNEL_CAPACITY,
            diagnostics: None,
        }
    }
}

impl ScanArgs {
    fn options(&self) -> ScanOptions {
        ScanOptions {
            role: self.role,
            workers: self.workers,
            channel_capacity: self.channel_capacity,
        }
    }
}

/// Execute the scan command
///
/// **Public** - main entry point called from main.rs
///
/// # Returns
/// Totals for the scan. Per-file failures are logged, not returned.
///
/// # Errors
/// * Invalid root directory
/// * Directory traversal failures
/// * Diagnostics address cannot be bound
pub async fn execute_scan(args: ScanArgs) -> Result<ScanSummary> {
    let start_time = Instant::now();
    let stats = Arc::new(RunStats::new());
    let cancel = CancellationToken::new();

    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing in-flight files");
                cancel.cancel();
            }
        }
    });

    let diagnostics_shutdown = cancel.child_token();
    let diagnostics_task = match &args.diagnostics {
        Some(addr) => {
            let listener = diagnostics::bind(addr)
                .await
                .with_context(|| format!("Failed to bind diagnostics endpoint on {}", addr))?;
            Some(tokio::spawn(diagnostics::serve(
                listener,
                Arc::clone(&stats),
                diagnostics_shutdown.clone(),
            )))
        }
        None => None,
    };

    let scheduler = Scheduler::new(args.options(), Arc::new(StdoutSink))
        .with_stats(stats)
        .with_cancellation(cancel.clone());
    let result = scheduler.run(&args.root).await;

    diagnostics_shutdown.cancel();
    interrupt.abort();
    if let Some(task) = diagnostics_task {
        match task.await {
            Ok(Err(e)) => warn!("Diagnostics endpoint failed: {}", e),
            Err(e) => warn!("Diagnostics task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }

    let summary = result.with_context(|| format!("Processing {} failed", args.root.display()))?;

    info!(
        "Scanned {} files ({} ok, {} failed, {} truncated): {} events, {} anomalies in {:.2}s",
        summary.files,
        summary.succeeded,
        summary.failed,
        summary.truncated,
        summary.events,
        summary.anomalies,
        start_time.elapsed().as_secs_f64()
    );

    Ok(summary)
}

/// Validate scan arguments
///
/// **Public** - can be called before execute_scan for early validation
pub fn validate_args(args: &ScanArgs) -> Result<()> {
    if args.root.as_os_str().is_empty() {
        anyhow::bail!("No qlog directory given");
    }

    if args.workers == 0 {
        anyhow::bail!("workers must be greater than 0");
    }

    if args.channel_capacity == 0 {
        anyhow::bail!("channel capacity must be greater than 0");
    }

    Ok(())
}
