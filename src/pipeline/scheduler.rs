//! Directory walk and bounded parallel dispatch of trace files.
//!
//! Every eligible file gets its own task, but a task is only spawned after
//! a worker permit is acquired, so at most `workers` files are ever being
//! decoded at once. The permit lives inside the task and is released when
//! the task ends, whichever way it ends.
//!
//! The walk itself runs on a blocking thread and streams eligible paths
//! to the dispatcher through a bounded channel.

use super::file::{process_file, FileReport};
use super::stats::RunStats;
use crate::output::ReportSink;
use crate::utils::config::{EVENT_CHANNEL_CAPACITY, NUM_WORKERS, TRACE_SUFFIXES};
use crate::utils::error::{ProcessError, ScanError};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

type FileOutcome = (PathBuf, Result<FileReport, ProcessError>);
type WalkItem = Result<PathBuf, ScanError>;

/// Which side of the connection to scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Server => "server",
        }
    }
}

/// Whether a file name selects it for scanning
pub fn is_trace_file(file_name: &str, role: Option<Role>) -> bool {
    if !TRACE_SUFFIXES.iter().any(|s| file_name.ends_with(s)) {
        return false;
    }
    match role {
        Some(role) => file_name.contains(role.as_str()),
        None => true,
    }
}

/// Tunables for one scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    pub role: Option<Role>,
    /// Files decoded concurrently
    pub workers: usize,
    /// Per-file event channel capacity
    pub channel_capacity: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            role: None,
            workers: NUM_WORKERS,
            channel_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

/// Totals for a finished scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Eligible files dispatched
    pub files: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Successful files whose input ended early
    pub truncated: u64,
    pub events: u64,
    pub anomalies: u64,
    /// The walk stopped early on request
    pub cancelled: bool,
}

/// Walks a directory tree and processes trace files in parallel
pub struct Scheduler {
    options: ScanOptions,
    reports: Arc<dyn ReportSink>,
    stats: Arc<RunStats>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(options: ScanOptions, reports: Arc<dyn ReportSink>) -> Self {
        Self {
            options,
            reports,
            stats: Arc::new(RunStats::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Share live counters (e.g. with the diagnostics endpoint)
    pub fn with_stats(mut self, stats: Arc<RunStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Stop dispatching new files once `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stats(&self) -> Arc<RunStats> {
        Arc::clone(&self.stats)
    }

    /// Process every eligible file under `root`
    ///
    /// Returns once all dispatched files have finished. Per-file failures
    /// are logged and counted, never returned.
    ///
    /// # Errors
    /// * `ScanError::InvalidRoot` - root is missing or not a directory
    /// * `ScanError::Traversal` - a directory could not be read; files
    ///   already dispatched are still waited for
    pub async fn run(&self, root: &Path) -> Result<ScanSummary, ScanError> {
        let meta = tokio::fs::metadata(root)
            .await
            .map_err(|e| ScanError::InvalidRoot {
                path: root.to_path_buf(),
                reason: e.to_string(),
            })?;
        if !meta.is_dir() {
            return Err(ScanError::InvalidRoot {
                path: root.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }

        info!(
            "Scanning {} with {} workers",
            root.display(),
            self.options.workers
        );

        let (paths_tx, mut paths) = mpsc::channel(self.options.workers.max(1));
        let walker = tokio::task::spawn_blocking({
            let root = root.to_path_buf();
            let role = self.options.role;
            let cancel = self.cancel.clone();
            move || walk_trace_files(&root, role, &paths_tx, &cancel)
        });

        let semaphore = Arc::new(Semaphore::new(self.options.workers));
        let mut tasks = JoinSet::new();
        let mut summary = ScanSummary::default();

        let walked = self
            .dispatch(&mut paths, &semaphore, &mut tasks, &mut summary)
            .await;
        // unblocks the walker if it is still producing
        drop(paths);

        if !tasks.is_empty() {
            debug!("Waiting for {} in-flight files", tasks.len());
        }
        while let Some(joined) = tasks.join_next().await {
            self.settle(joined, &mut summary);
        }
        if let Err(e) = walker.await {
            error!("Directory walk failed: {}", e);
        }

        if let ControlFlow::Break(()) = walked? {
            info!("Scan cancelled; in-flight files were completed");
            summary.cancelled = true;
        }
        Ok(summary)
    }

    /// Spawn one task per walked path, at most `workers` at a time
    async fn dispatch(
        &self,
        paths: &mut mpsc::Receiver<WalkItem>,
        semaphore: &Arc<Semaphore>,
        tasks: &mut JoinSet<FileOutcome>,
        summary: &mut ScanSummary,
    ) -> Result<ControlFlow<()>, ScanError> {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(ControlFlow::Break(())),
                next = paths.recv() => next,
            };
            let path = match next {
                Some(item) => item?,
                None => return Ok(ControlFlow::Continue(())),
            };

            // settle whatever already finished so results are logged promptly
            while let Some(joined) = tasks.try_join_next() {
                self.settle(joined, summary);
            }

            let acquired = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(ControlFlow::Break(())),
                permit = Arc::clone(semaphore).acquire_owned() => permit,
            };
            let Ok(permit) = acquired else {
                // semaphore closed; nothing more can be dispatched
                return Ok(ControlFlow::Break(()));
            };

            summary.files += 1;
            let reports = Arc::clone(&self.reports);
            let stats = Arc::clone(&self.stats);
            let capacity = self.options.channel_capacity;
            tasks.spawn(async move {
                let _permit = permit;
                let _in_flight = stats.enter();
                let result = process_file(&path, capacity, reports.as_ref()).await;
                match &result {
                    Ok(report) => stats.record_success(report.events, report.anomalies),
                    Err(_) => stats.record_failure(),
                }
                (path, result)
            });
        }
    }

    fn settle(&self, joined: Result<FileOutcome, JoinError>, summary: &mut ScanSummary) {
        match joined {
            Ok((_, Ok(report))) => {
                summary.succeeded += 1;
                summary.events += report.events;
                summary.anomalies += report.anomalies;
                if report.truncated() {
                    summary.truncated += 1;
                }
            }
            Ok((path, Err(e))) => {
                warn!("Parsing {} failed: {}", path.display(), e);
                summary.failed += 1;
            }
            Err(e) => {
                error!("File task failed: {}", e);
                self.stats.record_failure();
                summary.failed += 1;
            }
        }
    }
}

/// Depth-first, entries in lexical order, symlinked directories not
/// followed. Stops at the first unreadable entry, after sending its error.
fn walk_trace_files(
    root: &Path,
    role: Option<Role>,
    paths: &mpsc::Sender<WalkItem>,
    cancel: &CancellationToken,
) {
    let walker = WalkDir::new(root).follow_links(false).sort_by_file_name();
    for entry in walker {
        if cancel.is_cancelled() {
            return;
        }
        let item = match entry {
            Ok(entry) => {
                if entry.file_type().is_dir()
                    || !is_trace_file(&entry.file_name().to_string_lossy(), role)
                {
                    continue;
                }
                Ok(entry.into_path())
            }
            Err(e) => Err(ScanError::Traversal {
                path: e.path().unwrap_or(root).to_path_buf(),
                source: e.into(),
            }),
        };
        let fatal = item.is_err();
        if paths.blocking_send(item).is_err() || fatal {
            return;
        }
    }
}
