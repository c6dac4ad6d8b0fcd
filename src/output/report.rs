//! Anomaly report lines.
//!
//! Reports from different files interleave freely, so every line carries
//! its own file path and is written with a single locked write.

use crate::parser::ConnectionCloseFrame;
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// One anomalous connection close found in a trace file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anomaly {
    pub path: PathBuf,
    pub frame: ConnectionCloseFrame,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.path.display(), self.frame)
    }
}

/// Where anomaly reports go. Shared by all concurrently processed files.
pub trait ReportSink: Send + Sync {
    fn report(&self, anomaly: &Anomaly);
}

/// Writes each report as one line on stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl ReportSink for StdoutSink {
    fn report(&self, anomaly: &Anomaly) {
        let line = format!("{}\n", anomaly);
        let mut out = std::io::stdout().lock();
        // stdout going away (e.g. closed pipe) must not fail the scan
        let _ = out.write_all(line.as_bytes()).and_then(|_| out.flush());
    }
}

/// Keeps reports in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<Anomaly>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports collected so far
    pub fn reports(&self) -> Vec<Anomaly> {
        self.reports
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl ReportSink for CollectingSink {
    fn report(&self, anomaly: &Anomaly) {
        let mut reports = self
            .reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        reports.push(anomaly.clone());
    }
}
