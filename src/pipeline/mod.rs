//! Concurrent file processing.
//!
//! This module handles:
//! - Classifying connection closes against the benign table
//! - Streaming one file through decoder and anomaly filter
//! - Walking a directory and bounding how many files run at once

pub mod anomaly;
pub mod file;
pub mod scheduler;
pub mod stats;

// Re-export main types
pub use anomaly::{anomalous_closes, is_benign, BENIGN_CLOSES};
pub use file::{open_trace_reader, process_file, FileReport};
pub use scheduler::{is_trace_file, Role, ScanOptions, ScanSummary, Scheduler};
pub use stats::{InFlightGuard, RunStats, StatsSnapshot};
