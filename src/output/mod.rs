//! Output of scan results.
//!
//! Anomalies are printed one self-contained line at a time; sinks decide
//! where those lines end up.

pub mod report;

// Re-export main types
pub use report::{Anomaly, CollectingSink, ReportSink, StdoutSink};
