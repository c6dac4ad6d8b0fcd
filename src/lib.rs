//! qlog inspector
//!
//! Scans directories of qlog traces recorded by QUIC endpoints and reports
//! connection closes whose error code is not on the benign list.
//!
//! This crate provides the core implementation for the
//! `qlog-inspector` CLI tool: a streaming qlog decoder, a per-file
//! pipeline and a bounded parallel directory scheduler.
//!
//! ## Getting Started
//!
//! ```bash
//! qlog-inspector /var/log/qlog --role server
//! ```
//!
//! ## Library use
//!
//! ```no_run
//! use qlog_inspector::parser::TraceDecoder;
//!
//! let mut decoder = TraceDecoder::new(Vec::new());
//! let summary = decoder.decode(std::io::stdin().lock())?;
//! println!("{} events", summary.event_count);
//! # Ok::<(), qlog_inspector::utils::ParseError>(())
//! ```

pub mod commands;
pub mod diagnostics;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod utils;
