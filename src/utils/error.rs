//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while decoding a qlog document
#[derive(Error, Debug)]
pub enum ParseError {
    /// Event tuple or frame object breaks the positional/ordering rules
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// Top level does not hold exactly one trace
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    /// Input ended before the top-level object was complete
    #[error("unexpected end of stream")]
    EndOfStream,

    #[error("invalid JSON: {0}")]
    Json(serde_json::Error),

    #[error("event receiver closed")]
    ReceiverClosed,
}

impl ParseError {
    /// Classify a raw serde_json failure
    pub fn from_json(err: serde_json::Error) -> Self {
        use serde_json::error::Category;

        match err.classify() {
            Category::Eof => ParseError::EndOfStream,
            Category::Io => ParseError::Io(err.into()),
            Category::Syntax | Category::Data => ParseError::Json(err),
        }
    }

    /// True when the input simply stopped; callers treat this as completion
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, ParseError::EndOfStream)
    }
}

/// Errors scoped to processing a single trace file
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot decompress {}: {source}", path.display())]
    Decompress {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("decode task failed: {0}")]
    Task(String),
}

/// Errors that abort a whole directory scan
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("invalid root directory {}: {reason}", path.display())]
    InvalidRoot { path: PathBuf, reason: String },

    #[error("walking {} failed: {source}", path.display())]
    Traversal {
        path: PathBuf,
        source: std::io::Error,
    },
}
