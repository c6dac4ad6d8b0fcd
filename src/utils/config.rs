//! Configuration and constants for the scanner.

/// Files decoded concurrently by default
pub const NUM_WORKERS: usize = 128;

/// Events buffered between a file's decoder and its consumer
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// File name endings that mark a qlog trace
pub const TRACE_SUFFIXES: &[&str] = &[".qlog", ".qlog.gz"];

/// Files ending in this are gunzipped before decoding
pub const COMPRESSED_SUFFIX: &str = ".gz";

/// Buffer size for file and decompressor readers
pub const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Address used when `--diagnostics` is given without a value
pub const DEFAULT_DIAGNOSTICS_ADDR: &str = "localhost:6060";

/// Environment variable enabling the diagnostics endpoint
pub const DIAGNOSTICS_ENV: &str = "QLOG_INSPECTOR_DIAGNOSTICS";
