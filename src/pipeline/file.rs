//! Processing of a single trace file.
//!
//! The decoder runs on a blocking thread and feeds a bounded channel; the
//! calling task drains that channel and checks every packet event for
//! anomalous connection closes as it arrives.

use super::anomaly::anomalous_closes;
use crate::output::{Anomaly, ReportSink};
use crate::parser::{Event, TraceDecoder, TraceSummary};
use crate::utils::config::{COMPRESSED_SUFFIX, READ_BUFFER_SIZE};
use crate::utils::error::{ParseError, ProcessError};
use flate2::read::GzDecoder;
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Outcome of one successfully processed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    /// None when the input ended before the document closed
    pub trace: Option<TraceSummary>,
    /// Events received by the consumer
    pub events: u64,
    pub anomalies: u64,
}

impl FileReport {
    /// Input stopped early; counted as success
    pub fn truncated(&self) -> bool {
        self.trace.is_none()
    }
}

/// Open a trace file, gunzipping it when the name ends in `.gz`
///
/// # Errors
/// * `ProcessError::Open` - the file cannot be opened
/// * `ProcessError::Decompress` - the gzip header or first block is unreadable;
///   an empty `.gz` file is not an error and reads as empty input
pub fn open_trace_reader(path: &Path) -> Result<Box<dyn BufRead + Send>, ProcessError> {
    let file = File::open(path).map_err(|source| ProcessError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
    if !name.ends_with(COMPRESSED_SUFFIX) {
        return Ok(Box::new(reader));
    }

    let empty = reader
        .fill_buf()
        .map_err(|source| ProcessError::Open {
            path: path.to_path_buf(),
            source,
        })?
        .is_empty();
    if empty {
        // no gzip header at all reads as a stream that ended immediately
        return Ok(Box::new(reader));
    }

    let mut decoder = BufReader::with_capacity(READ_BUFFER_SIZE, GzDecoder::new(reader));
    // gzip headers are parsed lazily; force it so a bad archive fails here
    decoder.fill_buf().map_err(|source| ProcessError::Decompress {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Box::new(decoder))
}

/// Decode one trace file and report its anomalous connection closes
///
/// Reports are handed to `reports` while decoding is still running. A
/// file that simply ends early is not an error.
///
/// # Arguments
/// * `path` - trace file (`.qlog` or `.qlog.gz`)
/// * `channel_capacity` - events buffered between decoder and consumer
/// * `reports` - destination for anomaly lines
pub async fn process_file(
    path: &Path,
    channel_capacity: usize,
    reports: &dyn ReportSink,
) -> Result<FileReport, ProcessError> {
    debug!("Processing {}", path.display());

    let (tx, mut rx) = mpsc::channel::<Event>(channel_capacity);
    let decode_path = path.to_path_buf();
    // tx moves into the decoder; dropping it when decoding stops closes the channel
    let decode = tokio::task::spawn_blocking(move || -> Result<TraceSummary, ProcessError> {
        let reader = open_trace_reader(&decode_path)?;
        Ok(TraceDecoder::new(tx).decode(reader)?)
    });

    let mut events = 0;
    let mut anomalies = 0;
    while let Some(event) = rx.recv().await {
        events += 1;
        for frame in anomalous_closes(&event) {
            reports.report(&Anomaly {
                path: path.to_path_buf(),
                frame: frame.clone(),
            });
            anomalies += 1;
        }
    }

    let trace = match decode.await {
        Ok(Ok(summary)) => Some(summary),
        Ok(Err(ProcessError::Parse(ParseError::EndOfStream))) => {
            debug!("{} ended before the document was complete", path.display());
            None
        }
        Ok(Err(e)) => return Err(e),
        Err(e) => return Err(ProcessError::Task(e.to_string())),
    };

    debug!(
        "Finished {}: {} events, {} anomalies",
        path.display(),
        events,
        anomalies
    );

    Ok(FileReport {
        path: path.to_path_buf(),
        trace,
        events,
        anomalies,
    })
}
