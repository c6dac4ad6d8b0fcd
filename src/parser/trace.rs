//! Streaming qlog document decoder.
//!
//! Decodes `{"traces": [ { ... "events": [...] } ]}` in a single forward
//! pass. Events are handed to an `EventSink` as soon as each tuple is
//! complete, so the event list is never held in memory.

use super::event::{rounded_i64, Event, EventSeed};
use super::violations::{Reject, Violations};
use crate::utils::error::ParseError;
use chrono::{DateTime, Utc};
use log::debug;
use serde::de::{DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use std::io::Read;
use tokio::sync::mpsc;

/// Destination for decoded events
pub trait EventSink {
    /// Accept one event; an error aborts the decode
    fn emit(&mut self, event: Event) -> Result<(), ParseError>;
}

/// Bounded channel sender. Blocks while the channel is full, so it must
/// be driven from a blocking thread, never from inside an async task.
impl EventSink for mpsc::Sender<Event> {
    fn emit(&mut self, event: Event) -> Result<(), ParseError> {
        self.blocking_send(event).map_err(|_| ParseError::ReceiverClosed)
    }
}

impl EventSink for Vec<Event> {
    fn emit(&mut self, event: Event) -> Result<(), ParseError> {
        self.push(event);
        Ok(())
    }
}

/// What the decoder learned about the one trace in a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceSummary {
    /// `vantage_point.type`, e.g. "client" or "server"
    pub vantage_point: String,
    /// Original destination connection ID from `common_fields`
    pub odcid: Option<String>,
    pub reference_time: DateTime<Utc>,
    /// Events handed to the sink
    pub event_count: u64,
}

/// Decodes one qlog document into an event sink
pub struct TraceDecoder<S> {
    sink: S,
}

impl<S: EventSink> TraceDecoder<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Decode a whole document from `reader`
    ///
    /// # Errors
    /// * `ParseError::MalformedDocument` - not exactly one trace
    /// * `ParseError::SchemaViolation` - an event or frame breaks ordering rules
    /// * `ParseError::EndOfStream` - input ended before the document closed
    /// * `ParseError::Io` - the reader failed
    /// * `ParseError::ReceiverClosed` - the sink stopped accepting events
    pub fn decode<R: Read>(&mut self, reader: R) -> Result<TraceSummary, ParseError> {
        let violations = Violations::new();
        let mut de = serde_json::Deserializer::from_reader(reader);

        let summary = DocumentSeed {
            sink: &mut self.sink,
            violations: &violations,
        }
        .deserialize(&mut de)
        .map_err(|e| violations.resolve(e))?;

        debug!(
            "Decoded {} trace with {} events",
            summary.vantage_point, summary.event_count
        );
        Ok(summary)
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

#[derive(Deserialize)]
struct VantagePoint {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CommonFields {
    #[serde(rename = "ODCID")]
    odcid: Option<String>,
    /// Microseconds since the Unix epoch
    reference_time: Option<f64>,
}

struct DocumentSeed<'a, S> {
    sink: &'a mut S,
    violations: &'a Violations,
}

impl<'de, S: EventSink> DeserializeSeed<'de> for DocumentSeed<'_, S> {
    type Value = TraceSummary;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<TraceSummary, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, S: EventSink> Visitor<'de> for DocumentSeed<'_, S> {
    type Value = TraceSummary;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a qlog document object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<TraceSummary, A::Error> {
        let violations = self.violations;
        let sink = self.sink;
        let mut summary = None;

        while let Some(key) = map.next_key::<String>()? {
            if key != "traces" {
                map.next_value::<IgnoredAny>()?;
                continue;
            }
            if summary.is_some() {
                return Err(violations.raise(ParseError::MalformedDocument(
                    "duplicate traces key".to_string(),
                )));
            }
            summary = Some(map.next_value_seed(TracesSeed {
                sink: &mut *sink,
                violations,
            })?);
        }

        summary.ok_or_else(|| {
            violations.raise(ParseError::MalformedDocument(
                "document has no traces".to_string(),
            ))
        })
    }
}

struct TracesSeed<'a, S> {
    sink: &'a mut S,
    violations: &'a Violations,
}

impl<'de, S: EventSink> DeserializeSeed<'de> for TracesSeed<'_, S> {
    type Value = TraceSummary;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<TraceSummary, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, S: EventSink> Visitor<'de> for TracesSeed<'_, S> {
    type Value = TraceSummary;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array holding one trace")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<TraceSummary, A::Error> {
        let violations = self.violations;

        let summary = seq
            .next_element_seed(TraceSeed {
                sink: self.sink,
                violations,
            })?
            .ok_or_else(|| {
                violations.raise::<A::Error>(ParseError::MalformedDocument(
                    "expected one trace, got 0".to_string(),
                ))
            })?;

        seq.next_element_seed(Reject {
            violations,
            error: ParseError::MalformedDocument("expected one trace, got more".to_string()),
        })?;

        Ok(summary)
    }
}

struct TraceSeed<'a, S> {
    sink: &'a mut S,
    violations: &'a Violations,
}

impl<'de, S: EventSink> DeserializeSeed<'de> for TraceSeed<'_, S> {
    type Value = TraceSummary;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<TraceSummary, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, S: EventSink> Visitor<'de> for TraceSeed<'_, S> {
    type Value = TraceSummary;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a trace object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<TraceSummary, A::Error> {
        let violations = self.violations;
        let sink = self.sink;

        let mut vantage_point = String::new();
        let mut odcid = None;
        let mut reference_time = DateTime::<Utc>::default();
        let mut schema: Vec<String> = Vec::new();
        let mut event_count = 0;

        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "vantage_point" => vantage_point = map.next_value::<VantagePoint>()?.kind,
                "event_fields" => schema = map.next_value()?,
                "common_fields" => {
                    let common: CommonFields = map.next_value()?;
                    odcid = common.odcid;
                    if let Some(micros) = common.reference_time {
                        reference_time = rounded_i64(micros)
                            .and_then(DateTime::from_timestamp_micros)
                            .ok_or_else(|| {
                                violations.raise::<A::Error>(ParseError::SchemaViolation(
                                    format!("reference_time {} out of range", micros),
                                ))
                            })?;
                    }
                }
                "events" => {
                    event_count += map.next_value_seed(EventsSeed {
                        schema: &schema,
                        reference_time,
                        sink: &mut *sink,
                        violations,
                    })?
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        Ok(TraceSummary {
            vantage_point,
            odcid,
            reference_time,
            event_count,
        })
    }
}

/// Decodes the event array, emitting each event as it completes
struct EventsSeed<'a, S> {
    schema: &'a [String],
    reference_time: DateTime<Utc>,
    sink: &'a mut S,
    violations: &'a Violations,
}

impl<'de, S: EventSink> DeserializeSeed<'de> for EventsSeed<'_, S> {
    type Value = u64;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<u64, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, S: EventSink> Visitor<'de> for EventsSeed<'_, S> {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of event tuples")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<u64, A::Error> {
        let violations = self.violations;
        let sink = self.sink;
        let mut count = 0;

        while let Some(event) = seq.next_element_seed(EventSeed {
            schema: self.schema,
            reference_time: self.reference_time,
            violations,
        })? {
            sink.emit(event).map_err(|e| violations.raise::<A::Error>(e))?;
            count += 1;
        }
        Ok(count)
    }
}
