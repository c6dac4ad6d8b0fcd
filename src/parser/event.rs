//! qlog event decoding.
//!
//! Each event is a positional JSON array whose element meanings come from
//! the trace's `event_fields` list. The `data` element can only be
//! interpreted once the `event` element has named the event, so decoding
//! walks the schema with a small amount of state carried across positions.

use super::frame::{Frame, FramesSeed};
use super::header::Header;
use super::violations::{Reject, Violations};
use crate::utils::error::ParseError;
use chrono::{DateTime, Duration, Utc};
use serde::de::{DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// One decoded qlog event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Absolute time: trace reference time plus the relative offset
    pub time: DateTime<Utc>,
    pub category: String,
    pub name: String,
    pub details: EventDetails,
}

impl Event {
    /// Frames carried by packet_sent / packet_received events
    pub fn frames(&self) -> &[Frame] {
        match &self.details {
            EventDetails::PacketSent(p) | EventDetails::PacketReceived(p) => &p.frames,
            _ => &[],
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{Time: {}, Category: {}, Name: {}}}",
            self.time.to_rfc3339(),
            self.category,
            self.name
        )
    }
}

/// Event payload, selected by the event name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EventDetails {
    ConnectionStarted(ConnectionStarted),
    PacketSent(Packet),
    PacketReceived(Packet),
    PacketLost(PacketLost),
    MetricsUpdated(MetricsUpdated),
    /// Event kind without a typed payload (or no data field at all)
    Unrecognized,
}

/// connection_started payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionStarted {
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
}

impl ConnectionStarted {
    pub fn source(&self) -> Option<SocketAddr> {
        socket_addr(&self.src_ip, self.src_port)
    }

    pub fn destination(&self) -> Option<SocketAddr> {
        socket_addr(&self.dst_ip, self.dst_port)
    }
}

fn socket_addr(ip: &str, port: u16) -> Option<SocketAddr> {
    ip.parse::<IpAddr>().ok().map(|ip| SocketAddr::new(ip, port))
}

/// packet_sent / packet_received payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Packet {
    pub packet_type: String,
    pub header: Header,
    pub is_coalesced: bool,
    /// Recognized frames only, in wire order
    pub frames: Vec<Frame>,
    pub trigger: String,
}

/// packet_lost payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacketLost {
    pub packet_type: String,
    pub packet_number: i64,
    pub trigger: String,
}

/// metrics_updated payload. RTT values are in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsUpdated {
    pub pto_count: Option<u32>,
    pub latest_rtt: Option<f64>,
    pub smoothed_rtt: Option<f64>,
    pub min_rtt: Option<f64>,
    pub rtt_variance: Option<f64>,
    pub congestion_window: u64,
    pub bytes_in_flight: u64,
}

/// Decodes one positional event tuple against the trace schema
pub(crate) struct EventSeed<'a> {
    pub(crate) schema: &'a [String],
    pub(crate) reference_time: DateTime<Utc>,
    pub(crate) violations: &'a Violations,
}

impl<'de> DeserializeSeed<'de> for EventSeed<'_> {
    type Value = Event;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Event, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for EventSeed<'_> {
    type Value = Event;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an event tuple")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Event, A::Error> {
        let violations = self.violations;
        let mut time = self.reference_time;
        let mut category = String::new();
        let mut name: Option<String> = None;
        let mut details = EventDetails::Unrecognized;

        let mut exhausted = false;
        for field in self.schema {
            exhausted = match field.as_str() {
                "relative_time" => match seq.next_element::<f64>()? {
                    Some(micros) => {
                        time = offset(self.reference_time, micros).ok_or_else(|| {
                            violations.raise::<A::Error>(ParseError::SchemaViolation(format!(
                                "relative_time {} out of range",
                                micros
                            )))
                        })?;
                        false
                    }
                    None => true,
                },
                "category" => match seq.next_element::<String>()? {
                    Some(c) => {
                        category = c;
                        false
                    }
                    None => true,
                },
                "event" => match seq.next_element::<String>()? {
                    Some(n) => {
                        name = Some(n);
                        false
                    }
                    None => true,
                },
                "data" => match seq.next_element_seed(DetailsSeed {
                    name: name.as_deref(),
                    violations,
                })? {
                    Some(d) => {
                        details = d;
                        false
                    }
                    None => true,
                },
                other => seq
                    .next_element_seed(Reject {
                        violations,
                        error: ParseError::SchemaViolation(format!(
                            "unknown event field: {}",
                            other
                        )),
                    })?
                    .is_none(),
            };
            if exhausted {
                break;
            }
        }

        // the tuple may be shorter than the schema, never longer
        if !exhausted {
            seq.next_element_seed(Reject {
                violations,
                error: ParseError::SchemaViolation(format!(
                    "event has more than {} fields",
                    self.schema.len()
                )),
            })?;
        }

        Ok(Event {
            time,
            category,
            name: name.unwrap_or_default(),
            details,
        })
    }
}

/// Reference time plus an offset in (possibly fractional) microseconds
fn offset(reference: DateTime<Utc>, micros: f64) -> Option<DateTime<Utc>> {
    let nanos = rounded_i64(micros * 1_000.0)?;
    reference.checked_add_signed(Duration::nanoseconds(nanos))
}

/// Round to the nearest integer, `None` if that does not fit in an i64
pub(crate) fn rounded_i64(value: f64) -> Option<i64> {
    let value = value.round();
    // 2^63 is exact as f64; also rejects NaN
    if value >= -(2f64.powi(63)) && value < 2f64.powi(63) {
        Some(value as i64)
    } else {
        None
    }
}

/// Decodes the `data` element for an already-named event
struct DetailsSeed<'a> {
    name: Option<&'a str>,
    violations: &'a Violations,
}

impl<'de> DeserializeSeed<'de> for DetailsSeed<'_> {
    type Value = EventDetails;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<EventDetails, D::Error> {
        let name = match self.name {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(self.violations.raise(ParseError::SchemaViolation(
                    "found data before event name".to_string(),
                )))
            }
        };

        match name {
            "connection_started" => {
                ConnectionStarted::deserialize(deserializer).map(EventDetails::ConnectionStarted)
            }
            "packet_sent" => PacketSeed {
                violations: self.violations,
            }
            .deserialize(deserializer)
            .map(EventDetails::PacketSent),
            "packet_received" => PacketSeed {
                violations: self.violations,
            }
            .deserialize(deserializer)
            .map(EventDetails::PacketReceived),
            "packet_lost" => PacketLost::deserialize(deserializer).map(EventDetails::PacketLost),
            "metrics_updated" => {
                MetricsUpdated::deserialize(deserializer).map(EventDetails::MetricsUpdated)
            }
            _ => IgnoredAny::deserialize(deserializer).map(|_| EventDetails::Unrecognized),
        }
    }
}

/// Decodes a packet_sent / packet_received payload including its frames
struct PacketSeed<'a> {
    violations: &'a Violations,
}

impl<'de> DeserializeSeed<'de> for PacketSeed<'_> {
    type Value = Packet;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Packet, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for PacketSeed<'_> {
    type Value = Packet;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a packet event object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Packet, A::Error> {
        let mut packet = Packet::default();
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "frames" => {
                    packet.frames = map.next_value_seed(FramesSeed {
                        violations: self.violations,
                    })?
                }
                "header" => packet.header = map.next_value()?,
                "is_coalesced" => packet.is_coalesced = map.next_value()?,
                "packet_type" => packet.packet_type = map.next_value()?,
                "trigger" => packet.trigger = map.next_value()?,
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(packet)
    }
}

/// Decode a single event tuple from JSON text
///
/// # Arguments
/// * `json` - the positional event array
/// * `schema` - the trace's `event_fields`
/// * `reference_time` - the trace's reference time
///
/// # Errors
/// * `ParseError::SchemaViolation` - excess fields, unknown field name,
///   data before event name, a misordered frame, or a time out of range
/// * `ParseError::Json` - bad JSON or trailing input
pub fn decode_event(
    json: &str,
    schema: &[String],
    reference_time: DateTime<Utc>,
) -> Result<Event, ParseError> {
    let violations = Violations::new();
    let mut de = serde_json::Deserializer::from_str(json);
    let event = EventSeed {
        schema,
        reference_time,
        violations: &violations,
    }
    .deserialize(&mut de)
    .map_err(|e| violations.resolve(e))?;
    de.end().map_err(ParseError::from_json)?;
    Ok(event)
}
