//! QUIC frame decoding.
//!
//! Frames are tagged unions keyed by `frame_type`. The tag must be the
//! first key of the object; once it is known every remaining key is
//! handed to the chosen variant's own field decoder.

use super::violations::Violations;
use crate::utils::error::ParseError;
use serde::de::{DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Serialize;
use std::fmt;

/// Key that selects the frame variant
pub const FRAME_TYPE_KEY: &str = "frame_type";

/// A decoded QUIC frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Frame {
    Crypto(CryptoFrame),
    ConnectionClose(ConnectionCloseFrame),
    NewConnectionId(NewConnectionIdFrame),
    RetireConnectionId(RetireConnectionIdFrame),
    /// Frame type this decoder does not model; dropped from packet frame lists
    Unrecognized(String),
}

impl Frame {
    fn for_type(frame_type: String) -> Self {
        match frame_type.as_str() {
            "crypto" => Frame::Crypto(CryptoFrame::default()),
            "connection_close" => Frame::ConnectionClose(ConnectionCloseFrame::default()),
            "new_connection_id" => Frame::NewConnectionId(NewConnectionIdFrame::default()),
            "retire_connection_id" => {
                Frame::RetireConnectionId(RetireConnectionIdFrame::default())
            }
            _ => Frame::Unrecognized(frame_type),
        }
    }

    /// Whether this is the discard marker
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, Frame::Unrecognized(_))
    }

    /// Route one key of the frame object to the variant's field decoder
    fn accept_field<'de, A>(&mut self, key: &str, map: &mut A) -> Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        match self {
            Frame::Crypto(f) => f.accept_field(key, map),
            Frame::ConnectionClose(f) => f.accept_field(key, map),
            Frame::NewConnectionId(f) => f.accept_field(key, map),
            Frame::RetireConnectionId(f) => f.accept_field(key, map),
            Frame::Unrecognized(_) => map.next_value::<IgnoredAny>().map(|_| ()),
        }
    }
}

/// CRYPTO frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CryptoFrame {
    pub offset: u64,
    pub length: u64,
}

impl CryptoFrame {
    fn accept_field<'de, A>(&mut self, key: &str, map: &mut A) -> Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        match key {
            "offset" => self.offset = map.next_value()?,
            "length" => self.length = map.next_value()?,
            _ => {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(())
    }
}

/// CONNECTION_CLOSE frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionCloseFrame {
    /// "transport" or "application"
    pub error_space: String,
    pub raw_error_code: u64,
    pub reason: String,
}

impl ConnectionCloseFrame {
    fn accept_field<'de, A>(&mut self, key: &str, map: &mut A) -> Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        match key {
            "error_space" => self.error_space = map.next_value()?,
            "raw_error_code" => self.raw_error_code = map.next_value()?,
            "reason" => self.reason = map.next_value()?,
            _ => {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(())
    }
}

/// NEW_CONNECTION_ID frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewConnectionIdFrame {
    pub sequence_number: u64,
    pub retire_prior_to: u64,
    pub stateless_reset_token: String,
    pub connection_id: String,
}

impl NewConnectionIdFrame {
    fn accept_field<'de, A>(&mut self, key: &str, map: &mut A) -> Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        match key {
            "sequence_number" => self.sequence_number = map.next_value()?,
            "retire_prior_to" => self.retire_prior_to = map.next_value()?,
            "stateless_reset_token" => self.stateless_reset_token = map.next_value()?,
            "connection_id" => self.connection_id = map.next_value()?,
            _ => {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(())
    }
}

/// RETIRE_CONNECTION_ID frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetireConnectionIdFrame {
    pub sequence_number: u64,
}

impl RetireConnectionIdFrame {
    fn accept_field<'de, A>(&mut self, key: &str, map: &mut A) -> Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        match key {
            "sequence_number" => self.sequence_number = map.next_value()?,
            _ => {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(())
    }
}

/// Decodes one frame object
pub(crate) struct FrameSeed<'a> {
    pub(crate) violations: &'a Violations,
}

impl<'de> DeserializeSeed<'de> for FrameSeed<'_> {
    type Value = Frame;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Frame, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for FrameSeed<'_> {
    type Value = Frame;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a frame object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Frame, A::Error> {
        let first: String = match map.next_key()? {
            Some(key) => key,
            // nothing to classify
            None => return Ok(Frame::Unrecognized(String::new())),
        };
        if first != FRAME_TYPE_KEY {
            return Err(self.violations.raise(ParseError::SchemaViolation(format!(
                "expected {} to be the first key of a frame, found {:?}",
                FRAME_TYPE_KEY, first
            ))));
        }

        let mut frame = Frame::for_type(map.next_value()?);
        while let Some(key) = map.next_key::<String>()? {
            frame.accept_field(&key, &mut map)?;
        }
        Ok(frame)
    }
}

/// Decodes a frame list, dropping unrecognized frames
pub(crate) struct FramesSeed<'a> {
    pub(crate) violations: &'a Violations,
}

impl<'de> DeserializeSeed<'de> for FramesSeed<'_> {
    type Value = Vec<Frame>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Vec<Frame>, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for FramesSeed<'_> {
    type Value = Vec<Frame>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of frames")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<Frame>, A::Error> {
        let mut frames = Vec::new();
        while let Some(frame) = seq.next_element_seed(FrameSeed {
            violations: self.violations,
        })? {
            if !frame.is_unrecognized() {
                frames.push(frame);
            }
        }
        Ok(frames)
    }
}

/// Decode a single frame from JSON text
///
/// Returns `Frame::Unrecognized` for frame types that are not modelled.
///
/// # Errors
/// * `ParseError::SchemaViolation` - a key precedes `frame_type`
/// * `ParseError::Json` - not an object, a field has the wrong type, or
///   input follows the object
pub fn decode_frame(json: &str) -> Result<Frame, ParseError> {
    let violations = Violations::new();
    let mut de = serde_json::Deserializer::from_str(json);
    let frame = FrameSeed {
        violations: &violations,
    }
    .deserialize(&mut de)
    .map_err(|e| violations.resolve(e))?;
    de.end().map_err(ParseError::from_json)?;
    Ok(frame)
}
