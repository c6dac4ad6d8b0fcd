//! Carries typed decode failures out of serde visitors.
//!
//! serde only lets a visitor fail with a message string. Ordering
//! violations are parked here first so the decoder can hand callers the
//! typed `ParseError` instead of the flattened serde message.

use crate::utils::error::ParseError;
use serde::de::{self, DeserializeSeed, Deserializer};
use std::cell::Cell;

#[derive(Default)]
pub(crate) struct Violations {
    pending: Cell<Option<ParseError>>,
}

impl Violations {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record `err` and return a serde error carrying its message
    pub(crate) fn raise<E: de::Error>(&self, err: ParseError) -> E {
        let serde_err = E::custom(&err);
        self.pending.set(Some(err));
        serde_err
    }

    /// Turn a failed deserialization back into the error that caused it
    pub(crate) fn resolve(&self, err: serde_json::Error) -> ParseError {
        self.pending
            .take()
            .unwrap_or_else(|| ParseError::from_json(err))
    }
}

/// Seed that fails as soon as a value is present
///
/// Used for sequence positions that must not exist, so the offending
/// element is rejected before any of it is decoded.
pub(crate) struct Reject<'a> {
    pub(crate) violations: &'a Violations,
    pub(crate) error: ParseError,
}

impl<'de> DeserializeSeed<'de> for Reject<'_> {
    type Value = ();

    fn deserialize<D>(self, _deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        Err(self.violations.raise(self.error))
    }
}
