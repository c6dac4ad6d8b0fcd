//! QUIC packet header as logged in packet events.

use serde::{Deserialize, Serialize};

/// Header of one QUIC packet
///
/// Every field is optional in the trace; absent fields keep their
/// default and unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Header {
    /// Source connection ID (hex)
    #[serde(rename = "scid")]
    pub src_conn_id: String,

    /// Destination connection ID (hex)
    #[serde(rename = "dcid")]
    pub dest_conn_id: String,

    pub packet_number: i64,
    pub payload_length: u64,
    pub packet_size: u64,
    pub version: String,
}
