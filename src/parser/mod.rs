//! qlog trace decoding.
//!
//! This module handles:
//! - Streaming the top-level document and its single trace
//! - Positional event tuples keyed by the trace's `event_fields`
//! - Tagged-union QUIC frames inside packet events

pub mod event;
pub mod frame;
pub mod header;
pub mod trace;
mod violations;

// Re-export main types
pub use event::{
    decode_event, ConnectionStarted, Event, EventDetails, MetricsUpdated, Packet, PacketLost,
};
pub use frame::{
    decode_frame, ConnectionCloseFrame, CryptoFrame, Frame, NewConnectionIdFrame,
    RetireConnectionIdFrame,
};
pub use header::Header;
pub use trace::{EventSink, TraceDecoder, TraceSummary};
