//! Connection-close classification.
//!
//! A CONNECTION_CLOSE frame is benign when its (error space, raw code)
//! pair is in the fixed table below; anything else is an anomaly.

use crate::parser::{ConnectionCloseFrame, Event, Frame};

/// Close codes that are expected in normal operation.
///
/// Kept verbatim: application/0, transport/0x0c, transport/0x15a,
/// transport/0x12a.
pub const BENIGN_CLOSES: &[(&str, u64)] = &[
    ("application", 0),
    ("transport", 0xc),
    ("transport", 0x15a),
    ("transport", 0x12a),
];

/// Whether the close frame matches an entry in the benign table
pub fn is_benign(frame: &ConnectionCloseFrame) -> bool {
    BENIGN_CLOSES
        .iter()
        .any(|&(space, code)| frame.error_space == space && frame.raw_error_code == code)
}

/// Anomalous close frames carried by a packet_sent / packet_received event
///
/// Other event kinds never yield anything.
pub fn anomalous_closes(event: &Event) -> impl Iterator<Item = &ConnectionCloseFrame> {
    event.frames().iter().filter_map(|frame| match frame {
        Frame::ConnectionClose(close) if !is_benign(close) => Some(close),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{EventDetails, Packet, PacketLost};
    use chrono::Utc;

    fn close(space: &str, code: u64) -> ConnectionCloseFrame {
        ConnectionCloseFrame {
            error_space: space.to_string(),
            raw_error_code: code,
            reason: String::new(),
        }
    }

    #[test]
    fn test_benign_table() {
        assert!(is_benign(&close("application", 0)));
        assert!(is_benign(&close("transport", 0x0c)));
        assert!(is_benign(&close("transport", 0x15a)));
        assert!(is_benign(&close("transport", 0x12a)));
    }

    #[test]
    fn test_anomalies() {
        assert!(!is_benign(&close("transport", 0x01)));
        assert!(!is_benign(&close("application", 0x0c)));
        assert!(!is_benign(&close("", 0)));
    }

    #[test]
    fn test_anomalous_closes_only_from_packets() {
        let frames = vec![
            Frame::ConnectionClose(close("transport", 0x0c)),
            Frame::ConnectionClose(close("transport", 0x0a)),
        ];
        let sent = Event {
            time: Utc::now(),
            category: "transport".to_string(),
            name: "packet_sent".to_string(),
            details: EventDetails::PacketSent(Packet {
                frames,
                ..Default::default()
            }),
        };
        let found: Vec<_> = anomalous_closes(&sent).collect();
        assert_eq!(found, vec![&close("transport", 0x0a)]);

        let lost = Event {
            details: EventDetails::PacketLost(PacketLost::default()),
            ..sent
        };
        assert_eq!(anomalous_closes(&lost).count(), 0);
    }
}
