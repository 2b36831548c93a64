//! Splitting of socket reads into RC frames.
//!
//! RC frames carry no length prefix: a frame ends where the read that
//! delivered it ends. Fixed-width variants have a known size though, so a
//! read holding several fixed frames (optionally followed by one text-bearing
//! frame) is split apart here.

use crate::error::ProtocolError;
use crate::packet::Packet;

/// Returns an iterator over the frames contained in one socket read.
pub fn frames(read: &[u8]) -> FrameIter<'_> {
    FrameIter { remaining: read }
}

/// Iterator over the frames of one socket read.
///
/// Yields one `Err` and stops at the first fault, since the remaining bytes
/// can no longer be attributed to a frame boundary.
#[derive(Debug, Clone)]
pub struct FrameIter<'a> {
    remaining: &'a [u8],
}

impl Iterator for FrameIter<'_> {
    type Item = Result<Packet, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }

        let packet_type = match Packet::peek_type(self.remaining) {
            Ok(packet_type) => packet_type,
            Err(e) => {
                self.remaining = &[];
                return Some(Err(e));
            }
        };

        let frame_len = if packet_type.has_text() {
            self.remaining.len()
        } else {
            packet_type.min_frame_len().min(self.remaining.len())
        };

        let (frame, rest) = self.remaining.split_at(frame_len);
        let result = Packet::decode_as(packet_type, frame);
        self.remaining = if result.is_ok() { rest } else { &[] };
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{ContentLengthStatus, HandshakeStatus};

    fn encode_all(packets: &[Packet]) -> Vec<u8> {
        packets
            .iter()
            .flat_map(|p| p.encode().unwrap().to_vec())
            .collect()
    }

    #[test]
    fn test_single_frame() {
        let packet = Packet::QueryAccepted { query_id: 7 };
        let read = encode_all(&[packet.clone()]);

        let decoded: Vec<_> = frames(&read).collect();
        assert_eq!(decoded, vec![Ok(packet)]);
    }

    #[test]
    fn test_coalesced_fixed_frames() {
        let packets = vec![
            Packet::ServerHandshakeResult {
                result: HandshakeStatus::Ok,
            },
            Packet::ContentLengthResult {
                result: ContentLengthStatus::Ok,
            },
            Packet::QueryAccepted { query_id: 3 },
        ];
        let read = encode_all(&packets);

        let decoded: Vec<_> = frames(&read).map(Result::unwrap).collect();
        assert_eq!(decoded, packets);
    }

    #[test]
    fn test_fixed_frames_then_text_frame() {
        let packets = vec![
            Packet::QueryAccepted { query_id: 3 },
            Packet::QueryResult {
                query_id: 3,
                content: "players: 12".to_string(),
            },
        ];
        let read = encode_all(&packets);

        let decoded: Vec<_> = frames(&read).map(Result::unwrap).collect();
        assert_eq!(decoded, packets);
    }

    #[test]
    fn test_text_frame_consumes_rest_of_read() {
        let mut read = encode_all(&[Packet::query(&b"a"[..])]);
        let trailing = encode_all(&[Packet::QueryAccepted { query_id: 2 }]);
        read.extend_from_slice(&trailing);

        let mut iter = frames(&read);
        match iter.next() {
            Some(Ok(Packet::Query { content })) => {
                assert_eq!(content.len(), 1 + trailing.len());
                assert_eq!(&content[1..], &trailing[..]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_garbage_stops_iteration() {
        let mut read = encode_all(&[Packet::QueryAccepted { query_id: 9 }]);
        read.extend_from_slice(b"XXXXXXXX");

        let mut iter = frames(&read);
        assert_eq!(iter.next(), Some(Ok(Packet::QueryAccepted { query_id: 9 })));
        assert!(matches!(
            iter.next(),
            Some(Err(ProtocolError::MalformedHeader(_)))
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_truncated_fixed_frame() {
        let read = b"RC\x01\xFF\x13\x01";
        let decoded: Vec<_> = frames(read).collect();
        assert_eq!(decoded.len(), 1);
        assert!(matches!(decoded[0], Err(ProtocolError::MalformedPacket(_))));
    }

    #[test]
    fn test_empty_read() {
        assert!(frames(&[]).next().is_none());
    }
}
