use crate::flags::FrameFlags;
use crate::types::{FrameType, StreamId};
use bytes::Bytes;
use num_traits::FromPrimitive;

/// Octets in the fixed frame header: 24-bit length, type, flags, 31-bit stream.
pub const FRAME_HEADER_LEN: usize = 9;

/// One HTTP/2 frame with its payload. The type is kept as the raw wire octet
/// so frames of unknown type (>= 10) survive parsing, reach the `on_frame`
/// hook, and can then be discarded as the RFC requires.
#[derive(Debug, Clone)]
pub struct Frame {
    pub typ: u8,
    pub flags: FrameFlags,
    pub stream: StreamId,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(typ: FrameType, flags: FrameFlags, stream: StreamId, payload: impl Into<Bytes>) -> Self {
        Self {
            typ: typ as u8,
            flags,
            stream,
            payload: payload.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> Option<FrameType> {
        FrameType::from_u8(self.typ)
    }

    #[must_use]
    pub fn is(&self, typ: FrameType) -> bool {
        self.typ == typ as u8
    }

    /// The 9-octet header matching this frame's payload length.
    #[must_use]
    pub fn header_bytes(&self) -> [u8; FRAME_HEADER_LEN] {
        let length = self.payload.len() as u32;
        let stream = self.stream.to_be_bytes();
        [
            (length >> 16) as u8,
            (length >> 8) as u8,
            length as u8,
            self.typ,
            self.flags.bits(),
            stream[0],
            stream[1],
            stream[2],
            stream[3],
        ]
    }
}

/// A parsed frame header; the payload may not be buffered yet.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub length: u32,
    pub typ: u8,
    pub flags: FrameFlags,
    pub stream: StreamId,
}

impl FrameHeader {
    /// Reads the fixed header off the front of `data`; `None` if fewer than
    /// 9 octets are buffered.
    #[must_use]
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < FRAME_HEADER_LEN {
            return None;
        }
        Some(Self {
            length: u32::from_be_bytes([0, data[0], data[1], data[2]]),
            typ: data[3],
            flags: FrameFlags::from_bits_truncate(data[4]),
            // >A reserved 1-bit field. [...] MUST remain unset when sending
            // >and MUST be ignored when receiving.
            stream: u32::from_be_bytes([data[5], data[6], data[7], data[8]]) & 0x7FFF_FFFF,
        })
    }

    #[must_use]
    pub fn total_len(&self) -> usize {
        FRAME_HEADER_LEN + self.length as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let frame = Frame::new(
            FrameType::Headers,
            FrameFlags::END_HEADERS | FrameFlags::END_STREAM,
            3,
            Bytes::from_static(b"block"),
        );
        let header = FrameHeader::parse(&frame.header_bytes()).unwrap();
        assert_eq!(header.length, 5);
        assert_eq!(header.typ, FrameType::Headers as u8);
        assert_eq!(header.flags, FrameFlags::END_HEADERS | FrameFlags::END_STREAM);
        assert_eq!(header.stream, 3);
        assert_eq!(header.total_len(), 14);
    }

    #[test]
    fn short_input_is_not_a_header() {
        assert!(FrameHeader::parse(&[0; 8]).is_none());
    }

    #[test]
    fn reserved_stream_bit_is_masked() {
        let header = FrameHeader::parse(&[0, 0, 0, 0, 0, 0x80, 0, 0, 1]).unwrap();
        assert_eq!(header.stream, 1);
    }

    #[test]
    fn unknown_frame_types_stay_raw() {
        let header = FrameHeader::parse(&[0, 0, 0, 0x2A, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(header.typ, 0x2A);
        assert!(FrameType::from_u8(header.typ).is_none());
    }
}
