use bitflags::bitflags;

bitflags! {
    /// Frame flag bits from https://httpwg.org/specs/rfc7540.html#FrameTypes.
    ///
    /// The defined bits never collide across frame types, so a single set
    /// covers all of them; each handler honors only the bits its frame type
    /// defines. Keeping one set also lets the outgoing splitter mask
    /// END_STREAM/END_HEADERS/PRIORITY without knowing the frame type.
    #[repr(transparent)]
    pub struct FrameFlags: u8 {
        /// DATA, HEADERS: no more frames will be sent on this stream.
        const END_STREAM = 0x1;
        /// SETTINGS, PING: acknowledges the peer's frame. Same bit as
        /// END_STREAM, but the carrying frame types are disjoint.
        const ACK = 0x1;
        /// HEADERS, PUSH_PROMISE, CONTINUATION: the header block is complete
        /// and no CONTINUATION follows.
        const END_HEADERS = 0x4;
        /// DATA, HEADERS, PUSH_PROMISE: a pad-length octet and that much
        /// trailing padding are present.
        const PADDED = 0x8;
        /// HEADERS: an exclusive-bit/dependency/weight block is present.
        const PRIORITY = 0x20;
    }
}
