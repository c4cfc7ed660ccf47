use std::fmt;

/// Identifies one transaction within a session.
///
/// On HTTP/2 this is the 31-bit stream identifier of RFC 7540 §5.1.1, odd for
/// client-opened streams and even for pushes. HTTP/1.x numbers exchanges
/// sequentially from 1. Zero addresses the connection itself.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct StreamId(u32);

const RESERVED_BIT: u32 = 0x8000_0000;

impl StreamId {
    pub const ZERO: StreamId = StreamId(0);

    pub const MAX: StreamId = StreamId(!RESERVED_BIT);

    /// Reads an identifier from the first four bytes of `buf`.
    ///
    /// The reserved high bit is stripped and returned separately; PRIORITY
    /// reuses it as the exclusive flag.
    #[inline]
    pub fn decode(buf: &[u8]) -> (StreamId, bool) {
        let raw = unpack_octets_4!(buf, 0, u32);
        (StreamId(raw & !RESERVED_BIT), raw & RESERVED_BIT != 0)
    }

    #[inline]
    pub fn zero() -> StreamId {
        StreamId::ZERO
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_client_initiated(&self) -> bool {
        self.0 & 1 == 1
    }

    pub fn is_server_initiated(&self) -> bool {
        !self.is_zero() && self.0 & 1 == 0
    }

    /// The id `step` after this one, unless that leaves the 31-bit space.
    pub fn checked_step(&self, step: u32) -> Option<StreamId> {
        self.0
            .checked_add(step)
            .filter(|next| *next <= StreamId::MAX.0)
            .map(StreamId)
    }
}

impl From<u32> for StreamId {
    fn from(src: u32) -> Self {
        assert!(src & RESERVED_BIT == 0, "stream id {:#x} out of range", src);
        StreamId(src)
    }
}

impl From<StreamId> for u32 {
    fn from(src: StreamId) -> Self {
        src.0
    }
}

impl PartialEq<u32> for StreamId {
    fn eq(&self, other: &u32) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
