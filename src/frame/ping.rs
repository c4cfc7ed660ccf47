use crate::frame::{Error, Frame, Head, Kind, StreamId};
use crate::tracing::trace;

use bytes::BufMut;

const ACK: u8 = 0x1;

/// A PING or its acknowledgement.
#[derive(Debug, Eq, PartialEq)]
pub struct Ping {
    ack: bool,
    payload: [u8; 8],
}

impl Ping {
    #[cfg(any(test, feature = "unstable"))]
    pub fn new(payload: [u8; 8]) -> Ping {
        Ping {
            ack: false,
            payload,
        }
    }

    /// The reply to a ping carrying `payload`.
    pub fn pong(payload: [u8; 8]) -> Ping {
        Ping { ack: true, payload }
    }

    pub fn is_ack(&self) -> bool {
        self.ack
    }

    pub fn into_payload(self) -> [u8; 8] {
        self.payload
    }

    pub fn load(head: Head, src: &[u8]) -> Result<Ping, Error> {
        debug_assert_eq!(head.kind(), Kind::Ping);

        if !head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        let payload = <[u8; 8]>::try_from(src).map_err(|_| Error::BadFrameSize)?;

        Ok(Ping {
            ack: head.flag() & ACK == ACK,
            payload,
        })
    }

    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        trace!(ack = self.ack, "encoding PING");

        let flags = if self.ack { ACK } else { 0 };
        Head::new(Kind::Ping, flags, StreamId::zero()).encode(self.payload.len(), dst);
        dst.put_slice(&self.payload);
    }
}

impl From<Ping> for Frame {
    fn from(src: Ping) -> Frame {
        Frame::Ping(src)
    }
}
