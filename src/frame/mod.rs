//! HTTP/2 frame layer used by the HTTP/2 codec.
//!
//! Each frame type knows how to load itself from a frame head plus payload
//! and how to encode itself into an output buffer. Header blocks are passed
//! through as opaque bytes; HPACK lives in `crate::hpack`.

use std::fmt;

/// Reads a big-endian 32-bit value at `$offset`.
macro_rules! unpack_octets_4 {
    ($buf:expr, $offset:expr, $tip:ty) => {
        (($buf[$offset] as $tip) << 24)
            | (($buf[$offset + 1] as $tip) << 16)
            | (($buf[$offset + 2] as $tip) << 8)
            | ($buf[$offset + 3] as $tip)
    };
}

mod data;
mod go_away;
mod head;
mod headers;
mod ping;
mod priority;
mod reason;
mod reset;
mod settings;
mod stream_id;
mod util;
mod window_update;

pub use self::data::Data;
pub use self::go_away::GoAway;
pub use self::head::{Head, Kind};
pub use self::headers::{Continuation, Headers, PushPromise};
pub use self::ping::Ping;
pub use self::priority::{Priority, StreamDependency};
pub use self::reason::Reason;
pub use self::reset::Reset;
pub use self::settings::{Setting, Settings};
pub use self::stream_id::StreamId;
pub use self::window_update::WindowUpdate;

pub type FrameSize = u32;

pub const HEADER_LEN: usize = 9;

// INITIAL_WINDOW_SIZE upper bound
pub const MAX_INITIAL_WINDOW_SIZE: usize = (1 << 31) - 1;

/// The default value of SETTINGS_INITIAL_WINDOW_SIZE
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65_535;

/// The default value of SETTINGS_MAX_FRAME_SIZE
pub const DEFAULT_MAX_FRAME_SIZE: FrameSize = 16_384;

/// The largest frame size a peer may announce.
pub const MAX_MAX_FRAME_SIZE: FrameSize = (1 << 24) - 1;

/// The default value of SETTINGS_HEADER_TABLE_SIZE
pub const DEFAULT_SETTINGS_HEADER_TABLE_SIZE: usize = 4_096;

/// The client connection preface.
pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

#[derive(Eq, PartialEq)]
pub enum Frame {
    Data(Data),
    Headers(Headers),
    Priority(Priority),
    PushPromise(PushPromise),
    Settings(Settings),
    Ping(Ping),
    GoAway(GoAway),
    WindowUpdate(WindowUpdate),
    Reset(Reset),
    Continuation(Continuation),
}

/// Errors that can occur during parsing an HTTP/2 frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A length value other than 8 was set on a PING message.
    BadFrameSize,

    /// The padding length was larger than the frame-header-specified
    /// length of the payload.
    TooMuchPadding,

    /// An invalid setting value was provided
    InvalidSettingValue,

    /// An invalid window update value
    InvalidWindowUpdateValue,

    /// SETTINGS_INITIAL_WINDOW_SIZE above the maximum window size.
    InvalidInitialWindowSize,

    /// The payload length specified by the frame header was not the
    /// value necessary for the specific frame type.
    InvalidPayloadLength,

    /// Received a payload with an ACK settings frame
    InvalidPayloadAckSettings,

    /// An invalid stream identifier was provided.
    ///
    /// This is returned if a SETTINGS or PING frame is received with a stream
    /// identifier other than zero.
    InvalidStreamId,

    /// A request or response is malformed.
    MalformedMessage,

    /// An invalid stream dependency ID was provided
    ///
    /// This is returned if a HEADERS or PRIORITY frame is received with an
    /// invalid stream identifier.
    InvalidDependencyId,
}

// ===== impl Frame =====

impl Frame {
    /// Loads a complete frame. CONTINUATION frames are returned as-is; the
    /// caller stitches header blocks together.
    pub fn load(head: Head, payload: bytes::Bytes) -> Result<Option<Frame>, Error> {
        let frame = match head.kind() {
            Kind::Data => Frame::Data(Data::load(head, payload)?),
            Kind::Headers => Frame::Headers(Headers::load(head, payload)?),
            Kind::Priority => Frame::Priority(Priority::load(head, &payload)?),
            Kind::Reset => Frame::Reset(Reset::load(head, &payload)?),
            Kind::Settings => Frame::Settings(Settings::load(head, &payload)?),
            Kind::PushPromise => Frame::PushPromise(PushPromise::load(head, payload)?),
            Kind::Ping => Frame::Ping(Ping::load(head, &payload)?),
            Kind::GoAway => Frame::GoAway(GoAway::load(&payload)?),
            Kind::WindowUpdate => Frame::WindowUpdate(WindowUpdate::load(head, &payload)?),
            Kind::Continuation => Frame::Continuation(Continuation::load(head, payload)),
            Kind::Unknown => return Ok(None),
        };

        Ok(Some(frame))
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::Frame::*;

        match *self {
            Data(ref frame) => fmt::Debug::fmt(frame, fmt),
            Headers(ref frame) => fmt::Debug::fmt(frame, fmt),
            Priority(ref frame) => fmt::Debug::fmt(frame, fmt),
            PushPromise(ref frame) => fmt::Debug::fmt(frame, fmt),
            Settings(ref frame) => fmt::Debug::fmt(frame, fmt),
            Ping(ref frame) => fmt::Debug::fmt(frame, fmt),
            GoAway(ref frame) => fmt::Debug::fmt(frame, fmt),
            WindowUpdate(ref frame) => fmt::Debug::fmt(frame, fmt),
            Reset(ref frame) => fmt::Debug::fmt(frame, fmt),
            Continuation(ref frame) => fmt::Debug::fmt(frame, fmt),
        }
    }
}

// ===== impl Error =====

impl Error {
    /// The connection error code a peer should see for this failure.
    pub fn reason(&self) -> Reason {
        match *self {
            Error::BadFrameSize | Error::InvalidPayloadLength | Error::InvalidPayloadAckSettings => {
                Reason::FRAME_SIZE_ERROR
            }
            Error::InvalidInitialWindowSize => Reason::FLOW_CONTROL_ERROR,
            _ => Reason::PROTOCOL_ERROR,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match *self {
            Error::BadFrameSize => "frame with invalid size",
            Error::TooMuchPadding => "padding exceeds frame length",
            Error::InvalidSettingValue => "invalid setting value",
            Error::InvalidWindowUpdateValue => "invalid window update value",
            Error::InvalidInitialWindowSize => "initial window size too large",
            Error::InvalidPayloadLength => "invalid payload length",
            Error::InvalidPayloadAckSettings => "settings ack with payload",
            Error::InvalidStreamId => "invalid stream id",
            Error::MalformedMessage => "malformed message",
            Error::InvalidDependencyId => "stream depends on itself",
        };
        fmt.write_str(msg)
    }
}
