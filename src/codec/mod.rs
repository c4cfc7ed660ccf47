//! The codec boundary.
//!
//! A codec translates wire bytes into a sequence of [`Event`]s and turns
//! egress commands into wire bytes appended to the session's write buffer.
//! The session depends only on the [`Codec`] trait; concrete variants are
//! selected through [`for_protocol`].

mod error;
mod http1;
mod http2;

pub use self::error::CodecError;
pub use self::http1::Http1Codec;
pub use self::http2::Http2Codec;

use crate::frame::{Reason, Setting, StreamId};
use crate::message::Message;
use crate::proto::Priority;

use bytes::{Bytes, BytesMut};
use http::HeaderMap;

use std::collections::VecDeque;
use std::fmt;

/// Which side of the connection the codec speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Sends requests and receives responses (client).
    Upstream,
    /// Receives requests and sends responses (server).
    Downstream,
}

/// The wire protocols with a concrete codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Http1,
    Http2,
}

/// An ingress event produced by a codec.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A new message started on `id`.
    MessageBegin { id: StreamId },
    /// The peer promised a pushed stream `id` associated with `assoc`.
    PushPromise {
        id: StreamId,
        assoc: StreamId,
        request: Message,
    },
    /// A complete header block.
    Headers { id: StreamId, msg: Message },
    /// Body bytes. `padding` counts flow-controlled octets not in `chunk`.
    Body {
        id: StreamId,
        chunk: Bytes,
        padding: usize,
    },
    ChunkHeader { id: StreamId, len: usize },
    ChunkComplete { id: StreamId },
    Trailers { id: StreamId, trailers: HeaderMap },
    /// The message ended. `upgrade` is set when the codec stopped parsing
    /// because the message switched protocols.
    MessageComplete { id: StreamId, upgrade: bool },
    /// The peer reset the stream.
    Abort { id: StreamId, reason: Reason },
    GoAway {
        last_stream_id: StreamId,
        reason: Reason,
        debug_data: Bytes,
    },
    Ping { payload: [u8; 8], ack: bool },
    WindowUpdate { id: StreamId, increment: u32 },
    Settings(Vec<Setting>),
    SettingsAck,
    Priority { id: StreamId, priority: Priority },
    /// An ingress error. `id` is zero for connection errors.
    Error { id: StreamId, error: CodecError },
}

/// The capability-set interface every wire protocol variant implements.
///
/// All `generate_*` methods append to `dst` and return the number of bytes
/// written, which may be zero for commands the protocol has no wire form
/// for.
pub trait Codec {
    fn protocol(&self) -> Protocol;

    fn direction(&self) -> Direction;

    fn supports_parallel_requests(&self) -> bool;

    fn supports_stream_flow_control(&self) -> bool;

    fn supports_session_flow_control(&self) -> bool;

    fn supports_priority(&self) -> bool {
        false
    }

    fn supports_push(&self) -> bool {
        false
    }

    fn supports_stream_reset(&self) -> bool;

    /// Whether another message may follow on this connection.
    fn is_reusable(&self) -> bool;

    /// Serial codecs stop parsing until the current response is generated.
    fn is_waiting_for_egress(&self) -> bool {
        false
    }

    fn default_window_size(&self) -> u32;

    /// Allocates the next locally initiated stream id.
    fn create_stream(&mut self) -> Option<StreamId>;

    /// Parses as much of `src` as possible, pushing events. Returns the
    /// number of bytes consumed.
    fn on_ingress(&mut self, src: &[u8], events: &mut VecDeque<Event>) -> usize;

    fn on_ingress_eof(&mut self, events: &mut VecDeque<Event>);

    /// Adopts `id` as a stream already opened by the request that negotiated
    /// the switch to this codec.
    fn on_ingress_upgrade(&mut self, _id: StreamId) {}

    fn generate_connection_preface(&mut self, _dst: &mut BytesMut) -> usize {
        0
    }

    fn generate_header(&mut self, dst: &mut BytesMut, id: StreamId, msg: &Message, eom: bool)
        -> usize;

    fn generate_body(&mut self, dst: &mut BytesMut, id: StreamId, chunk: Bytes, eom: bool)
        -> usize;

    /// Writes trailers and ends the message.
    fn generate_trailers(&mut self, dst: &mut BytesMut, id: StreamId, trailers: &HeaderMap)
        -> usize;

    fn generate_eom(&mut self, dst: &mut BytesMut, id: StreamId) -> usize;

    fn generate_rst_stream(&mut self, dst: &mut BytesMut, id: StreamId, reason: Reason) -> usize;

    fn generate_goaway(&mut self, dst: &mut BytesMut, last: StreamId, reason: Reason) -> usize;

    fn generate_window_update(&mut self, _dst: &mut BytesMut, _id: StreamId, _delta: u32) -> usize {
        0
    }

    fn generate_settings(&mut self, _dst: &mut BytesMut) -> usize {
        0
    }

    fn generate_settings_ack(&mut self, _dst: &mut BytesMut) -> usize {
        0
    }

    fn generate_priority(&mut self, _dst: &mut BytesMut, _id: StreamId, _pri: &Priority) -> usize {
        0
    }

    fn generate_push_promise(
        &mut self,
        _dst: &mut BytesMut,
        _assoc: StreamId,
        _promised: StreamId,
        _request: &Message,
    ) -> usize {
        0
    }

    fn generate_ping_reply(&mut self, _dst: &mut BytesMut, _payload: [u8; 8]) -> usize {
        0
    }

    /// Records a SETTINGS parameter to announce in `generate_settings`.
    fn set_egress_setting(&mut self, _setting: Setting) {}
}

/// Builds the codec for an ALPN or upgrade token.
///
/// The empty token stands for plain HTTP/1.1.
pub fn for_protocol(name: &str, direction: Direction) -> Option<Box<dyn Codec>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "" | "http/1.1" | "http/1.0" => Some(Box::new(Http1Codec::new(direction))),
        "h2" | "h2c" => Some(Box::new(Http2Codec::new(direction))),
        _ => None,
    }
}

/// Splits a comma separated token list, trimming whitespace and dropping
/// empty entries.
pub fn parse_upgrade_tokens(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

impl fmt::Display for Protocol {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Protocol::Http1 => fmt.write_str("http/1.1"),
            Protocol::Http2 => fmt.write_str("h2"),
        }
    }
}
