use crate::codec::{self, Codec, Direction, Protocol};
use crate::frame::StreamId;
use crate::message::Message;

use std::fmt;

/// Protocol switch progress for a client session.
pub(super) enum Upgrade {
    /// No switch was asked for, or it was declined.
    Idle,

    /// A request listing `tokens` is outstanding on `id`.
    Requested { id: StreamId, tokens: Vec<String> },

    /// The peer agreed to a protocol this crate has a codec for. The swap
    /// happens once the switch response is fully parsed.
    Confirmed { id: StreamId, codec: Box<dyn Codec> },

    /// The peer agreed to a protocol without a codec. The stream carries it
    /// as opaque body once the switch response is parsed.
    Passthrough { id: StreamId, protocol: String },

    /// The codec was replaced or the stream now carries another protocol.
    Switched,
}

/// What a `101 Switching Protocols` response selected.
pub(super) enum Selected {
    Native(Box<dyn Codec>),
    Other(String),
}

impl Upgrade {
    pub fn is_idle(&self) -> bool {
        matches!(*self, Upgrade::Idle)
    }
}

/// Checks a switch response against the requested tokens.
///
/// The first token of the response's `Upgrade` header that was also asked
/// for wins. A missing header or an unrequested token is an error.
pub(super) fn select(requested: &[String], response: &Message) -> Result<Selected, String> {
    let offered = response.upgrade_tokens();
    if offered.is_empty() {
        return Err("missing Upgrade header in 101 response".into());
    }

    let token = offered
        .iter()
        .find(|t| requested.iter().any(|r| r.eq_ignore_ascii_case(t)))
        .ok_or_else(|| format!("unrequested upgrade protocol {:?}", offered))?;

    match codec::for_protocol(token, Direction::Upstream) {
        Some(codec) if codec.protocol() != Protocol::Http1 => Ok(Selected::Native(codec)),
        _ => Ok(Selected::Other(token.clone())),
    }
}

impl fmt::Debug for Upgrade {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Upgrade::Idle => fmt.write_str("Idle"),
            Upgrade::Requested { id, ref tokens } => fmt
                .debug_struct("Requested")
                .field("id", &id)
                .field("tokens", tokens)
                .finish(),
            Upgrade::Confirmed { id, ref codec } => fmt
                .debug_struct("Confirmed")
                .field("id", &id)
                .field("protocol", &codec.protocol())
                .finish(),
            Upgrade::Passthrough { id, ref protocol } => fmt
                .debug_struct("Passthrough")
                .field("id", &id)
                .field("protocol", protocol)
                .finish(),
            Upgrade::Switched => fmt.write_str("Switched"),
        }
    }
}
