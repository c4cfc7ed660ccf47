use std::fmt;

/// Where a transaction's ingress message is.
///
/// Events must follow the order of an HTTP message; anything else is an
/// ingress protocol error naming the state and the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Ingress {
    Start,
    HeadersReceived,
    RegularBodyReceived,
    ChunkHeaderReceived,
    ChunkBodyReceived,
    ChunkCompleteReceived,
    TrailersReceived,
    Upgraded,
    EomQueued,
    ReceivingDone,
}

/// An ingress event as seen by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Event {
    /// Informational (1xx other than 101) headers.
    InformationalHeaders,
    Headers,
    Body,
    ChunkHeader,
    ChunkComplete,
    Trailers,
    Upgrade,
    Eom,
    /// The queued end of message was handed to the handler.
    EomDelivered,
}

impl Ingress {
    /// Applies `event`, returning the next state or `None` if the event is
    /// not legal here.
    pub fn transition(self, event: Event) -> Option<Ingress> {
        use self::Event as E;
        use self::Ingress::*;

        let next = match (self, event) {
            (Start, E::InformationalHeaders) => Start,
            (Start, E::Headers) => HeadersReceived,

            (HeadersReceived, E::Body) => RegularBodyReceived,
            (HeadersReceived, E::ChunkHeader) => ChunkHeaderReceived,
            (HeadersReceived, E::Trailers) => TrailersReceived,
            (HeadersReceived, E::Upgrade) => Upgraded,
            (HeadersReceived, E::Eom) => EomQueued,

            (RegularBodyReceived, E::Body) => RegularBodyReceived,
            (RegularBodyReceived, E::Trailers) => TrailersReceived,
            (RegularBodyReceived, E::Eom) => EomQueued,

            (ChunkHeaderReceived, E::Body) => ChunkBodyReceived,

            (ChunkBodyReceived, E::Body) => ChunkBodyReceived,
            (ChunkBodyReceived, E::ChunkComplete) => ChunkCompleteReceived,

            (ChunkCompleteReceived, E::ChunkHeader) => ChunkHeaderReceived,
            (ChunkCompleteReceived, E::Trailers) => TrailersReceived,
            (ChunkCompleteReceived, E::Eom) => EomQueued,

            (TrailersReceived, E::Eom) => EomQueued,

            (Upgraded, E::Body) => Upgraded,
            (Upgraded, E::Eom) => EomQueued,

            (EomQueued, E::EomDelivered) => ReceivingDone,

            _ => return None,
        };

        Some(next)
    }

    /// True once the end of message was parsed.
    pub fn is_eom_seen(&self) -> bool {
        matches!(*self, Ingress::EomQueued | Ingress::ReceivingDone)
    }
}

impl fmt::Display for Ingress {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use self::Ingress::*;

        fmt.write_str(match *self {
            Start => "Start",
            HeadersReceived => "HeadersReceived",
            RegularBodyReceived => "RegularBodyReceived",
            ChunkHeaderReceived => "ChunkHeaderReceived",
            ChunkBodyReceived => "ChunkBodyReceived",
            ChunkCompleteReceived => "ChunkCompleteReceived",
            TrailersReceived => "TrailersReceived",
            Upgraded => "Upgraded",
            EomQueued => "EOMQueued",
            ReceivingDone => "ReceivingDone",
        })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use self::Event::*;

        fmt.write_str(match *self {
            InformationalHeaders | Headers => "onHeaders",
            Body => "onBody",
            ChunkHeader => "onChunkHeader",
            ChunkComplete => "onChunkComplete",
            Trailers => "onTrailers",
            Upgrade => "onUpgrade",
            Eom | EomDelivered => "onEOM",
        })
    }
}

/// Egress progress flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct Egress {
    pub headers_sent: bool,
    pub body_sent: bool,
    /// The application asked for the end of message; it may still be queued
    /// behind body bytes.
    pub eom_queued: bool,
    pub eom_sent: bool,
}

impl Egress {
    pub fn is_complete(&self) -> bool {
        self.eom_sent
    }
}
