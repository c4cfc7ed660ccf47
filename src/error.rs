use crate::frame::{Reason, StreamId};

use std::{error, fmt};

/// Represents errors delivered to transaction handlers.
///
/// Every error names its condition and, when it is scoped to one, the stream
/// it was raised on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    stream_id: Option<StreamId>,
    reason: Option<Reason>,
    detail: Option<String>,
}

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The codec could not parse ingress for this stream.
    Parse,

    /// An ingress event arrived in a state that does not accept it.
    IngressState,

    /// The application attempted an egress action the stream does not accept.
    EgressState,

    /// The peer reset the stream.
    StreamAbort,

    /// The peer's GOAWAY did not acknowledge this stream.
    StreamUnacknowledged,

    /// The connection was dropped locally.
    Dropped,

    /// The transaction idle timer fired.
    Timeout,

    /// A transport write did not complete in time.
    WriteTimeout,

    /// A transport write failed.
    Write,

    /// The peer closed the connection.
    Eof,

    /// A protocol switch response was malformed or unexpected.
    BadUpgrade,

    /// A flow-control window was violated.
    FlowControl,

    /// The stream was refused.
    Refused,

    /// A connection-level protocol error.
    Connection,

    /// Misuse of the session API.
    User(UserError),
}

/// The three error categories a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Malformed event ordering or malformed frames.
    IngressProtocol,
    /// Write failures, EOF and timeouts. Always connection scoped.
    Transport,
    /// Decisions made by policy: unacknowledged streams, limits, upgrades.
    Policy,
}

/// Errors caused by users of the library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserError {
    /// The session is draining and admits no new transactions.
    Draining,

    /// The outgoing concurrency limit is reached.
    ConcurrencyLimit,

    /// The codec cannot allocate another stream id.
    StreamIdsExhausted,

    /// The session is closed or destroyed.
    SessionClosed,

    /// Egress was attempted after the end of message.
    SendAfterEom,

    /// Body or end of message was sent before headers.
    BodyBeforeHeaders,

    /// Final headers were already sent.
    HeadersAlreadySent,

    /// No live transaction has this id.
    UnknownTransaction,

    /// The codec or the peer does not allow server push.
    PushUnsupported,
}

// ===== impl Error =====

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Error {
            kind,
            stream_id: None,
            reason: None,
            detail: None,
        }
    }

    pub(crate) fn with_stream(mut self, id: StreamId) -> Error {
        self.stream_id = Some(id);
        self
    }

    pub(crate) fn with_reason(mut self, reason: Reason) -> Error {
        self.reason = Some(reason);
        self
    }

    pub(crate) fn with_detail(mut self, detail: impl Into<String>) -> Error {
        self.detail = Some(detail.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn stream_id(&self) -> Option<StreamId> {
        self.stream_id
    }

    /// The wire error code associated with this error, if any.
    pub fn reason(&self) -> Option<Reason> {
        self.reason
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn category(&self) -> Category {
        self.kind.category()
    }

    /// Returns true if the error was raised because the transport failed.
    pub fn is_transport(&self) -> bool {
        self.category() == Category::Transport
    }
}

impl From<UserError> for Error {
    fn from(src: UserError) -> Error {
        Error::new(ErrorKind::User(src))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            ErrorKind::IngressState | ErrorKind::EgressState => {
                fmt.write_str(self.kind.description())?;
                if let Some(ref detail) = self.detail {
                    write!(fmt, ", {}", detail)?;
                }
                if let Some(id) = self.stream_id {
                    write!(fmt, ", stream={}", id)?;
                }
                Ok(())
            }
            _ => {
                fmt.write_str(self.kind.description())?;
                if let Some(id) = self.stream_id {
                    write!(fmt, " on stream {}", id)?;
                }
                if let Some(reason) = self.reason {
                    if reason != Reason::NO_ERROR {
                        write!(fmt, " with codec error: {:?}", reason)?;
                    }
                }
                if let Some(ref detail) = self.detail {
                    write!(fmt, ": {}", detail)?;
                }
                Ok(())
            }
        }
    }
}

impl error::Error for Error {}

// ===== impl ErrorKind =====

impl ErrorKind {
    pub fn category(&self) -> Category {
        use self::ErrorKind::*;

        match *self {
            Parse | IngressState | StreamAbort | FlowControl | Connection => {
                Category::IngressProtocol
            }
            Dropped | Timeout | WriteTimeout | Write | Eof => Category::Transport,
            EgressState | StreamUnacknowledged | BadUpgrade | Refused | User(_) => {
                Category::Policy
            }
        }
    }

    fn description(&self) -> &str {
        use self::ErrorKind::*;

        match *self {
            Parse => "parse error",
            IngressState => "invalid ingress state transition",
            EgressState => "invalid egress state transition",
            StreamAbort => "stream aborted by peer",
            StreamUnacknowledged => "stream unacknowledged",
            Dropped => "dropped",
            Timeout => "timeout",
            WriteTimeout => "write timeout",
            Write => "write error",
            Eof => "connection closed by peer",
            BadUpgrade => "bad upgrade",
            FlowControl => "flow control error",
            Refused => "stream refused",
            Connection => "connection error",
            User(ref e) => e.description(),
        }
    }
}

// ===== impl UserError =====

impl UserError {
    fn description(&self) -> &str {
        use self::UserError::*;

        match *self {
            Draining => "session is draining",
            ConcurrencyLimit => "concurrent stream limit reached",
            StreamIdsExhausted => "stream ids exhausted",
            SessionClosed => "session closed",
            SendAfterEom => "send after end of message",
            BodyBeforeHeaders => "body sent before headers",
            HeadersAlreadySent => "headers already sent",
            UnknownTransaction => "unknown transaction",
            PushUnsupported => "push not supported",
        }
    }
}

impl fmt::Display for UserError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.description())
    }
}

impl error::Error for UserError {}
