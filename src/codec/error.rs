use crate::frame::Reason;

use std::borrow::Cow;
use std::{error, fmt};

/// An error raised by a codec while parsing ingress.
///
/// Stream-scoped errors are isolated to the stream the event names;
/// connection-fatal errors tear the whole session down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecError {
    reason: Reason,
    message: Cow<'static, str>,
    fatal: bool,
}

impl CodecError {
    /// An error confined to one stream.
    pub fn stream(reason: Reason, message: impl Into<Cow<'static, str>>) -> CodecError {
        CodecError {
            reason,
            message: message.into(),
            fatal: false,
        }
    }

    /// An error that ends the connection.
    pub fn connection(reason: Reason, message: impl Into<Cow<'static, str>>) -> CodecError {
        CodecError {
            reason,
            message: message.into(),
            fatal: true,
        }
    }

    pub fn reason(&self) -> Reason {
        self.reason
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_connection_fatal(&self) -> bool {
        self.fatal
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{} ({:?})", self.message, self.reason)
    }
}

impl error::Error for CodecError {}
