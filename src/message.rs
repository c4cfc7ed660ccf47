//! Protocol independent HTTP message heads.

use crate::proto::Priority;

use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, StatusCode, Uri, Version};

/// The start line of a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Head {
    Request { method: Method, uri: Uri },
    Response { status: StatusCode },
}

/// A request or response head as seen by a transaction.
///
/// Codecs translate between this and their wire representation; the session
/// never looks at protocol specific framing headers.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    head: Head,
    headers: HeaderMap,
    version: Version,
    chunked: bool,
    priority: Option<Priority>,
}

impl Message {
    pub fn request(method: Method, uri: Uri) -> Message {
        Message::new(Head::Request { method, uri })
    }

    pub fn response(status: StatusCode) -> Message {
        Message::new(Head::Response { status })
    }

    fn new(head: Head) -> Message {
        Message {
            head,
            headers: HeaderMap::new(),
            version: Version::HTTP_11,
            chunked: false,
            priority: None,
        }
    }

    pub fn head(&self) -> &Head {
        &self.head
    }

    pub fn is_request(&self) -> bool {
        matches!(self.head, Head::Request { .. })
    }

    pub fn method(&self) -> Option<&Method> {
        match self.head {
            Head::Request { ref method, .. } => Some(method),
            Head::Response { .. } => None,
        }
    }

    pub fn uri(&self) -> Option<&Uri> {
        match self.head {
            Head::Request { ref uri, .. } => Some(uri),
            Head::Response { .. } => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self.head {
            Head::Response { status } => Some(status),
            Head::Request { .. } => None,
        }
    }

    /// True for 1xx responses other than `101 Switching Protocols`.
    pub fn is_informational(&self) -> bool {
        match self.status() {
            Some(status) => {
                status.is_informational() && status != StatusCode::SWITCHING_PROTOCOLS
            }
            None => false,
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn with_header(mut self, name: header::HeaderName, value: HeaderValue) -> Message {
        self.headers.append(name, value);
        self
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Whether the body arrived (or will be sent) with chunked framing.
    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    pub fn set_chunked(&mut self, chunked: bool) {
        self.chunked = chunked;
    }

    pub fn priority(&self) -> Option<Priority> {
        self.priority
    }

    pub fn set_priority(&mut self, priority: Option<Priority>) {
        self.priority = priority;
    }

    /// The protocol tokens listed in the `Upgrade` header, if any.
    pub fn upgrade_tokens(&self) -> Vec<String> {
        let mut tokens = Vec::new();
        for value in self.headers.get_all(header::UPGRADE) {
            if let Ok(s) = value.to_str() {
                tokens.extend(crate::codec::parse_upgrade_tokens(s));
            }
        }
        tokens
    }

    /// The `Content-Length` value when present and well formed.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }
}
