use super::{Codec, CodecError, Direction, Event, Protocol};
use crate::frame::{Reason, StreamId};
use crate::message::Message;
use crate::tracing::{debug, trace};

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode, Uri, Version};

use std::collections::VecDeque;

const MAX_HEADERS: usize = 100;
const MAX_HEAD_LEN: usize = 80 * 1024;

/// The serial HTTP/1.x codec.
///
/// One message is parsed at a time. A downstream codec does not parse the
/// next request until the response to the current one is fully generated.
#[derive(Debug)]
pub struct Http1Codec {
    direction: Direction,

    /// Last locally allocated (upstream) or remotely opened (downstream) id.
    last_id: u32,

    /// Upstream: requests sent and still waiting for a final response, with
    /// their methods (HEAD responses carry no body).
    pending: VecDeque<(StreamId, Method)>,

    read: Read,
    ingress_id: StreamId,
    ingress_keepalive: bool,

    egress_keepalive: bool,
    egress_chunked: bool,

    /// Downstream: a request was parsed and its response is not complete.
    waiting_for_egress: bool,
    response_complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Read {
    Head,
    Length(u64),
    UntilClose,
    ChunkSize,
    ChunkData(u64),
    ChunkEnd,
    Trailers,
    /// After a 101: every byte belongs to the upgraded stream.
    Passthrough,
    Closed,
}

enum Framing {
    Empty,
    Length(u64),
    Chunked,
    UntilClose,
}

impl Http1Codec {
    pub fn new(direction: Direction) -> Http1Codec {
        Http1Codec {
            direction,
            last_id: 0,
            pending: VecDeque::new(),
            read: Read::Head,
            ingress_id: StreamId::zero(),
            ingress_keepalive: true,
            egress_keepalive: true,
            egress_chunked: false,
            waiting_for_egress: false,
            response_complete: false,
        }
    }

    fn parse_head(
        &mut self,
        src: &[u8],
        events: &mut VecDeque<Event>,
    ) -> Result<Option<usize>, CodecError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];

        let (len, mut msg) = match self.direction {
            Direction::Downstream => {
                let mut req = httparse::Request::new(&mut headers);
                let len = match req.parse(src) {
                    Ok(httparse::Status::Complete(len)) => len,
                    Ok(httparse::Status::Partial) => return Ok(None),
                    Err(e) => return Err(parse_error(e)),
                };

                let method = Method::from_bytes(req.method.unwrap_or("").as_bytes())
                    .map_err(|_| malformed("invalid method"))?;
                let uri = req
                    .path
                    .unwrap_or("/")
                    .parse::<Uri>()
                    .map_err(|_| malformed("invalid request target"))?;

                let mut msg = Message::request(method, uri);
                msg.set_version(version(req.version));
                *msg.headers_mut() = header_map(req.headers)?;
                (len, msg)
            }
            Direction::Upstream => {
                let mut res = httparse::Response::new(&mut headers);
                let len = match res.parse(src) {
                    Ok(httparse::Status::Complete(len)) => len,
                    Ok(httparse::Status::Partial) => return Ok(None),
                    Err(e) => return Err(parse_error(e)),
                };

                let status = StatusCode::from_u16(res.code.unwrap_or(0))
                    .map_err(|_| malformed("invalid status code"))?;

                let mut msg = Message::response(status);
                msg.set_version(version(res.version));
                *msg.headers_mut() = header_map(res.headers)?;
                (len, msg)
            }
        };

        trace!("parsed message head; len={} msg={:?}", len, msg);

        let framing = match self.direction {
            Direction::Downstream => {
                self.last_id += 1;
                self.ingress_id = StreamId::from(self.last_id);
                self.response_complete = false;
                events.push_back(Event::MessageBegin {
                    id: self.ingress_id,
                });
                request_framing(&msg)?
            }
            Direction::Upstream => {
                let (id, method) = match self.pending.front() {
                    Some(&(id, ref method)) => (id, method.clone()),
                    None => return Err(malformed("response without a pending request")),
                };
                self.ingress_id = id;

                let status = msg.status().unwrap_or(StatusCode::OK);

                if status == StatusCode::SWITCHING_PROTOCOLS {
                    debug!("switching protocols; id={:?}", id);
                    self.pending.pop_front();
                    self.read = Read::Passthrough;
                    events.push_back(Event::Headers { id, msg });
                    events.push_back(Event::MessageComplete { id, upgrade: true });
                    return Ok(Some(len));
                }

                if msg.is_informational() {
                    events.push_back(Event::Headers { id, msg });
                    return Ok(Some(len));
                }

                response_framing(&msg, &method)?
            }
        };

        self.ingress_keepalive = is_keepalive(msg.version(), msg.headers());

        let id = self.ingress_id;
        match framing {
            Framing::Empty => {
                events.push_back(Event::Headers { id, msg });
                self.message_complete(events);
            }
            Framing::Length(n) => {
                events.push_back(Event::Headers { id, msg });
                self.read = Read::Length(n);
            }
            Framing::Chunked => {
                msg.set_chunked(true);
                events.push_back(Event::Headers { id, msg });
                self.read = Read::ChunkSize;
            }
            Framing::UntilClose => {
                self.ingress_keepalive = false;
                events.push_back(Event::Headers { id, msg });
                self.read = Read::UntilClose;
            }
        }

        Ok(Some(len))
    }

    fn message_complete(&mut self, events: &mut VecDeque<Event>) {
        events.push_back(Event::MessageComplete {
            id: self.ingress_id,
            upgrade: false,
        });

        match self.direction {
            Direction::Upstream => {
                self.pending.pop_front();
            }
            Direction::Downstream => {
                self.waiting_for_egress = !self.response_complete;
            }
        }

        self.read = if self.ingress_keepalive {
            Read::Head
        } else {
            Read::Closed
        };
    }

    fn parse(&mut self, src: &[u8], events: &mut VecDeque<Event>) -> Result<usize, CodecError> {
        let mut pos = 0;

        loop {
            let rem = &src[pos..];

            match self.read {
                Read::Head => {
                    if self.waiting_for_egress {
                        break;
                    }

                    // tolerate stray CRLFs between messages
                    let skip = rem.iter().take_while(|&&b| b == b'\r' || b == b'\n').count();
                    pos += skip;
                    let rem = &src[pos..];

                    if rem.is_empty() {
                        break;
                    }

                    match self.parse_head(rem, events)? {
                        Some(n) => {
                            pos += n;
                            if self.read == Read::Passthrough {
                                // stop right after the switch response
                                break;
                            }
                        }
                        None => {
                            if rem.len() > MAX_HEAD_LEN {
                                return Err(CodecError::connection(
                                    Reason::PROTOCOL_ERROR,
                                    "message head too large",
                                ));
                            }
                            break;
                        }
                    }
                }
                Read::Length(left) => {
                    if rem.is_empty() {
                        break;
                    }
                    let n = std::cmp::min(left, rem.len() as u64) as usize;
                    self.body(&rem[..n], events);
                    pos += n;

                    let left = left - n as u64;
                    if left == 0 {
                        self.message_complete(events);
                    } else {
                        self.read = Read::Length(left);
                    }
                }
                Read::UntilClose | Read::Passthrough => {
                    if !rem.is_empty() {
                        self.body(rem, events);
                        pos += rem.len();
                    }
                    break;
                }
                Read::ChunkSize => match httparse::parse_chunk_size(rem) {
                    Ok(httparse::Status::Complete((n, 0))) => {
                        pos += n;
                        self.read = Read::Trailers;
                    }
                    Ok(httparse::Status::Complete((n, size))) => {
                        pos += n;
                        events.push_back(Event::ChunkHeader {
                            id: self.ingress_id,
                            len: size as usize,
                        });
                        self.read = Read::ChunkData(size);
                    }
                    Ok(httparse::Status::Partial) => break,
                    Err(_) => return Err(malformed("invalid chunk size")),
                },
                Read::ChunkData(left) => {
                    if rem.is_empty() {
                        break;
                    }
                    let n = std::cmp::min(left, rem.len() as u64) as usize;
                    self.body(&rem[..n], events);
                    pos += n;

                    let left = left - n as u64;
                    self.read = if left == 0 {
                        Read::ChunkEnd
                    } else {
                        Read::ChunkData(left)
                    };
                }
                Read::ChunkEnd => {
                    if rem.len() < 2 {
                        break;
                    }
                    if &rem[..2] != b"\r\n" {
                        return Err(malformed("missing chunk terminator"));
                    }
                    pos += 2;
                    events.push_back(Event::ChunkComplete {
                        id: self.ingress_id,
                    });
                    self.read = Read::ChunkSize;
                }
                Read::Trailers => {
                    if rem.starts_with(b"\r\n") {
                        pos += 2;
                        self.message_complete(events);
                        continue;
                    }

                    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
                    match httparse::parse_headers(rem, &mut headers) {
                        Ok(httparse::Status::Complete((n, fields))) => {
                            let trailers = header_map(fields)?;
                            pos += n;
                            events.push_back(Event::Trailers {
                                id: self.ingress_id,
                                trailers,
                            });
                            self.message_complete(events);
                        }
                        Ok(httparse::Status::Partial) => break,
                        Err(e) => return Err(parse_error(e)),
                    }
                }
                Read::Closed => {
                    // Nothing more is expected on this connection.
                    pos = src.len();
                    break;
                }
            }
        }

        Ok(pos)
    }

    fn body(&self, chunk: &[u8], events: &mut VecDeque<Event>) {
        events.push_back(Event::Body {
            id: self.ingress_id,
            chunk: Bytes::copy_from_slice(chunk),
            padding: 0,
        });
    }

    fn finish_egress(&mut self) {
        self.egress_chunked = false;
        if self.direction == Direction::Downstream {
            self.waiting_for_egress = false;
            self.response_complete = true;
        }
    }
}

impl Codec for Http1Codec {
    fn protocol(&self) -> Protocol {
        Protocol::Http1
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn supports_parallel_requests(&self) -> bool {
        false
    }

    fn supports_stream_flow_control(&self) -> bool {
        false
    }

    fn supports_session_flow_control(&self) -> bool {
        false
    }

    fn supports_stream_reset(&self) -> bool {
        false
    }

    fn is_reusable(&self) -> bool {
        self.ingress_keepalive
            && self.egress_keepalive
            && !matches!(self.read, Read::Closed | Read::Passthrough | Read::UntilClose)
    }

    fn is_waiting_for_egress(&self) -> bool {
        self.waiting_for_egress
    }

    fn default_window_size(&self) -> u32 {
        crate::frame::DEFAULT_INITIAL_WINDOW_SIZE
    }

    fn create_stream(&mut self) -> Option<StreamId> {
        if self.direction == Direction::Downstream || self.last_id >= StreamId::MAX.into() {
            return None;
        }
        self.last_id += 1;
        Some(StreamId::from(self.last_id))
    }

    fn on_ingress(&mut self, src: &[u8], events: &mut VecDeque<Event>) -> usize {
        match self.parse(src, events) {
            Ok(n) => n,
            Err(error) => {
                debug!("HTTP/1 parse error; err={}", error);
                events.push_back(Event::Error {
                    id: self.ingress_id,
                    error,
                });
                self.read = Read::Closed;
                self.ingress_keepalive = false;
                src.len()
            }
        }
    }

    fn on_ingress_eof(&mut self, events: &mut VecDeque<Event>) {
        if let Read::UntilClose | Read::Passthrough = self.read {
            events.push_back(Event::MessageComplete {
                id: self.ingress_id,
                upgrade: false,
            });
        }
        self.read = Read::Closed;
        self.ingress_keepalive = false;
    }

    fn generate_header(
        &mut self,
        dst: &mut BytesMut,
        id: StreamId,
        msg: &Message,
        eom: bool,
    ) -> usize {
        let start = dst.len();
        let mut has_length = msg.headers().contains_key(header::CONTENT_LENGTH);
        let mut chunked = msg
            .headers()
            .get_all(header::TRANSFER_ENCODING)
            .iter()
            .any(|v| v.as_bytes().eq_ignore_ascii_case(b"chunked"));
        let v10 = msg.version() == Version::HTTP_10;
        let version = if v10 { "HTTP/1.0" } else { "HTTP/1.1" };
        let mut informational = false;

        match (msg.method(), msg.uri(), msg.status()) {
            (Some(method), Some(uri), _) => {
                let target = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
                dst.put_slice(method.as_str().as_bytes());
                dst.put_u8(b' ');
                dst.put_slice(target.as_bytes());
                dst.put_u8(b' ');
                dst.put_slice(version.as_bytes());
                dst.put_slice(b"\r\n");

                if !msg.headers().contains_key(header::HOST) {
                    if let Some(authority) = uri.authority() {
                        write_header(dst, header::HOST.as_str(), authority.as_str().as_bytes());
                    }
                }

                self.pending.push_back((id, method.clone()));

                // a request without body needs no framing headers
                if eom {
                    has_length = true;
                }
            }
            (_, _, Some(status)) => {
                informational = status.is_informational();
                dst.put_slice(version.as_bytes());
                dst.put_u8(b' ');
                dst.put_slice(status.as_str().as_bytes());
                dst.put_u8(b' ');
                dst.put_slice(status.canonical_reason().unwrap_or("").as_bytes());
                dst.put_slice(b"\r\n");

                let bodiless = status == StatusCode::NO_CONTENT
                    || status == StatusCode::NOT_MODIFIED;

                if !informational && eom && !has_length && !chunked && !bodiless {
                    write_header(dst, "content-length", b"0");
                    has_length = true;
                } else if bodiless {
                    has_length = true;
                }
            }
            _ => {}
        }

        for (name, value) in msg.headers() {
            if name == header::CONNECTION && !self.egress_keepalive {
                continue;
            }
            write_header(dst, name.as_str(), value.as_bytes());
        }

        if !informational {
            if !has_length && !chunked {
                if v10 {
                    // close delimited
                    self.egress_keepalive = false;
                } else {
                    write_header(dst, "transfer-encoding", b"chunked");
                    chunked = true;
                }
            }

            if !self.ingress_keepalive && self.direction == Direction::Downstream {
                self.egress_keepalive = false;
            }

            if !self.egress_keepalive {
                write_header(dst, "connection", b"close");
            }

            self.egress_chunked = chunked;
        }

        dst.put_slice(b"\r\n");

        if eom && !informational {
            self.finish_egress();
        }

        dst.len() - start
    }

    fn generate_body(&mut self, dst: &mut BytesMut, _id: StreamId, chunk: Bytes, eom: bool) -> usize {
        let start = dst.len();

        if self.egress_chunked {
            if !chunk.is_empty() {
                dst.put_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
                dst.put(chunk);
                dst.put_slice(b"\r\n");
            }
            if eom {
                dst.put_slice(b"0\r\n\r\n");
            }
        } else {
            dst.put(chunk);
        }

        if eom {
            self.finish_egress();
        }

        dst.len() - start
    }

    fn generate_trailers(&mut self, dst: &mut BytesMut, _id: StreamId, trailers: &HeaderMap) -> usize {
        let start = dst.len();

        // Trailers have no wire form outside of chunked framing.
        if self.egress_chunked {
            dst.put_slice(b"0\r\n");
            for (name, value) in trailers {
                write_header(dst, name.as_str(), value.as_bytes());
            }
            dst.put_slice(b"\r\n");
        }

        self.finish_egress();
        dst.len() - start
    }

    fn generate_eom(&mut self, dst: &mut BytesMut, _id: StreamId) -> usize {
        let start = dst.len();

        if self.egress_chunked {
            dst.put_slice(b"0\r\n\r\n");
        }

        self.finish_egress();
        dst.len() - start
    }

    fn generate_rst_stream(&mut self, _dst: &mut BytesMut, _id: StreamId, _reason: Reason) -> usize {
        0
    }

    fn generate_goaway(&mut self, _dst: &mut BytesMut, _last: StreamId, _reason: Reason) -> usize {
        // The next message head carries `Connection: close`.
        self.egress_keepalive = false;
        0
    }
}

fn write_header(dst: &mut BytesMut, name: &str, value: &[u8]) {
    dst.put_slice(name.as_bytes());
    dst.put_slice(b": ");
    dst.put_slice(value);
    dst.put_slice(b"\r\n");
}

fn version(v: Option<u8>) -> Version {
    match v {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    }
}

fn header_map(fields: &[httparse::Header<'_>]) -> Result<HeaderMap, CodecError> {
    let mut map = HeaderMap::with_capacity(fields.len());
    for field in fields {
        let name = HeaderName::from_bytes(field.name.as_bytes())
            .map_err(|_| malformed("invalid header name"))?;
        let value =
            HeaderValue::from_bytes(field.value).map_err(|_| malformed("invalid header value"))?;
        map.append(name, value);
    }
    Ok(map)
}

fn connection_has(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

fn is_keepalive(version: Version, headers: &HeaderMap) -> bool {
    if connection_has(headers, "close") {
        false
    } else if version == Version::HTTP_10 {
        connection_has(headers, "keep-alive")
    } else {
        true
    }
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .last()
        .map(|t| t.trim().eq_ignore_ascii_case("chunked"))
        .unwrap_or(false)
}

fn content_length(msg: &Message) -> Result<Option<u64>, CodecError> {
    match msg.headers().get(header::CONTENT_LENGTH) {
        Some(_) => msg
            .content_length()
            .map(Some)
            .ok_or_else(|| malformed("invalid content-length")),
        None => Ok(None),
    }
}

fn request_framing(msg: &Message) -> Result<Framing, CodecError> {
    if is_chunked(msg.headers()) {
        return Ok(Framing::Chunked);
    }
    match content_length(msg)? {
        Some(0) | None => Ok(Framing::Empty),
        Some(n) => Ok(Framing::Length(n)),
    }
}

fn response_framing(msg: &Message, method: &Method) -> Result<Framing, CodecError> {
    let status = msg.status().unwrap_or(StatusCode::OK);

    if method == Method::HEAD
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return Ok(Framing::Empty);
    }

    if is_chunked(msg.headers()) {
        return Ok(Framing::Chunked);
    }

    match content_length(msg)? {
        Some(0) => Ok(Framing::Empty),
        Some(n) => Ok(Framing::Length(n)),
        None => Ok(Framing::UntilClose),
    }
}

fn malformed(msg: &'static str) -> CodecError {
    CodecError::connection(Reason::PROTOCOL_ERROR, msg)
}

fn parse_error(e: httparse::Error) -> CodecError {
    CodecError::connection(Reason::PROTOCOL_ERROR, format!("malformed message head: {}", e))
}
