use super::{Codec, CodecError, Direction, Event, Protocol};
use crate::frame::{self, Frame, Head, Kind, Reason, Setting, Settings, StreamDependency, StreamId};
use crate::hpack;
use crate::message::Message;
use crate::proto::Priority;
use crate::tracing::{debug, trace};

use bytes::{BufMut, Bytes, BytesMut};
use fnv::FnvHashSet;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode, Uri, Version};

use std::collections::VecDeque;

/// The framed HTTP/2 codec.
pub struct Http2Codec {
    direction: Direction,

    /// Downstream codecs wait for the client connection preface.
    expect_preface: bool,

    encoder: hpack::Encoder,
    decoder: hpack::Decoder,

    /// `None` once the id space is exhausted.
    next_local_id: Option<StreamId>,
    last_remote_id: StreamId,

    /// A header block still waiting for CONTINUATION frames.
    partial: Option<Partial>,

    /// Streams that already received their final (non 1xx) header block; a
    /// further HEADERS frame on them carries trailers.
    final_headers: FnvHashSet<StreamId>,

    local_settings: Settings,
    peer_max_frame_size: usize,

    goaway_sent: bool,
    goaway_received: bool,
    failed: bool,
}

struct Partial {
    id: StreamId,
    kind: BlockKind,
    block: BytesMut,
}

enum BlockKind {
    Headers {
        end_stream: bool,
        dependency: Option<StreamDependency>,
    },
    PushPromise {
        promised: StreamId,
    },
}

/// Headers that must not appear in an HTTP/2 message.
const CONNECTION_HEADERS: [HeaderName; 4] = [
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    HeaderName::from_static("keep-alive"),
];

impl Http2Codec {
    pub fn new(direction: Direction) -> Http2Codec {
        let next_local_id = match direction {
            Direction::Upstream => StreamId::from(1),
            Direction::Downstream => StreamId::from(2),
        };

        Http2Codec {
            direction,
            expect_preface: direction == Direction::Downstream,
            encoder: hpack::Encoder::new(),
            decoder: hpack::Decoder::new(frame::DEFAULT_SETTINGS_HEADER_TABLE_SIZE),
            next_local_id: Some(next_local_id),
            last_remote_id: StreamId::zero(),
            partial: None,
            final_headers: FnvHashSet::default(),
            local_settings: Settings::default(),
            peer_max_frame_size: frame::DEFAULT_MAX_FRAME_SIZE as usize,
            goaway_sent: false,
            goaway_received: false,
            failed: false,
        }
    }

    fn is_local(&self, id: StreamId) -> bool {
        match self.direction {
            Direction::Upstream => id.is_client_initiated(),
            Direction::Downstream => id.is_server_initiated(),
        }
    }

    fn parse(&mut self, src: &[u8], events: &mut VecDeque<Event>) -> Result<usize, CodecError> {
        let mut pos = 0;

        if self.expect_preface {
            let n = std::cmp::min(src.len(), frame::PREFACE.len());
            if src[..n] != frame::PREFACE[..n] {
                return Err(connection_error(Reason::PROTOCOL_ERROR, "invalid connection preface"));
            }
            if n < frame::PREFACE.len() {
                return Ok(0);
            }
            self.expect_preface = false;
            pos = n;
        }

        while src.len() - pos >= frame::HEADER_LEN {
            let header = &src[pos..pos + frame::HEADER_LEN];
            let len = Head::payload_len(header);

            if len > frame::DEFAULT_MAX_FRAME_SIZE as usize {
                return Err(connection_error(Reason::FRAME_SIZE_ERROR, "frame too large"));
            }

            let end = pos + frame::HEADER_LEN + len;
            if src.len() < end {
                break;
            }

            let head = Head::parse(header);
            let payload = Bytes::copy_from_slice(&src[pos + frame::HEADER_LEN..end]);
            pos = end;

            self.recv_frame(head, payload, events)?;
        }

        Ok(pos)
    }

    fn recv_frame(
        &mut self,
        head: Head,
        payload: Bytes,
        events: &mut VecDeque<Event>,
    ) -> Result<(), CodecError> {
        if self.partial.is_some() && head.kind() != Kind::Continuation {
            return Err(connection_error(
                Reason::PROTOCOL_ERROR,
                "expected CONTINUATION frame",
            ));
        }

        let frame = match Frame::load(head, payload) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                trace!("ignoring unknown frame; head={:?}", head);
                return Ok(());
            }
            Err(frame::Error::InvalidWindowUpdateValue) if !head.stream_id().is_zero() => {
                events.push_back(Event::Error {
                    id: head.stream_id(),
                    error: CodecError::stream(Reason::PROTOCOL_ERROR, "zero window increment"),
                });
                return Ok(());
            }
            Err(e) => {
                return Err(CodecError::connection(e.reason(), e.to_string()));
            }
        };

        trace!("recv frame; frame={:?}", frame);

        match frame {
            Frame::Data(data) => {
                let id = data.stream_id();
                let end_stream = data.is_end_stream();
                let padding = data.flow_controlled_padding();
                let chunk = data.into_payload();

                if !chunk.is_empty() || padding > 0 {
                    events.push_back(Event::Body { id, chunk, padding });
                }
                if end_stream {
                    self.end_stream(id, events);
                }
            }
            Frame::Headers(headers) => {
                let partial = Partial {
                    id: headers.stream_id(),
                    kind: BlockKind::Headers {
                        end_stream: headers.is_end_stream(),
                        dependency: headers.stream_dependency(),
                    },
                    block: BytesMut::new(),
                };
                let end_headers = headers.is_end_headers();
                self.push_fragment(partial, headers.into_header_block(), end_headers, events)?;
            }
            Frame::PushPromise(promise) => {
                if self.direction == Direction::Downstream {
                    return Err(connection_error(
                        Reason::PROTOCOL_ERROR,
                        "PUSH_PROMISE sent by client",
                    ));
                }
                if !promise.promised_id().is_server_initiated() {
                    return Err(connection_error(
                        Reason::PROTOCOL_ERROR,
                        "invalid promised stream id",
                    ));
                }
                let partial = Partial {
                    id: promise.stream_id(),
                    kind: BlockKind::PushPromise {
                        promised: promise.promised_id(),
                    },
                    block: BytesMut::new(),
                };
                let end_headers = promise.is_end_headers();
                self.push_fragment(partial, promise.into_header_block(), end_headers, events)?;
            }
            Frame::Continuation(cont) => {
                let partial = match self.partial.take() {
                    Some(partial) if partial.id == cont.stream_id() => partial,
                    _ => {
                        return Err(connection_error(
                            Reason::PROTOCOL_ERROR,
                            "unexpected CONTINUATION frame",
                        ))
                    }
                };
                let end_headers = cont.is_end_headers();
                self.push_fragment(partial, cont.into_header_block(), end_headers, events)?;
            }
            Frame::Priority(frame) => {
                let dep = frame.dependency();
                events.push_back(Event::Priority {
                    id: frame.stream_id(),
                    priority: Priority::from(dep),
                });
            }
            Frame::Reset(reset) => {
                self.final_headers.remove(&reset.stream_id());
                events.push_back(Event::Abort {
                    id: reset.stream_id(),
                    reason: reset.reason(),
                });
            }
            Frame::Settings(settings) => {
                if settings.is_ack() {
                    events.push_back(Event::SettingsAck);
                } else {
                    if let Some(size) = settings.max_frame_size() {
                        self.peer_max_frame_size = size as usize;
                    }
                    events.push_back(Event::Settings(settings.to_vec()));
                }
            }
            Frame::Ping(ping) => {
                let ack = ping.is_ack();
                events.push_back(Event::Ping {
                    payload: ping.into_payload(),
                    ack,
                });
            }
            Frame::GoAway(goaway) => {
                self.goaway_received = true;
                events.push_back(Event::GoAway {
                    last_stream_id: goaway.last_stream_id(),
                    reason: goaway.reason(),
                    debug_data: goaway.debug_data().clone(),
                });
            }
            Frame::WindowUpdate(update) => {
                events.push_back(Event::WindowUpdate {
                    id: update.stream_id(),
                    increment: update.size_increment(),
                });
            }
        }

        Ok(())
    }

    fn push_fragment(
        &mut self,
        mut partial: Partial,
        fragment: Bytes,
        end_headers: bool,
        events: &mut VecDeque<Event>,
    ) -> Result<(), CodecError> {
        partial.block.extend_from_slice(&fragment);

        if end_headers {
            self.finish_block(partial, events)
        } else {
            self.partial = Some(partial);
            Ok(())
        }
    }

    fn finish_block(&mut self, partial: Partial, events: &mut VecDeque<Event>) -> Result<(), CodecError> {
        let mut fields = Vec::new();
        self.decoder
            .decode(&partial.block, |h| fields.push(h))
            .map_err(|e| CodecError::connection(Reason::COMPRESSION_ERROR, e.to_string()))?;

        let id = partial.id;

        match partial.kind {
            BlockKind::PushPromise { promised } => {
                if promised > self.last_remote_id {
                    self.last_remote_id = promised;
                }

                match build_message(fields, true) {
                    Ok(request) => events.push_back(Event::PushPromise {
                        id: promised,
                        assoc: id,
                        request,
                    }),
                    Err(msg) => events.push_back(Event::Error {
                        id: promised,
                        error: CodecError::stream(Reason::PROTOCOL_ERROR, msg),
                    }),
                }
            }
            BlockKind::Headers {
                end_stream,
                dependency,
            } => {
                if !self.is_local(id) && id > self.last_remote_id {
                    if self.direction == Direction::Upstream {
                        return Err(connection_error(
                            Reason::PROTOCOL_ERROR,
                            "HEADERS on an unpromised server stream",
                        ));
                    }
                    self.last_remote_id = id;
                    events.push_back(Event::MessageBegin { id });
                }

                if self.final_headers.contains(&id) {
                    match build_trailers(fields, end_stream) {
                        Ok(trailers) => {
                            events.push_back(Event::Trailers { id, trailers });
                            self.end_stream(id, events);
                        }
                        Err(msg) => events.push_back(Event::Error {
                            id,
                            error: CodecError::stream(Reason::PROTOCOL_ERROR, msg),
                        }),
                    }
                    return Ok(());
                }

                let request = self.direction == Direction::Downstream;
                match build_message(fields, request) {
                    Ok(mut msg) => {
                        msg.set_priority(dependency.map(Priority::from));
                        if !msg.is_informational() {
                            self.final_headers.insert(id);
                        }
                        events.push_back(Event::Headers { id, msg });
                        if end_stream {
                            self.end_stream(id, events);
                        }
                    }
                    Err(msg) => events.push_back(Event::Error {
                        id,
                        error: CodecError::stream(Reason::PROTOCOL_ERROR, msg),
                    }),
                }
            }
        }

        Ok(())
    }

    fn end_stream(&mut self, id: StreamId, events: &mut VecDeque<Event>) {
        self.final_headers.remove(&id);
        events.push_back(Event::MessageComplete { id, upgrade: false });
    }

    fn encode_block(&mut self, fields: &[(Bytes, Bytes)]) -> Bytes {
        let mut block = BytesMut::new();
        self.encoder.encode(
            fields.iter().map(|(n, v)| (&n[..], &v[..])),
            &mut block,
        );
        block.freeze()
    }
}

impl Codec for Http2Codec {
    fn protocol(&self) -> Protocol {
        Protocol::Http2
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn supports_parallel_requests(&self) -> bool {
        true
    }

    fn supports_stream_flow_control(&self) -> bool {
        true
    }

    fn supports_session_flow_control(&self) -> bool {
        true
    }

    fn supports_priority(&self) -> bool {
        true
    }

    fn supports_push(&self) -> bool {
        true
    }

    fn supports_stream_reset(&self) -> bool {
        true
    }

    fn is_reusable(&self) -> bool {
        !self.goaway_sent && !self.goaway_received && !self.failed
    }

    fn default_window_size(&self) -> u32 {
        frame::DEFAULT_INITIAL_WINDOW_SIZE
    }

    fn create_stream(&mut self) -> Option<StreamId> {
        let id = self.next_local_id?;
        self.next_local_id = id.checked_step(2);
        Some(id)
    }

    fn on_ingress(&mut self, src: &[u8], events: &mut VecDeque<Event>) -> usize {
        if self.failed {
            return src.len();
        }

        match self.parse(src, events) {
            Ok(n) => n,
            Err(error) => {
                debug!("HTTP/2 connection error; err={}", error);
                self.failed = true;
                events.push_back(Event::Error {
                    id: StreamId::zero(),
                    error,
                });
                src.len()
            }
        }
    }

    fn on_ingress_eof(&mut self, _events: &mut VecDeque<Event>) {}

    fn on_ingress_upgrade(&mut self, id: StreamId) {
        if self.is_local(id) {
            if self.next_local_id.map_or(false, |next| id >= next) {
                self.next_local_id = id.checked_step(2);
            }
        } else if id > self.last_remote_id {
            self.last_remote_id = id;
        }
        // the upgraded stream's request was already sent over HTTP/1.1
        self.expect_preface = false;
    }

    fn generate_connection_preface(&mut self, dst: &mut BytesMut) -> usize {
        if self.direction == Direction::Upstream {
            dst.put_slice(frame::PREFACE);
            frame::PREFACE.len()
        } else {
            0
        }
    }

    fn generate_header(&mut self, dst: &mut BytesMut, id: StreamId, msg: &Message, eom: bool) -> usize {
        let start = dst.len();
        let fields = message_fields(msg);
        let block = self.encode_block(&fields);

        let mut frame = frame::Headers::new(id, block);
        if let Some(pri) = msg.priority() {
            frame.set_stream_dependency(pri.into());
        }
        if eom {
            frame.set_end_stream();
        }

        trace!("encoding HEADERS; frame={:?}", frame);
        frame.encode(self.peer_max_frame_size, dst);
        dst.len() - start
    }

    fn generate_body(&mut self, dst: &mut BytesMut, id: StreamId, mut chunk: Bytes, eom: bool) -> usize {
        let start = dst.len();

        loop {
            let n = std::cmp::min(chunk.len(), self.peer_max_frame_size);
            let payload = chunk.split_to(n);
            let last = chunk.is_empty();

            let mut frame = frame::Data::new(id, payload);
            frame.set_end_stream(last && eom);
            frame.encode(dst);

            if last {
                break;
            }
        }

        dst.len() - start
    }

    fn generate_trailers(&mut self, dst: &mut BytesMut, id: StreamId, trailers: &HeaderMap) -> usize {
        let start = dst.len();
        let fields: Vec<(Bytes, Bytes)> = trailers
            .iter()
            .map(|(n, v)| {
                (
                    Bytes::copy_from_slice(n.as_str().as_bytes()),
                    Bytes::copy_from_slice(v.as_bytes()),
                )
            })
            .collect();
        let block = self.encode_block(&fields);

        let mut frame = frame::Headers::new(id, block);
        frame.set_end_stream();
        frame.encode(self.peer_max_frame_size, dst);
        dst.len() - start
    }

    fn generate_eom(&mut self, dst: &mut BytesMut, id: StreamId) -> usize {
        let start = dst.len();
        let mut frame = frame::Data::new(id, Bytes::new());
        frame.set_end_stream(true);
        frame.encode(dst);
        dst.len() - start
    }

    fn generate_rst_stream(&mut self, dst: &mut BytesMut, id: StreamId, reason: Reason) -> usize {
        let start = dst.len();
        self.final_headers.remove(&id);
        frame::Reset::new(id, reason).encode(dst);
        dst.len() - start
    }

    fn generate_goaway(&mut self, dst: &mut BytesMut, last: StreamId, reason: Reason) -> usize {
        let start = dst.len();
        self.goaway_sent = true;
        frame::GoAway::new(last, reason).encode(dst);
        dst.len() - start
    }

    fn generate_window_update(&mut self, dst: &mut BytesMut, id: StreamId, delta: u32) -> usize {
        let start = dst.len();
        frame::WindowUpdate::new(id, delta).encode(dst);
        dst.len() - start
    }

    fn generate_settings(&mut self, dst: &mut BytesMut) -> usize {
        let start = dst.len();
        self.local_settings.encode(dst);
        dst.len() - start
    }

    fn generate_settings_ack(&mut self, dst: &mut BytesMut) -> usize {
        let start = dst.len();
        Settings::ack().encode(dst);
        dst.len() - start
    }

    fn generate_priority(&mut self, dst: &mut BytesMut, id: StreamId, pri: &Priority) -> usize {
        let start = dst.len();
        frame::Priority::new(id, (*pri).into()).encode(dst);
        dst.len() - start
    }

    fn generate_push_promise(
        &mut self,
        dst: &mut BytesMut,
        assoc: StreamId,
        promised: StreamId,
        request: &Message,
    ) -> usize {
        let start = dst.len();
        let fields = message_fields(request);
        let block = self.encode_block(&fields);
        frame::PushPromise::new(assoc, promised, block).encode(self.peer_max_frame_size, dst);
        dst.len() - start
    }

    fn generate_ping_reply(&mut self, dst: &mut BytesMut, payload: [u8; 8]) -> usize {
        let start = dst.len();
        frame::Ping::pong(payload).encode(dst);
        dst.len() - start
    }

    fn set_egress_setting(&mut self, setting: Setting) {
        self.local_settings.set(setting);
    }
}

impl std::fmt::Debug for Http2Codec {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("Http2Codec")
            .field("direction", &self.direction)
            .field("next_local_id", &self.next_local_id)
            .field("last_remote_id", &self.last_remote_id)
            .finish()
    }
}

// ===== header block translation =====

/// Flattens a message into the `(name, value)` sequence HPACK encodes,
/// pseudo-headers first.
fn message_fields(msg: &Message) -> Vec<(Bytes, Bytes)> {
    let mut fields = Vec::with_capacity(msg.headers().len() + 4);
    let mut push = |n: &'static str, v: Bytes| fields.push((Bytes::from_static(n.as_bytes()), v));

    if let (Some(method), Some(uri)) = (msg.method(), msg.uri()) {
        push(":method", Bytes::copy_from_slice(method.as_str().as_bytes()));

        if method != Method::CONNECT {
            let scheme = uri.scheme_str().unwrap_or("http");
            push(":scheme", Bytes::copy_from_slice(scheme.as_bytes()));
        }

        let authority = uri
            .authority()
            .map(|a| Bytes::copy_from_slice(a.as_str().as_bytes()))
            .or_else(|| {
                msg.headers()
                    .get(header::HOST)
                    .map(|h| Bytes::copy_from_slice(h.as_bytes()))
            });
        if let Some(authority) = authority {
            push(":authority", authority);
        }

        if method != Method::CONNECT {
            let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
            push(":path", Bytes::copy_from_slice(path.as_bytes()));
        }
    } else if let Some(status) = msg.status() {
        push(":status", Bytes::copy_from_slice(status.as_str().as_bytes()));
    }

    for (name, value) in msg.headers() {
        if CONNECTION_HEADERS.contains(name) || name == header::HOST {
            continue;
        }
        fields.push((
            Bytes::copy_from_slice(name.as_str().as_bytes()),
            Bytes::copy_from_slice(value.as_bytes()),
        ));
    }

    fields
}

/// Validates a decoded header block and turns it into a message.
fn build_message(fields: Vec<hpack::Header>, request: bool) -> Result<Message, &'static str> {
    let mut method = None;
    let mut scheme = None;
    let mut authority = None;
    let mut path = None;
    let mut status = None;
    let mut headers = HeaderMap::new();
    let mut regular_seen = false;

    for field in fields {
        if field.is_pseudo() {
            if regular_seen {
                return Err("pseudo-header after regular header");
            }

            let (name, value) = field.into_parts();
            let slot = match (&name[..], request) {
                (b":method", true) => &mut method,
                (b":scheme", true) => &mut scheme,
                (b":authority", true) => &mut authority,
                (b":path", true) => &mut path,
                (b":status", false) => &mut status,
                _ => return Err("unexpected pseudo-header"),
            };
            if slot.is_some() {
                return Err("duplicate pseudo-header");
            }
            *slot = Some(value);
            continue;
        }

        regular_seen = true;
        let (name, value) = field.into_parts();
        let (name, value) = regular_header(&name, &value)?;
        headers.append(name, value);
    }

    let mut msg = if request {
        let method = method.ok_or("missing :method")?;
        let method = Method::from_bytes(&method).map_err(|_| "invalid :method")?;

        let uri = if method == Method::CONNECT {
            let authority = authority.ok_or("missing :authority")?;
            Uri::builder()
                .authority(&authority[..])
                .build()
                .map_err(|_| "invalid :authority")?
        } else {
            let path = path.ok_or("missing :path")?;
            if path.is_empty() {
                return Err("empty :path");
            }
            let scheme = scheme.ok_or("missing :scheme")?;

            let mut builder = Uri::builder();
            if let Some(ref authority) = authority {
                // an absolute form needs both scheme and authority
                builder = builder.scheme(&scheme[..]).authority(&authority[..]);
            }
            builder
                .path_and_query(&path[..])
                .build()
                .map_err(|_| "invalid request target")?
        };

        Message::request(method, uri)
    } else {
        let status = status.ok_or("missing :status")?;
        let status = StatusCode::from_bytes(&status).map_err(|_| "invalid :status")?;
        Message::response(status)
    };

    msg.set_version(Version::HTTP_2);
    *msg.headers_mut() = headers;
    Ok(msg)
}

fn build_trailers(fields: Vec<hpack::Header>, end_stream: bool) -> Result<HeaderMap, &'static str> {
    if !end_stream {
        return Err("trailers without END_STREAM");
    }

    let mut trailers = HeaderMap::new();
    for field in fields {
        if field.is_pseudo() {
            return Err("pseudo-header in trailers");
        }
        let (name, value) = field.into_parts();
        let (name, value) = regular_header(&name, &value)?;
        trailers.append(name, value);
    }
    Ok(trailers)
}

fn regular_header(name: &[u8], value: &[u8]) -> Result<(HeaderName, HeaderValue), &'static str> {
    if name.iter().any(|b| b.is_ascii_uppercase()) {
        return Err("uppercase header name");
    }

    let name = HeaderName::from_bytes(name).map_err(|_| "invalid header name")?;
    if CONNECTION_HEADERS.contains(&name) {
        return Err("connection-specific header");
    }
    if name == header::TE && value != b"trailers" {
        return Err("invalid te header");
    }

    let value = HeaderValue::from_bytes(value).map_err(|_| "invalid header value")?;
    Ok((name, value))
}

fn connection_error(reason: Reason, msg: &'static str) -> CodecError {
    CodecError::connection(reason, msg)
}
