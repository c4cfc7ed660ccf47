use super::{util, Error, Head, Kind, StreamDependency, StreamId};

use bytes::{BufMut, Bytes};

use std::fmt;

/// Header frame
///
/// This could be either a request or a response. The header block is kept
/// encoded; the codec decodes it once the block is complete.
#[derive(Eq, PartialEq)]
pub struct Headers {
    /// The ID of the stream with which this frame is associated.
    stream_id: StreamId,

    /// The stream dependency information, if any.
    stream_dep: Option<StreamDependency>,

    /// The encoded header block fragment.
    header_block: Bytes,

    /// The associated flags
    flags: HeadersFlag,
}

#[derive(Copy, Clone, Eq, PartialEq)]
pub struct HeadersFlag(u8);

#[derive(Eq, PartialEq)]
pub struct PushPromise {
    /// The ID of the stream with which this frame is associated.
    stream_id: StreamId,

    /// The ID of the stream being reserved by this PushPromise.
    promised_id: StreamId,

    /// The encoded header block fragment.
    header_block: Bytes,

    /// The associated flags
    flags: PushPromiseFlag,
}

#[derive(Copy, Clone, Eq, PartialEq)]
pub struct PushPromiseFlag(u8);

#[derive(Debug, Eq, PartialEq)]
pub struct Continuation {
    /// Stream ID of continuation frame
    stream_id: StreamId,

    header_block: Bytes,

    end_headers: bool,
}

const END_STREAM: u8 = 0x1;
const END_HEADERS: u8 = 0x4;
const PADDED: u8 = 0x8;
const PRIORITY: u8 = 0x20;
const ALL: u8 = END_STREAM | END_HEADERS | PADDED | PRIORITY;

// ===== impl Headers =====

impl Headers {
    pub fn new(stream_id: StreamId, header_block: Bytes) -> Self {
        Headers {
            stream_id,
            stream_dep: None,
            header_block,
            flags: HeadersFlag::default(),
        }
    }

    /// Loads the header frame but doesn't actually do HPACK decoding.
    ///
    /// HPACK decoding is done once the block is complete, possibly after
    /// CONTINUATION frames.
    pub fn load(head: Head, mut src: Bytes) -> Result<Self, Error> {
        let flags = HeadersFlag(head.flag() & ALL);

        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        // Read the padding length
        if flags.is_padded() {
            util::strip_padding(&mut src)?;
        }

        // Read the stream dependency
        let stream_dep = if flags.is_priority() {
            if src.len() < 5 {
                return Err(Error::MalformedMessage);
            }
            let stream_dep = StreamDependency::load(&src[..5])?;

            if stream_dep.dependency_id() == head.stream_id() {
                return Err(Error::InvalidDependencyId);
            }

            let _ = src.split_to(5);

            Some(stream_dep)
        } else {
            None
        };

        Ok(Headers {
            stream_id: head.stream_id(),
            stream_dep,
            header_block: src,
            flags,
        })
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn is_end_headers(&self) -> bool {
        self.flags.is_end_headers()
    }

    pub fn is_end_stream(&self) -> bool {
        self.flags.is_end_stream()
    }

    pub fn set_end_stream(&mut self) {
        self.flags.set_end_stream()
    }

    pub fn stream_dependency(&self) -> Option<StreamDependency> {
        self.stream_dep
    }

    pub fn set_stream_dependency(&mut self, dep: StreamDependency) {
        self.stream_dep = Some(dep);
        self.flags.0 |= PRIORITY;
    }

    pub fn into_header_block(self) -> Bytes {
        self.header_block
    }

    /// Encodes the frame, spilling into CONTINUATION frames when the block is
    /// larger than `max_frame_size`.
    pub fn encode<B: BufMut>(self, max_frame_size: usize, dst: &mut B) {
        let mut prefix = Vec::with_capacity(5);
        if let Some(dep) = self.stream_dep {
            dep.encode(&mut prefix);
        }

        // END_HEADERS is decided by the splitter
        let flags = self.flags.0 & !END_HEADERS;
        encode_block(
            Kind::Headers,
            flags,
            self.stream_id,
            &prefix,
            self.header_block,
            max_frame_size,
            dst,
        );
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut builder = f.debug_struct("Headers");
        builder
            .field("stream_id", &self.stream_id)
            .field("flags", &self.flags);

        if let Some(ref dep) = self.stream_dep {
            builder.field("stream_dep", dep);
        }

        // `fields` and `pseudo` purposefully not included
        builder.finish()
    }
}

// ===== impl HeadersFlag =====

impl HeadersFlag {
    pub fn is_end_stream(&self) -> bool {
        self.0 & END_STREAM == END_STREAM
    }

    pub fn set_end_stream(&mut self) {
        self.0 |= END_STREAM;
    }

    pub fn is_end_headers(&self) -> bool {
        self.0 & END_HEADERS == END_HEADERS
    }

    pub fn is_padded(&self) -> bool {
        self.0 & PADDED == PADDED
    }

    pub fn is_priority(&self) -> bool {
        self.0 & PRIORITY == PRIORITY
    }
}

impl Default for HeadersFlag {
    /// Returns a `HeadersFlag` value with `END_HEADERS` set.
    fn default() -> Self {
        HeadersFlag(END_HEADERS)
    }
}

impl From<HeadersFlag> for u8 {
    fn from(src: HeadersFlag) -> u8 {
        src.0
    }
}

impl fmt::Debug for HeadersFlag {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let mut parts = Vec::new();
        if self.is_end_headers() {
            parts.push("END_HEADERS");
        }
        if self.is_end_stream() {
            parts.push("END_STREAM");
        }
        if self.is_padded() {
            parts.push("PADDED");
        }
        if self.is_priority() {
            parts.push("PRIORITY");
        }
        write!(fmt, "({:#x}: {})", self.0, parts.join(" | "))
    }
}

// ===== impl PushPromise =====

impl PushPromise {
    pub fn new(stream_id: StreamId, promised_id: StreamId, header_block: Bytes) -> Self {
        PushPromise {
            stream_id,
            promised_id,
            header_block,
            flags: PushPromiseFlag(END_HEADERS),
        }
    }

    pub fn load(head: Head, mut src: Bytes) -> Result<Self, Error> {
        let flags = PushPromiseFlag(head.flag() & (END_HEADERS | PADDED));

        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        if flags.is_padded() {
            util::strip_padding(&mut src)?;
        }

        if src.len() < 4 {
            return Err(Error::MalformedMessage);
        }

        let (promised_id, _) = StreamId::decode(&src[..4]);
        let _ = src.split_to(4);

        Ok(PushPromise {
            stream_id: head.stream_id(),
            promised_id,
            header_block: src,
            flags,
        })
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn promised_id(&self) -> StreamId {
        self.promised_id
    }

    pub fn is_end_headers(&self) -> bool {
        self.flags.0 & END_HEADERS == END_HEADERS
    }

    pub fn into_header_block(self) -> Bytes {
        self.header_block
    }

    pub fn encode<B: BufMut>(self, max_frame_size: usize, dst: &mut B) {
        let mut prefix = Vec::with_capacity(4);
        prefix.put_u32(self.promised_id.into());

        encode_block(
            Kind::PushPromise,
            0,
            self.stream_id,
            &prefix,
            self.header_block,
            max_frame_size,
            dst,
        );
    }
}

impl PushPromiseFlag {
    pub fn is_padded(&self) -> bool {
        self.0 & PADDED == PADDED
    }
}

impl fmt::Debug for PushPromise {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PushPromise")
            .field("stream_id", &self.stream_id)
            .field("promised_id", &self.promised_id)
            .field("flags", &self.flags.0)
            // `fields` and `pseudo` purposefully not included
            .finish()
    }
}

// ===== impl Continuation =====

impl Continuation {
    pub fn load(head: Head, src: Bytes) -> Self {
        Continuation {
            stream_id: head.stream_id(),
            header_block: src,
            end_headers: head.flag() & END_HEADERS == END_HEADERS,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn is_end_headers(&self) -> bool {
        self.end_headers
    }

    pub fn into_header_block(self) -> Bytes {
        self.header_block
    }
}

/// Writes `prefix` + `block` as one HEADERS/PUSH_PROMISE frame followed by as
/// many CONTINUATION frames as needed.
fn encode_block<B: BufMut>(
    kind: Kind,
    flags: u8,
    stream_id: StreamId,
    prefix: &[u8],
    mut block: Bytes,
    max_frame_size: usize,
    dst: &mut B,
) {
    let first_room = max_frame_size.saturating_sub(prefix.len()).max(1);
    let first = block.split_to(first_room.min(block.len()));

    let first_flags = if block.is_empty() {
        flags | END_HEADERS
    } else {
        flags
    };

    Head::new(kind, first_flags, stream_id).encode(prefix.len() + first.len(), dst);
    dst.put_slice(prefix);
    dst.put(first);

    while !block.is_empty() {
        let chunk = block.split_to(max_frame_size.min(block.len()));
        let flags = if block.is_empty() { END_HEADERS } else { 0 };

        Head::new(Kind::Continuation, flags, stream_id).encode(chunk.len(), dst);
        dst.put(chunk);
    }
}
