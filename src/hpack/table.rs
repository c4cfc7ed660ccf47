use super::{DecoderError, Header};

use std::collections::VecDeque;

/// Number of entries in the static table.
pub const STATIC_LEN: usize = 61;

/// The HPACK static table, 1-indexed on the wire.
static STATIC_TABLE: [(&str, &str); STATIC_LEN] = [
    (":authority", ""),
    (":method", "GET"),
    (":method", "POST"),
    (":path", "/"),
    (":path", "/index.html"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "200"),
    (":status", "204"),
    (":status", "206"),
    (":status", "304"),
    (":status", "400"),
    (":status", "404"),
    (":status", "500"),
    ("accept-charset", ""),
    ("accept-encoding", "gzip, deflate"),
    ("accept-language", ""),
    ("accept-ranges", ""),
    ("accept", ""),
    ("access-control-allow-origin", ""),
    ("age", ""),
    ("allow", ""),
    ("authorization", ""),
    ("cache-control", ""),
    ("content-disposition", ""),
    ("content-encoding", ""),
    ("content-language", ""),
    ("content-length", ""),
    ("content-location", ""),
    ("content-range", ""),
    ("content-type", ""),
    ("cookie", ""),
    ("date", ""),
    ("etag", ""),
    ("expect", ""),
    ("expires", ""),
    ("from", ""),
    ("host", ""),
    ("if-match", ""),
    ("if-modified-since", ""),
    ("if-none-match", ""),
    ("if-range", ""),
    ("if-unmodified-since", ""),
    ("last-modified", ""),
    ("link", ""),
    ("location", ""),
    ("max-forwards", ""),
    ("proxy-authenticate", ""),
    ("proxy-authorization", ""),
    ("range", ""),
    ("referer", ""),
    ("refresh", ""),
    ("retry-after", ""),
    ("server", ""),
    ("set-cookie", ""),
    ("strict-transport-security", ""),
    ("transfer-encoding", ""),
    ("user-agent", ""),
    ("vary", ""),
    ("via", ""),
    ("www-authenticate", ""),
];

/// Result of looking a header up in the static table.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Index {
    /// Name and value both match.
    Indexed(usize),
    /// Only the name matches.
    Name(usize),
    NotIndexed,
}

/// Finds the best static table entry for the given field.
pub fn find_static(name: &[u8], value: &[u8]) -> Index {
    let mut found = Index::NotIndexed;

    for (i, &(n, v)) in STATIC_TABLE.iter().enumerate() {
        if n.as_bytes() != name {
            continue;
        }

        if v.as_bytes() == value {
            return Index::Indexed(i + 1);
        }

        if found == Index::NotIndexed {
            found = Index::Name(i + 1);
        }
    }

    found
}

/// The decoder's view of the header table: the static entries followed by
/// the dynamic entries, in one index address space.
pub struct Table {
    entries: VecDeque<Header>,
    size: usize,
    max_size: usize,
}

impl Table {
    pub fn new(max_size: usize) -> Table {
        Table {
            entries: VecDeque::new(),
            size: 0,
            max_size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the entry located at the given index.
    ///
    /// This is according to [RFC 7541, section 2.3.3].
    ///
    /// [RFC 7541, section 2.3.3]: https://tools.ietf.org/html/rfc7541#section-2.3.3
    pub fn get(&self, index: usize) -> Result<Header, DecoderError> {
        if index == 0 {
            return Err(DecoderError::InvalidTableIndex);
        }

        if index <= STATIC_LEN {
            let (name, value) = STATIC_TABLE[index - 1];
            return Ok(Header::from_static(name, value));
        }

        match self.entries.get(index - STATIC_LEN - 1) {
            Some(e) => Ok(e.clone()),
            None => Err(DecoderError::InvalidTableIndex),
        }
    }

    pub fn insert(&mut self, entry: Header) {
        let len = entry.len();

        // An entry larger than the table empties it and is not stored.
        if len > self.max_size {
            self.entries.clear();
            self.size = 0;
            return;
        }

        self.reserve(len);
        self.size += len;
        self.entries.push_front(entry);
    }

    pub fn set_max_size(&mut self, size: usize) {
        self.max_size = size;
        self.reserve(0);
    }

    fn reserve(&mut self, size: usize) {
        while self.size + size > self.max_size {
            match self.entries.pop_back() {
                Some(last) => self.size -= last.len(),
                None => break,
            }
        }
    }
}
