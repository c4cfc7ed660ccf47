//! A minimal HPACK implementation.
//!
//! Covers the static table, the dynamic table with size updates, and integer
//! and literal string coding. Huffman-coded strings are not supported: the
//! encoder never produces them and the decoder rejects them.

mod decoder;
mod encoder;
mod table;

pub use self::decoder::{Decoder, DecoderError};
pub use self::encoder::Encoder;

use bytes::Bytes;

/// A decoded header field. Names are kept as raw octets, pseudo-headers
/// included.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Header {
    name: Bytes,
    value: Bytes,
}

impl Header {
    pub fn new(name: Bytes, value: Bytes) -> Header {
        Header { name, value }
    }

    fn from_static(name: &'static str, value: &'static str) -> Header {
        Header {
            name: Bytes::from_static(name.as_bytes()),
            value: Bytes::from_static(value.as_bytes()),
        }
    }

    #[cfg(test)]
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    #[cfg(test)]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn is_pseudo(&self) -> bool {
        self.name.first() == Some(&b':')
    }

    pub fn into_parts(self) -> (Bytes, Bytes) {
        (self.name, self.value)
    }

    /// Size of the entry as accounted by the dynamic table.
    pub fn len(&self) -> usize {
        32 + self.name.len() + self.value.len()
    }
}
