use super::table::Table;
use super::Header;

use bytes::{Buf, Bytes};

use std::fmt;

/// Decodes headers using HPACK
pub struct Decoder {
    /// The table size we announced; size updates may not exceed it.
    max_size: usize,
    table: Table,
}

/// Represents all errors that can be encountered while performing the decoding
/// of an HPACK header set.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DecoderError {
    InvalidRepresentation,
    InvalidIntegerPrefix,
    InvalidTableIndex,
    InvalidMaxDynamicSize,
    HuffmanUnsupported,
    IntegerOverflow,
    Truncated,
}

enum Representation {
    /// Indexed header field representation
    ///
    /// ```text
    ///   0   1   2   3   4   5   6   7
    /// +---+---+---+---+---+---+---+---+
    /// | 1 |        Index (7+)         |
    /// +---+---------------------------+
    /// ```
    Indexed,

    /// Literal Header Field with Incremental Indexing
    ///
    /// ```text
    ///   0   1   2   3   4   5   6   7
    /// +---+---+---+---+---+---+---+---+
    /// | 0 | 1 |      Index (6+)       |
    /// +---+---+-----------------------+
    /// ```
    LiteralWithIndexing,

    /// Literal Header Field without Indexing
    ///
    /// ```text
    ///   0   1   2   3   4   5   6   7
    /// +---+---+---+---+---+---+---+---+
    /// | 0 | 0 | 0 | 0 |  Index (4+)   |
    /// +---+---+-----------------------+
    /// ```
    LiteralWithoutIndexing,

    /// Literal Header Field Never Indexed
    ///
    /// ```text
    ///   0   1   2   3   4   5   6   7
    /// +---+---+---+---+---+---+---+---+
    /// | 0 | 0 | 0 | 1 |  Index (4+)   |
    /// +---+---+-----------------------+
    /// ```
    LiteralNeverIndexed,

    /// Dynamic Table Size Update
    ///
    /// ```text
    ///   0   1   2   3   4   5   6   7
    /// +---+---+---+---+---+---+---+---+
    /// | 0 | 0 | 1 |   Max size (5+)   |
    /// +---+---------------------------+
    /// ```
    SizeUpdate,
}

// ===== impl Decoder =====

impl Decoder {
    /// Creates a new `Decoder` with all settings set to default values.
    pub fn new(size: usize) -> Decoder {
        Decoder {
            max_size: size,
            table: Table::new(size),
        }
    }

    /// Decodes the headers found in the given buffer.
    pub fn decode<F>(&mut self, src: &[u8], mut f: F) -> Result<(), DecoderError>
    where
        F: FnMut(Header),
    {
        use self::Representation::*;

        let mut buf = src;
        let mut can_resize = true;

        while buf.has_remaining() {
            // At this point we are always at the beginning of the next block
            // within the HPACK data. The type of the block can always be
            // determined from the first byte.
            match Representation::load(buf[0])? {
                Indexed => {
                    can_resize = false;
                    let index = decode_int(&mut buf, 7)?;
                    f(self.table.get(index)?);
                }
                LiteralWithIndexing => {
                    can_resize = false;
                    let entry = self.decode_literal(&mut buf, 6)?;
                    self.table.insert(entry.clone());
                    f(entry);
                }
                LiteralWithoutIndexing | LiteralNeverIndexed => {
                    can_resize = false;
                    f(self.decode_literal(&mut buf, 4)?);
                }
                SizeUpdate => {
                    if !can_resize {
                        return Err(DecoderError::InvalidMaxDynamicSize);
                    }

                    let new_size = decode_int(&mut buf, 5)?;
                    if new_size > self.max_size {
                        return Err(DecoderError::InvalidMaxDynamicSize);
                    }

                    self.table.set_max_size(new_size);
                }
            }
        }

        Ok(())
    }

    fn decode_literal(&self, buf: &mut &[u8], prefix: u8) -> Result<Header, DecoderError> {
        // Extract the table index for the name, or 0 if not indexed
        let table_idx = decode_int(buf, prefix)?;

        let name = if table_idx == 0 {
            decode_string(buf)?
        } else {
            let (name, _) = self.table.get(table_idx)?.into_parts();
            name
        };

        let value = decode_string(buf)?;

        Ok(Header::new(name, value))
    }
}

// ===== impl Representation =====

impl Representation {
    pub fn load(byte: u8) -> Result<Representation, DecoderError> {
        const INDEXED: u8 = 0b1000_0000;
        const LITERAL_WITH_INDEXING: u8 = 0b0100_0000;
        const SIZE_UPDATE_MASK: u8 = 0b1110_0000;
        const SIZE_UPDATE: u8 = 0b0010_0000;
        const LITERAL_MASK: u8 = 0b1111_0000;
        const LITERAL_NEVER_INDEXED: u8 = 0b0001_0000;

        if byte & INDEXED == INDEXED {
            Ok(Representation::Indexed)
        } else if byte & LITERAL_WITH_INDEXING == LITERAL_WITH_INDEXING {
            Ok(Representation::LiteralWithIndexing)
        } else if byte & SIZE_UPDATE_MASK == SIZE_UPDATE {
            Ok(Representation::SizeUpdate)
        } else if byte & LITERAL_MASK == LITERAL_NEVER_INDEXED {
            Ok(Representation::LiteralNeverIndexed)
        } else if byte & LITERAL_MASK == 0 {
            Ok(Representation::LiteralWithoutIndexing)
        } else {
            Err(DecoderError::InvalidRepresentation)
        }
    }
}

fn decode_string(buf: &mut &[u8]) -> Result<Bytes, DecoderError> {
    const HUFF_FLAG: u8 = 0b1000_0000;

    if !buf.has_remaining() {
        return Err(DecoderError::Truncated);
    }

    if buf[0] & HUFF_FLAG == HUFF_FLAG {
        return Err(DecoderError::HuffmanUnsupported);
    }

    let len = decode_int(buf, 7)?;

    if len > buf.remaining() {
        return Err(DecoderError::Truncated);
    }

    Ok(buf.copy_to_bytes(len))
}

fn decode_int<B: Buf>(buf: &mut B, prefix_size: u8) -> Result<usize, DecoderError> {
    // The octet limit is chosen such that the maximum allowed *value* can
    // never overflow an unsigned 32-bit integer. The maximum value of any
    // integer that can be encoded with 5 octets is ~2^28
    const MAX_BYTES: usize = 5;
    const VARINT_MASK: u8 = 0b0111_1111;
    const VARINT_FLAG: u8 = 0b1000_0000;

    if !(1..=8).contains(&prefix_size) {
        return Err(DecoderError::InvalidIntegerPrefix);
    }

    if !buf.has_remaining() {
        return Err(DecoderError::Truncated);
    }

    let mask = if prefix_size == 8 {
        0xFF
    } else {
        (1u8 << prefix_size).wrapping_sub(1)
    };

    let mut ret = (buf.get_u8() & mask) as usize;

    if ret < mask as usize {
        // Value fits in the prefix bits
        return Ok(ret);
    }

    // The int did not fit in the prefix bits, so continue reading.
    //
    // The total number of bytes used to represent the int. The first byte was
    // the prefix, so start at 1.
    let mut bytes = 1;

    // The rest of the int is stored as a varint -- 7 bits for the value and 1
    // bit to indicate if it is the last byte.
    let mut shift = 0;

    while buf.has_remaining() {
        let b = buf.get_u8();

        bytes += 1;
        ret += ((b & VARINT_MASK) as usize) << shift;
        shift += 7;

        if b & VARINT_FLAG == 0 {
            return Ok(ret);
        }

        if bytes == MAX_BYTES {
            // RFC 7541 §5.1 makes this a decoding error
            return Err(DecoderError::IntegerOverflow);
        }
    }

    Err(DecoderError::Truncated)
}

impl fmt::Display for DecoderError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let msg = match *self {
            DecoderError::InvalidRepresentation => "invalid header representation",
            DecoderError::InvalidIntegerPrefix => "invalid integer prefix",
            DecoderError::InvalidTableIndex => "invalid table index",
            DecoderError::InvalidMaxDynamicSize => "invalid dynamic table size update",
            DecoderError::HuffmanUnsupported => "huffman-coded strings are not supported",
            DecoderError::IntegerOverflow => "integer overflow",
            DecoderError::Truncated => "truncated header block",
        };
        fmt.write_str(msg)
    }
}
