use super::table::{find_static, Index};

use bytes::{BufMut, BytesMut};

/// Encodes headers using HPACK.
///
/// The encoder never inserts into the dynamic table, so the peer's table size
/// setting never requires a size update.
#[derive(Debug, Default)]
pub struct Encoder {
    _priv: (),
}

impl Encoder {
    pub fn new() -> Encoder {
        Encoder::default()
    }

    /// Encodes a sequence of `(name, value)` fields into `dst`.
    pub fn encode<'a, I>(&mut self, headers: I, dst: &mut BytesMut)
    where
        I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
    {
        for (name, value) in headers {
            self.encode_header(name, value, dst);
        }
    }

    fn encode_header(&mut self, name: &[u8], value: &[u8], dst: &mut BytesMut) {
        match find_static(name, value) {
            Index::Indexed(idx) => {
                encode_int(idx, 7, 0x80, dst);
            }
            Index::Name(idx) => {
                encode_int(idx, 4, 0, dst);
                encode_str(value, dst);
            }
            Index::NotIndexed => {
                dst.put_u8(0);
                encode_str(name, dst);
                encode_str(value, dst);
            }
        }
    }
}

fn encode_str(val: &[u8], dst: &mut BytesMut) {
    // Huffman bit cleared
    encode_int(val.len(), 7, 0, dst);
    dst.put_slice(val);
}

/// Encode an integer into the given destination buffer
fn encode_int(mut value: usize, prefix_bits: usize, first_byte: u8, dst: &mut BytesMut) {
    if encode_int_one_byte(value, prefix_bits) {
        dst.put_u8(first_byte | value as u8);
        return;
    }

    let low = (1 << prefix_bits) - 1;

    value -= low;

    dst.put_u8(first_byte | low as u8);

    while value >= 128 {
        dst.put_u8(0b1000_0000 | value as u8);

        value >>= 7;
    }

    dst.put_u8(value as u8);
}

/// Returns true if the in the int can be fully encoded in the first byte.
fn encode_int_one_byte(value: usize, prefix_bits: usize) -> bool {
    value < (1 << prefix_bits) - 1
}
