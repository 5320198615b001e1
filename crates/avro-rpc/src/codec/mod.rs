//! Binary encoding of values against a schema.
//!
//! Integers are zig-zag varints, floating point numbers little-endian, and
//! bytes/strings a long length followed by the data. Arrays and maps are
//! written as a single block followed by an empty block; the decoder also
//! accepts multiple blocks and negative block counts.

mod decode;
mod encode;

pub use decode::Decoder;
pub use encode::encode_value;

use bytes::{BufMut, BytesMut};

/// Maximum nesting of arrays, maps, records and unions while decoding.
pub const MAX_DEPTH: usize = 256;

/// Maximum number of zero-width array items (nulls, empty records, empty
/// fixed) in one decoded value. Such items cost no input bytes, so their
/// count cannot be bounded by the input length.
pub const MAX_EMPTY_ITEMS: usize = 1 << 16;

/// Write a zig-zag varint `long`.
pub fn put_long(buf: &mut BytesMut, value: i64) {
    #[allow(clippy::cast_sign_loss)]
    let mut n = ((value << 1) ^ (value >> 63)) as u64;
    while n & !0x7f != 0 {
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u8(((n & 0x7f) | 0x80) as u8);
        n >>= 7;
    }
    #[allow(clippy::cast_possible_truncation)]
    buf.put_u8(n as u8);
}

/// Write a zig-zag varint `int`.
pub fn put_int(buf: &mut BytesMut, value: i32) {
    put_long(buf, i64::from(value));
}

/// Write a `boolean`.
pub fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

/// Write length-prefixed `bytes`.
pub fn put_bytes(buf: &mut BytesMut, data: &[u8]) {
    #[allow(clippy::cast_possible_wrap)]
    put_long(buf, data.len() as i64);
    buf.put_slice(data);
}

/// Write a length-prefixed UTF-8 `string`.
pub fn put_string(buf: &mut BytesMut, value: &str) {
    put_bytes(buf, value.as_bytes());
}
