//! Unsigned LEB128 integers, used inside rune payload bodies.
//!
//! Each byte carries 7 value bits, least significant group first; the
//! high bit is set on every byte except the last.

use crate::error::{Error, Result};
use bytes::BufMut;

/// Longest encoding of a 64-bit value
pub const MAX_LEN: usize = 10;

/// Decode a varint from the given bytes.
///
/// Returns the decoded value and the number of bytes consumed. Values wider
/// than 64 bits fail instead of wrapping.
pub fn decode(data: &[u8]) -> Result<(u64, usize)> {
    let mut result: u64 = 0;

    for (i, &byte) in data.iter().enumerate() {
        // The tenth byte only has room for the top bit of a u64
        if i == MAX_LEN - 1 && byte > 0x01 {
            return Err(Error::NumericOverflow { offset: 0 });
        }

        result |= u64::from(byte & 0x7F) << (7 * i);

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    Err(Error::truncated(0, data.len() + 1, data.len()))
}

/// Append the encoding of `value` to `buf`, returning the bytes written.
pub fn encode_to(mut value: u64, buf: &mut impl BufMut) -> usize {
    let mut written = 0;
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        written += 1;
        if value == 0 {
            buf.put_u8(byte);
            return written;
        }
        buf.put_u8(byte | 0x80);
    }
}

/// Encode `value` into a fresh buffer.
pub fn encode(value: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_LEN);
    encode_to(value, &mut buf);
    buf
}
