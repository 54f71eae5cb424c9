//! Prefix-length variable integers.
//!
//! The number of leading 1-bits in the first byte says how many bytes
//! follow. The remaining low bits of the first byte hold the least
//! significant bits of the value, the following bytes hold the rest in
//! little-endian order:
//!
//! | value bits | bytes | first byte            |
//! |------------|-------|-----------------------|
//! | 0-7        | 1     | `0xxxxxxx`            |
//! | 8-14       | 2     | `10xxxxxx`            |
//! | 15-21      | 3     | `110xxxxx`            |
//! | 22-28      | 4     | `1110xxxx`            |
//! | 29-35      | 5     | `11110xxx`            |
//! | 36-42      | 6     | `111110xx`            |
//! | 43-49      | 7     | `1111110x`            |
//! | 50-56      | 8     | `0xFE`                |
//! | 57-64      | 9     | `0xFF`                |
//!
//! Every first byte is a valid prefix, so decoding can only fail on
//! truncated input.

use crate::error::{Error, Result};
use bytes::BufMut;

/// Longest encoding in bytes
pub const MAX_ENCODED_LEN: usize = 9;

/// Largest encodable value
pub const MAX_VALUE: u128 = u64::MAX as u128;

const SENTINEL_8: u8 = 0xFE;
const SENTINEL_9: u8 = 0xFF;

/// Number of bytes [`encode`] produces for `value`.
pub fn encoded_len(value: u64) -> usize {
    let bits = u64::BITS - value.leading_zeros();
    if bits > 56 {
        MAX_ENCODED_LEN
    } else {
        bits.div_ceil(7).max(1) as usize
    }
}

/// Encode `value` using the minimum number of bytes.
pub fn encode(value: u128) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(MAX_ENCODED_LEN);
    encode_to(value, &mut buf)?;
    Ok(buf)
}

/// Encode `value` into `buf`, returning the number of bytes written.
pub fn encode_to(value: u128, buf: &mut impl BufMut) -> Result<usize> {
    let value = u64::try_from(value).map_err(|_| Error::EncodingOverflow {
        value,
        max: MAX_VALUE,
    })?;

    let len = encoded_len(value);
    match len {
        1 => buf.put_u8(value as u8),
        8 => {
            buf.put_u8(SENTINEL_8);
            buf.put_slice(&value.to_le_bytes()[..7]);
        }
        9 => {
            buf.put_u8(SENTINEL_9);
            buf.put_u64_le(value);
        }
        n => {
            let low_bits = 8 - n;
            let prefix = !(0xFFu8 >> (n - 1));
            let low = (value & ((1 << low_bits) - 1)) as u8;
            buf.put_u8(prefix | low);
            buf.put_slice(&(value >> low_bits).to_le_bytes()[..n - 1]);
        }
    }

    Ok(len)
}

/// Decode a prefix varint from the start of `data`.
///
/// Returns the decoded value and the number of bytes consumed. Over-long
/// encodings are accepted.
pub fn decode(data: &[u8]) -> Result<(u128, usize)> {
    let Some(&first) = data.first() else {
        return Err(Error::truncated(0, 1, 0));
    };

    let len = (first.leading_ones() as usize + 1).min(MAX_ENCODED_LEN);
    if data.len() < len {
        return Err(Error::truncated(0, len, data.len()));
    }

    let tail = &data[1..len];
    let value = match len {
        1 => u64::from(first),
        8 | 9 => read_le(tail),
        n => {
            let low_bits = 8 - n;
            let low = u64::from(first) & ((1 << low_bits) - 1);
            low | (read_le(tail) << low_bits)
        }
    };

    Ok((u128::from(value), len))
}

fn read_le(bytes: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    word[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(word)
}
