//! Ticker derivation from raw symbol bytes.
//!
//! Up to four bytes are read as a little-endian `u32` (zero padded on the
//! right), rendered in base 10, and every pair of digits indexes the
//! alphabet. Pairs above 25 are skipped, so the transform is lossy.

use crate::error::{Error, Result};
use tracing::trace;

/// Letters addressed by two-digit indices
pub const ALPHABET: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Raw bytes that participate in derivation
pub const SYMBOL_WIDTH: usize = 4;

/// Derive the ticker for a raw symbol field.
///
/// Returns an empty string when the decimal rendering has an odd number of
/// digits or fewer than two.
pub fn derive_symbol(raw: &[u8]) -> String {
    let mut word = [0u8; SYMBOL_WIDTH];
    let n = raw.len().min(SYMBOL_WIDTH);
    word[..n].copy_from_slice(&raw[..n]);

    let digits = u32::from_le_bytes(word).to_string();
    if digits.len() < 2 || digits.len() % 2 != 0 {
        trace!("symbol digits '{}' have no letter pairing", digits);
        return String::new();
    }

    digits
        .as_bytes()
        .chunks_exact(2)
        .filter_map(|pair| {
            let index = usize::from(pair[0] - b'0') * 10 + usize::from(pair[1] - b'0');
            let letter = ALPHABET.get(index).map(|&c| char::from(c));
            if letter.is_none() {
                trace!("skipping letter index {}", index);
            }
            letter
        })
        .collect()
}

/// Inverse of [`derive_symbol`] for tickers the transform can express.
///
/// Trailing zero bytes are trimmed since derivation pads them back.
pub fn symbol_to_bytes(symbol: &str) -> Result<Vec<u8>> {
    if symbol.is_empty() {
        return Err(Error::invalid_symbol(symbol, "empty ticker"));
    }

    let mut digits = String::with_capacity(symbol.len() * 2);
    for c in symbol.chars() {
        if !c.is_ascii_uppercase() {
            return Err(Error::invalid_symbol(symbol, "only A-Z allowed"));
        }
        digits.push_str(&format!("{:02}", c as u8 - b'A'));
    }

    // A leading "0" digit vanishes in the integer rendering
    if digits.starts_with('0') {
        return Err(Error::invalid_symbol(
            symbol,
            "first letter must be K or later",
        ));
    }

    let value: u32 = digits
        .parse()
        .map_err(|_| Error::invalid_symbol(symbol, "exceeds 32 bits"))?;

    let mut bytes = value.to_le_bytes().to_vec();
    while bytes.len() > 1 && bytes.last() == Some(&0) {
        bytes.pop();
    }
    Ok(bytes)
}
