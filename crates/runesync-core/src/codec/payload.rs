//! Rune payload framing.
//!
//! ## Layout
//!
//! ```text
//! 'R'                          marker byte
//! repeat until exhausted:
//!   leb128 length              length of the following message
//!   message bytes
//! ```
//!
//! Messages carry no type tag; their position decides the kind. The first
//! message is a transfer list, every later one is an issuance. Inside an
//! output script the payload follows `OP_RETURN OP_PUSHBYTES_1`, so the
//! marker doubles as the single pushed byte.
//!
//! Transfer bodies are flat `(id, output, amount)` LEB128 triples. Issuance
//! bodies are a length-prefixed symbol field followed by LEB128 decimals.

use super::{leb128, symbol};
use crate::error::{Error, Result};
use crate::model::{Assignment, Rune, RunePayload};
use bitcoin::opcodes::all::{OP_PUSHBYTES_1, OP_RETURN};
use bitcoin::ScriptBuf;
use bytes::BufMut;
use tracing::trace;

/// Protocol marker, ASCII `R`
pub const MARKER: u8 = b'R';

/// Smallest encoded `(id, output, amount)` triple
pub const MIN_ASSIGNMENT_LEN: usize = 3;

/// Symbol length bytes with a historical meaning
const SYMBOL_LEN_6: u8 = 254;
const SYMBOL_LEN_8: u8 = 255;

/// A payload message, kind decided by its index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Message 0
    Transfer(Vec<Assignment>),
    /// Any message after the first
    Issuance(Rune),
}

impl Message {
    /// Decode the body of the message at `index`
    pub fn decode(index: usize, body: &[u8]) -> Result<Self> {
        if index == 0 {
            decode_transfer(body).map(Message::Transfer)
        } else {
            decode_issuance(body).map(Message::Issuance)
        }
    }
}

/// Byte cursor that reports errors at absolute offsets
struct Cursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.position)
            .ok_or_else(|| Error::truncated(self.position, 1, 0))?;
        self.position += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::truncated(self.position, len, self.remaining()));
        }
        let bytes = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    fn read_leb128(&mut self) -> Result<u64> {
        let offset = self.position;
        let (value, len) = leb128::decode(&self.data[offset..]).map_err(|e| match e {
            Error::TruncatedInput {
                needed, available, ..
            } => Error::truncated(offset, needed, available),
            Error::NumericOverflow { .. } => Error::NumericOverflow { offset },
            other => other,
        })?;
        self.position += len;
        Ok(value)
    }

    fn read_len(&mut self) -> Result<usize> {
        let offset = self.position;
        let len = self.read_leb128()?;
        usize::try_from(len).map_err(|_| Error::NumericOverflow { offset })
    }
}

/// Decode a transfer body.
///
/// Triples are read while at least [`MIN_ASSIGNMENT_LEN`] bytes remain;
/// a shorter tail is ignored.
pub fn decode_transfer(body: &[u8]) -> Result<Vec<Assignment>> {
    let mut cursor = Cursor::new(body);
    let mut assignments = Vec::new();

    while cursor.remaining() >= MIN_ASSIGNMENT_LEN {
        let id = cursor.read_leb128()?;
        let output = cursor.read_leb128()?;
        let amount = cursor.read_leb128()?;
        assignments.push(Assignment { id, output, amount });
    }

    if !cursor.is_empty() {
        trace!("ignoring {} trailing transfer bytes", cursor.remaining());
    }

    Ok(assignments)
}

/// Decode an issuance body
pub fn decode_issuance(body: &[u8]) -> Result<Rune> {
    let mut cursor = Cursor::new(body);

    let symbol_len = match cursor.read_u8()? {
        SYMBOL_LEN_6 => 6,
        SYMBOL_LEN_8 => 8,
        len => usize::from(len),
    };
    let raw_symbol = cursor.read_bytes(symbol_len)?;
    let decimals = cursor.read_leb128()?;

    Ok(Rune {
        symbol: symbol::derive_symbol(raw_symbol),
        decimals,
    })
}

/// Decode a payload starting at the `'R'` marker
pub fn decode_payload(payload: &[u8]) -> Result<RunePayload> {
    let mut cursor = Cursor::new(payload);

    let marker = cursor.read_u8()?;
    if marker != MARKER {
        return Err(Error::invalid_marker(format!(
            "payload starts with {marker:#04x}"
        )));
    }

    let mut decoded = RunePayload::default();
    let mut index = 0;
    while !cursor.is_empty() {
        let len = cursor.read_len()?;
        let body = cursor.read_bytes(len)?;

        match Message::decode(index, body)? {
            Message::Transfer(transfers) => decoded.transfers = transfers,
            Message::Issuance(rune) => {
                if decoded.issuance.is_some() {
                    trace!("message {} replaces an earlier issuance", index);
                }
                decoded.issuance = Some(rune);
            }
        }
        index += 1;
    }

    Ok(decoded)
}

/// Decode a full output script: `OP_RETURN`, a one-byte push of `'R'`,
/// then the payload messages.
pub fn decode_script(script: &[u8]) -> Result<RunePayload> {
    match script {
        [op, push, payload @ ..]
            if *op == OP_RETURN.to_u8() && *push == OP_PUSHBYTES_1.to_u8() =>
        {
            decode_payload(payload)
        }
        _ => Err(Error::invalid_marker(
            "script does not start with OP_RETURN OP_PUSHBYTES_1",
        )),
    }
}

/// Encode a transfer body
pub fn encode_transfer(assignments: &[Assignment]) -> Vec<u8> {
    let mut body = Vec::with_capacity(assignments.len() * MIN_ASSIGNMENT_LEN);
    for assignment in assignments {
        leb128::encode_to(assignment.id, &mut body);
        leb128::encode_to(assignment.output, &mut body);
        leb128::encode_to(assignment.amount, &mut body);
    }
    body
}

/// Encode an issuance body.
///
/// Fails when the ticker has no byte representation.
pub fn encode_issuance(rune: &Rune) -> Result<Vec<u8>> {
    let raw_symbol = symbol::symbol_to_bytes(&rune.symbol)?;

    let mut body = Vec::with_capacity(1 + raw_symbol.len() + leb128::MAX_LEN);
    body.put_u8(raw_symbol.len() as u8);
    body.put_slice(&raw_symbol);
    leb128::encode_to(rune.decimals, &mut body);
    Ok(body)
}

/// Encode a payload starting with the `'R'` marker.
///
/// The transfer message is always written, empty if there are no transfers,
/// so that an issuance lands at index 1.
pub fn encode_payload(payload: &RunePayload) -> Result<Vec<u8>> {
    let mut out = vec![MARKER];

    let transfer = encode_transfer(&payload.transfers);
    leb128::encode_to(transfer.len() as u64, &mut out);
    out.put_slice(&transfer);

    if let Some(rune) = &payload.issuance {
        let issuance = encode_issuance(rune)?;
        leb128::encode_to(issuance.len() as u64, &mut out);
        out.put_slice(&issuance);
    }

    Ok(out)
}

/// Encode the `OP_RETURN` output script carrying `payload`
pub fn encode_script(payload: &RunePayload) -> Result<ScriptBuf> {
    let mut script = vec![OP_RETURN.to_u8(), OP_PUSHBYTES_1.to_u8()];
    script.extend(encode_payload(payload)?);
    Ok(ScriptBuf::from_bytes(script))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rune(symbol: &str, decimals: u64) -> Rune {
        Rune {
            symbol: symbol.to_string(),
            decimals,
        }
    }

    #[test]
    fn test_single_transfer_script() {
        let script = hex::decode("6a0152040100e807").unwrap();
        let decoded = decode_script(&script).unwrap();
        assert_eq!(decoded.transfers, vec![Assignment::new(1, 0, 1000)]);
        assert_eq!(decoded.issuance, None);
    }

    #[test]
    fn test_encode_single_transfer_script() {
        let payload = RunePayload::transfers(vec![Assignment::new(1, 0, 1000)]);
        let script = encode_script(&payload).unwrap();
        assert_eq!(hex::encode(script.as_bytes()), "6a0152040100e807");
    }

    #[test]
    fn test_transfers_keep_encoding_order() {
        let transfers = vec![
            Assignment::new(7, 2, 5),
            Assignment::new(1, 0, u64::MAX),
            Assignment::new(300, 1, 0),
        ];
        let body = encode_transfer(&transfers);
        assert_eq!(decode_transfer(&body).unwrap(), transfers);
    }

    #[test]
    fn test_transfer_ignores_short_tail() {
        let mut body = encode_transfer(&[Assignment::new(1, 1, 1)]);
        body.extend([0x05, 0x06]);
        assert_eq!(decode_transfer(&body).unwrap(), vec![Assignment::new(1, 1, 1)]);

        assert!(decode_transfer(&[0x01, 0x02]).unwrap().is_empty());
        assert!(decode_transfer(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_transfer_incomplete_triple_fails() {
        // id and output present, amount continuation never ends
        let body = [0x01, 0x00, 0x80, 0x80];
        assert!(matches!(
            decode_transfer(&body),
            Err(Error::TruncatedInput { offset: 2, .. })
        ));
    }

    #[test]
    fn test_issuance_decode() {
        // symbol len 2, 1720 LE, decimals 8
        let body = [0x02, 0xB8, 0x06, 0x08];
        assert_eq!(decode_issuance(&body).unwrap(), rune("RU", 8));
    }

    #[test]
    fn test_issuance_extended_symbol_lengths() {
        let mut six = vec![SYMBOL_LEN_6];
        six.extend(17201304u32.to_le_bytes());
        six.extend([0xAA, 0xBB, 0x03]);
        assert_eq!(decode_issuance(&six).unwrap(), rune("RUNE", 3));

        let mut eight = vec![SYMBOL_LEN_8];
        eight.extend(17201304u32.to_le_bytes());
        eight.extend([0, 0, 0, 0, 0x00]);
        assert_eq!(decode_issuance(&eight).unwrap(), rune("RUNE", 0));
    }

    #[test]
    fn test_issuance_truncated_symbol() {
        let body = [SYMBOL_LEN_8, 0x01, 0x02];
        assert!(matches!(
            decode_issuance(&body),
            Err(Error::TruncatedInput { needed: 8, available: 2, .. })
        ));
    }

    #[test]
    fn test_issuance_missing_decimals() {
        assert!(matches!(
            decode_issuance(&[0x02, 0xB8, 0x06]),
            Err(Error::TruncatedInput { .. })
        ));
    }

    #[test]
    fn test_issuance_only_payload_round_trip() {
        let payload = RunePayload::default().with_issuance(rune("RUNE", 2));
        let encoded = encode_payload(&payload).unwrap();
        // 'R', empty transfer message, issuance message
        assert_eq!(encoded[..2], [MARKER, 0x00]);
        assert_eq!(decode_payload(&encoded).unwrap(), payload);
    }

    #[test]
    fn test_full_payload_round_trip() {
        let payload = RunePayload::transfers(vec![
            Assignment::new(1, 0, 21_000_000),
            Assignment::new(2, 3, 1),
        ])
        .with_issuance(rune("PEPE", 18));

        let script = encode_script(&payload).unwrap();
        assert_eq!(decode_script(script.as_bytes()).unwrap(), payload);
    }

    #[test]
    fn test_later_issuance_wins() {
        let first = encode_issuance(&rune("RUNE", 1)).unwrap();
        let second = encode_issuance(&rune("PEPE", 2)).unwrap();

        let mut payload = vec![MARKER, 0x00];
        payload.push(first.len() as u8);
        payload.extend(&first);
        payload.push(second.len() as u8);
        payload.extend(&second);

        let decoded = decode_payload(&payload).unwrap();
        assert_eq!(decoded.issuance, Some(rune("PEPE", 2)));
    }

    #[test]
    fn test_marker_only_payload_is_empty() {
        assert_eq!(decode_payload(&[MARKER]).unwrap(), RunePayload::default());
    }

    #[test]
    fn test_message_length_past_end() {
        let payload = [MARKER, 0x09, 0x01, 0x00];
        assert!(matches!(
            decode_payload(&payload),
            Err(Error::TruncatedInput { offset: 2, needed: 9, available: 2 })
        ));
    }

    #[test]
    fn test_rejects_missing_marker() {
        assert!(matches!(
            decode_payload(&[b'X', 0x00]),
            Err(Error::InvalidMarker { .. })
        ));
        assert!(matches!(
            decode_script(&[0x6a, 0x02, b'R']),
            Err(Error::InvalidMarker { .. })
        ));
        assert!(matches!(decode_script(&[0x6a]), Err(Error::InvalidMarker { .. })));
    }

    #[test]
    fn test_encode_issuance_rejects_bad_symbol() {
        assert!(matches!(
            encode_issuance(&rune("CHAD", 0)),
            Err(Error::InvalidSymbol { .. })
        ));
    }
}
