//! Integer and payload codecs.
//!
//! Two integer encodings coexist and are kept apart on purpose:
//!
//! - [`prefix`]: self-describing prefix-length integers (1 to 9 bytes)
//! - [`leb128`]: continuation-bit integers used inside rune payload bodies
//!
//! They are not interchangeable; data already on chain uses each one at
//! its own call sites.
//!
//! [`payload`] frames rune messages inside `OP_RETURN` scripts and
//! [`symbol`] turns raw symbol bytes into tickers.

pub mod leb128;
pub mod payload;
pub mod prefix;
pub mod symbol;

pub use payload::{
    decode_payload, decode_script, encode_payload, encode_script, Message, MARKER,
};
pub use symbol::{derive_symbol, symbol_to_bytes};
