//! Error types for the runesync-core library.
//!
//! This module provides error handling using the `thiserror` crate, with
//! variants for codec failures, node lookups and persistence.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for runesync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all runesync operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Value does not fit the codec's representable range
    #[error("value {value} exceeds the prefix-varint range (max {max})")]
    EncodingOverflow {
        /// The value that failed to encode
        value: u128,
        /// Largest encodable value
        max: u128,
    },

    /// Fewer bytes remain than a prefix or length declares
    #[error("truncated input at offset {offset}: need {needed} bytes, have {available}")]
    TruncatedInput {
        /// Byte offset where the read started
        offset: usize,
        /// Bytes required by the prefix or length
        needed: usize,
        /// Bytes actually available
        available: usize,
    },

    /// LEB128 value wider than 64 bits
    #[error("varint at offset {offset} overflows 64 bits")]
    NumericOverflow {
        /// Byte offset where the varint started
        offset: usize,
    },

    /// Script does not start with `OP_RETURN` followed by a push of `'R'`
    #[error("missing rune marker: {details}")]
    InvalidMarker {
        /// What was found instead
        details: String,
    },

    /// Ticker cannot be expressed through the base-26 symbol transform
    #[error("symbol '{symbol}' cannot be encoded: {reason}")]
    InvalidSymbol {
        /// The offending ticker
        symbol: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Node could not be reached, timed out, or answered with an error
    #[error("node unavailable: {0}")]
    NodeUnavailable(String),

    /// Node answered but has no such block or transaction
    #[error("not found: {0}")]
    LookupNotFound(String),

    /// Persistence layer failure
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Failed to write an output file
    #[error("failed to write '{path}': {source}")]
    Io {
        /// Path being written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization failure
    #[error("failed to serialize event: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new truncated input error
    pub fn truncated(offset: usize, needed: usize, available: usize) -> Self {
        Self::TruncatedInput {
            offset,
            needed,
            available,
        }
    }

    /// Creates a new missing marker error
    pub fn invalid_marker(details: impl Into<String>) -> Self {
        Self::InvalidMarker {
            details: details.into(),
        }
    }

    /// Creates a new symbol error
    pub fn invalid_symbol(symbol: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidSymbol {
            symbol: symbol.into(),
            reason,
        }
    }

    /// Creates a new node unavailable error
    pub fn node_unavailable(msg: impl Into<String>) -> Self {
        Self::NodeUnavailable(msg.into())
    }

    /// Creates a new lookup error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::LookupNotFound(what.into())
    }

    /// Creates a new persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Creates a new I/O error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if the failure is confined to one transaction or signal
    /// and processing should move on to the next one
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::TruncatedInput { .. }
                | Self::NumericOverflow { .. }
                | Self::InvalidMarker { .. }
                | Self::NodeUnavailable(_)
                | Self::LookupNotFound(_)
        )
    }
}
