//! Marker detection for rune-carrying transactions.
//!
//! ## Algorithm Overview
//!
//! 1. Walk the outputs of a transaction in order
//! 2. Skip outputs paying to a standard address template
//! 3. Return the first output whose script starts with `OP_RETURN`
//!    followed by a one-byte push of `'R'`
//!
//! Only the first marker counts; any later marker outputs in the same
//! transaction are ignored.
//!
//! ## Extensibility
//!
//! The [`MarkerDetector`] trait allows custom detection rules:
//!
//! ```no_run
//! use runesync_core::detector::{MarkerDetector, RuneOutput};
//! use bitcoin::Transaction;
//!
//! struct NeverDetector;
//!
//! impl MarkerDetector for NeverDetector {
//!     fn detect(&self, _tx: &Transaction) -> Option<RuneOutput> {
//!         None
//!     }
//! }
//! ```

use crate::codec::{self, MARKER};
use crate::error::Result;
use crate::model::RuneTransaction;
use bitcoin::opcodes::all::{OP_PUSHBYTES_1, OP_RETURN};
use bitcoin::{Block, Script, ScriptBuf, Transaction, Txid};
use tracing::{debug, trace};

/// The output that carried a rune marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuneOutput {
    /// Output index within the transaction
    pub vout: usize,
    /// The full output script, marker included
    pub script: ScriptBuf,
}

impl RuneOutput {
    /// Returns the script as a slice
    pub fn as_bytes(&self) -> &[u8] {
        self.script.as_bytes()
    }
}

/// Trait for deciding whether a transaction carries rune data
pub trait MarkerDetector: Send + Sync {
    /// Return the first qualifying output, or `None` for ordinary transactions
    fn detect(&self, tx: &Transaction) -> Option<RuneOutput>;

    /// Run [`detect`](Self::detect) over every transaction of a block
    fn scan_block(&self, block: &Block) -> Vec<(Txid, RuneOutput)> {
        block
            .txdata
            .iter()
            .filter_map(|tx| self.detect(tx).map(|output| (tx.compute_txid(), output)))
            .collect()
    }
}

/// Default detector for the `OP_RETURN 'R'` marker
#[derive(Debug, Clone, Copy, Default)]
pub struct RuneDetector;

impl RuneDetector {
    /// Creates a new detector
    pub fn new() -> Self {
        Self
    }
}

impl MarkerDetector for RuneDetector {
    fn detect(&self, tx: &Transaction) -> Option<RuneOutput> {
        for (vout, output) in tx.output.iter().enumerate() {
            let script = &output.script_pubkey;

            if is_standard_template(script) {
                trace!("output {} pays to a standard template", vout);
                continue;
            }

            if is_marker_script(script) {
                debug!("rune marker in {}:{}", tx.compute_txid(), vout);
                return Some(RuneOutput {
                    vout,
                    script: script.clone(),
                });
            }
        }

        None
    }
}

/// Result of decoding one marker-carrying transaction
#[derive(Debug)]
pub struct DecodeOutcome {
    /// The transaction that carried the marker
    pub txid: Txid,
    /// Decoded payload, or why it could not be decoded
    pub result: Result<RuneTransaction>,
}

/// Detect and decode a single transaction.
///
/// Returns `None` when the transaction carries no marker.
pub fn decode_transaction(
    tx: &Transaction,
    detector: &dyn MarkerDetector,
) -> Option<Result<RuneTransaction>> {
    let output = detector.detect(tx)?;
    let txid = tx.compute_txid();
    Some(codec::decode_script(output.as_bytes()).map(|payload| RuneTransaction::new(txid, payload)))
}

/// Detect and decode every transaction in a block, in block order.
///
/// A payload that fails to decode is reported in its outcome and does not
/// affect the rest of the block.
pub fn decode_block(block: &Block, detector: &dyn MarkerDetector) -> Vec<DecodeOutcome> {
    detector
        .scan_block(block)
        .into_iter()
        .map(|(txid, output)| {
            let result = codec::decode_script(output.as_bytes())
                .map(|payload| RuneTransaction::new(txid, payload));
            if let Err(e) = &result {
                trace!("failed to decode payload of {}: {}", txid, e);
            }
            DecodeOutcome { txid, result }
        })
        .collect()
}

/// Returns true for pay-to-address scripts, which never carry a marker
pub fn is_standard_template(script: &Script) -> bool {
    script.is_p2pkh()
        || script.is_p2wpkh()
        || script.is_p2sh()
        || script.is_p2wsh()
        || script.is_p2tr()
}

/// Returns true if the script starts with `OP_RETURN OP_PUSHBYTES_1 'R'`
pub fn is_marker_script(script: &Script) -> bool {
    matches!(
        script.as_bytes(),
        [op, push, marker, ..]
            if *op == OP_RETURN.to_u8() && *push == OP_PUSHBYTES_1.to_u8() && *marker == MARKER
    )
}
