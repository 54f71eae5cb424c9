//! # runesync-core
//!
//! A library for decoding Rune token data carried in Bitcoin `OP_RETURN`
//! outputs and following the chain as new blocks arrive.
//!
//! This crate provides the core functionality for:
//! - Encoding and decoding the two integer schemes used by the protocol
//! - Detecting marker outputs and decoding issuance and transfer payloads
//! - Fetching blocks and transactions from a node
//! - Running a single-worker sync engine that emits one event per rune
//!   transaction
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`codec`]: Prefix-varint, LEB128, payload framing and symbol derivation
//! - [`detector`]: Marker detection over transactions and blocks
//! - [`model`]: Decoded records (`Rune`, `Assignment`, `RuneTransaction`)
//! - [`node`]: The node capability and its JSON-RPC implementation
//! - [`sync`]: Block window, signal queue and the sync worker
//! - [`sink`]: Events emitted by the engine and their consumers
//! - [`store`]: Persistence capability for decoded records
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```
//! use runesync_core::codec;
//!
//! let script = hex_literal("6a0152040100e807");
//! let payload = codec::decode_script(&script)?;
//!
//! assert_eq!(payload.transfers.len(), 1);
//! assert_eq!(payload.transfers[0].amount, 1000);
//! assert!(payload.issuance.is_none());
//! # fn hex_literal(s: &str) -> Vec<u8> {
//! #     (0..s.len()).step_by(2).map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap()).collect()
//! # }
//! # Ok::<(), runesync_core::Error>(())
//! ```
//!
//! ## Extensibility
//!
//! The library provides several traits for customization:
//!
//! - [`MarkerDetector`]: Customize which outputs count as rune carriers
//! - [`NodeClient`]: Plug in another node backend
//! - [`EventSink`]: Consume sync events
//! - [`RuneStore`]: Persist decoded records
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod codec;
pub mod detector;
pub mod error;
pub mod model;
pub mod node;
pub mod sink;
pub mod store;
pub mod sync;

// Re-export primary types for convenience
pub use detector::{DecodeOutcome, MarkerDetector, RuneDetector, RuneOutput};
pub use error::{Error, Result};
pub use model::{Assignment, Rune, RunePayload, RuneTransaction};
pub use node::{NodeClient, NodeConfig, RpcNode};
pub use sink::{EventSink, JsonLinesSink, StoreSink, SyncEvent};
pub use store::{MemoryStore, RuneStore};
pub use sync::{ChainSync, SignalSender, SyncConfig, SyncHandle};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
