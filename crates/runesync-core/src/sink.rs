//! Events emitted by the sync engine and the sinks that consume them.

use crate::error::{Error, Result};
use crate::model::RuneTransaction;
use crate::store::{Record, RuneStore, Schema};
use bitcoin::{BlockHash, Txid};
use crossbeam_channel::Sender;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// One decode result per marker-carrying transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// The payload decoded
    Decoded {
        /// Block the transaction was found in
        block: BlockHash,
        /// The decoded transaction
        transaction: RuneTransaction,
    },
    /// The transaction carried a marker but its payload did not decode
    Failed {
        /// Block the transaction was found in
        block: BlockHash,
        /// The transaction
        txid: Txid,
        /// Why decoding failed
        error: String,
    },
}

impl SyncEvent {
    /// Transaction the event is about
    pub fn txid(&self) -> Txid {
        match self {
            SyncEvent::Decoded { transaction, .. } => transaction.hash,
            SyncEvent::Failed { txid, .. } => *txid,
        }
    }

    /// Block the event came from
    pub fn block(&self) -> BlockHash {
        match self {
            SyncEvent::Decoded { block, .. } | SyncEvent::Failed { block, .. } => *block,
        }
    }
}

/// Consumer of sync events, driven from the worker thread
pub trait EventSink: Send {
    /// Handle one event
    fn emit(&mut self, event: &SyncEvent) -> Result<()>;
}

/// Fans an event out to several sinks.
///
/// Every sink sees the event; the first failure is returned.
impl EventSink for Vec<Box<dyn EventSink>> {
    fn emit(&mut self, event: &SyncEvent) -> Result<()> {
        let mut first_error = None;
        for sink in self.iter_mut() {
            if let Err(e) = sink.emit(event) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Forwards events over a channel to another thread
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<SyncEvent>,
}

impl ChannelSink {
    /// Creates a sink feeding `tx`
    pub fn new(tx: Sender<SyncEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&mut self, event: &SyncEvent) -> Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| Error::internal("event receiver dropped"))
    }
}

/// Writes each event as one line of JSON
#[derive(Debug)]
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Creates a sink writing to `writer`
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Returns the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesSink<BufWriter<File>> {
    /// Creates (or truncates) `path` and writes events to it
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, event: &SyncEvent) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer
            .write_all(b"\n")
            .and_then(|()| self.writer.flush())
            .map_err(|e| Error::io("<event stream>", e))
    }
}

/// Persists decoded issuances and transfers through a [`RuneStore`]
#[derive(Debug)]
pub struct StoreSink<S: RuneStore> {
    store: S,
}

impl<S: RuneStore> StoreSink<S> {
    /// Migrates the rune tables and wraps the store
    pub fn new(mut store: S) -> Result<Self> {
        store.migrate(&[Schema::Rune, Schema::Transfer])?;
        Ok(Self { store })
    }

    /// Returns the underlying store
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S: RuneStore> EventSink for StoreSink<S> {
    fn emit(&mut self, event: &SyncEvent) -> Result<()> {
        let SyncEvent::Decoded { transaction, .. } = event else {
            debug!("not persisting failed decode of {}", event.txid());
            return Ok(());
        };

        if let Some(rune) = &transaction.issuance {
            self.store.create(Record::Issuance {
                txid: transaction.hash,
                rune: rune.clone(),
            })?;
        }

        for (index, assignment) in transaction.transfers.iter().enumerate() {
            self.store.create(Record::Transfer {
                txid: transaction.hash,
                index,
                assignment: *assignment,
            })?;
        }

        Ok(())
    }
}
