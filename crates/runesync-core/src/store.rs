//! Persistence capability for decoded rune records.
//!
//! [`RuneStore`] is the seam to a database; [`MemoryStore`] keeps records
//! in process and is what tests and the CLI summary use.

use crate::error::{Error, Result};
use crate::model::{Assignment, Rune};
use bitcoin::Txid;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Table descriptors passed to [`RuneStore::migrate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Schema {
    /// Issued runes
    Rune,
    /// Transfer line items
    Transfer,
}

/// A stored row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    /// A rune defined by `txid`
    Issuance {
        /// Issuing transaction
        txid: Txid,
        /// The definition
        rune: Rune,
    },
    /// One assignment of `txid`
    Transfer {
        /// Carrying transaction
        txid: Txid,
        /// Position within the transaction's transfer list
        index: usize,
        /// The assignment
        assignment: Assignment,
    },
}

impl Record {
    /// Table the record belongs to
    pub fn schema(&self) -> Schema {
        match self {
            Record::Issuance { .. } => Schema::Rune,
            Record::Transfer { .. } => Schema::Transfer,
        }
    }

    /// Transaction the record came from
    pub fn txid(&self) -> Txid {
        match self {
            Record::Issuance { txid, .. } | Record::Transfer { txid, .. } => *txid,
        }
    }
}

/// Record filters for [`RuneStore::find`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Every record
    All,
    /// Records of one transaction
    Transaction(Txid),
    /// Issuances with this ticker
    Symbol(String),
    /// Transfers of this rune id
    RuneId(u64),
}

impl Query {
    fn matches(&self, record: &Record) -> bool {
        match (self, record) {
            (Query::All, _) => true,
            (Query::Transaction(txid), record) => record.txid() == *txid,
            (Query::Symbol(symbol), Record::Issuance { rune, .. }) => rune.symbol == *symbol,
            (Query::RuneId(id), Record::Transfer { assignment, .. }) => assignment.id == *id,
            _ => false,
        }
    }
}

/// Storage for decoded records
pub trait RuneStore: Send {
    /// Prepare tables for the given schemas
    fn migrate(&mut self, schemas: &[Schema]) -> Result<()>;

    /// Insert a record
    fn create(&mut self, record: Record) -> Result<()>;

    /// Records matching `query`, in insertion order
    fn find(&self, query: &Query) -> Result<Vec<Record>>;
}

/// In-process [`RuneStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: HashSet<Schema>,
    records: Vec<Record>,
}

impl MemoryStore {
    /// Creates an empty store with no tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RuneStore for MemoryStore {
    fn migrate(&mut self, schemas: &[Schema]) -> Result<()> {
        self.tables.extend(schemas.iter().copied());
        Ok(())
    }

    fn create(&mut self, record: Record) -> Result<()> {
        let schema = record.schema();
        if !self.tables.contains(&schema) {
            return Err(Error::persistence(format!("table {schema:?} not migrated")));
        }
        self.records.push(record);
        Ok(())
    }

    fn find(&self, query: &Query) -> Result<Vec<Record>> {
        Ok(self
            .records
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect())
    }
}

/// Lets a store be written by the sync worker while other threads query it
impl<S: RuneStore> RuneStore for Arc<Mutex<S>> {
    fn migrate(&mut self, schemas: &[Schema]) -> Result<()> {
        self.lock().unwrap_or_else(PoisonError::into_inner).migrate(schemas)
    }

    fn create(&mut self, record: Record) -> Result<()> {
        self.lock().unwrap_or_else(PoisonError::into_inner).create(record)
    }

    fn find(&self, query: &Query) -> Result<Vec<Record>> {
        self.lock().unwrap_or_else(PoisonError::into_inner).find(query)
    }
}
