//! Rolling window of recently seen block hashes.

use bitcoin::BlockHash;
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

/// Default number of hashes kept
pub const DEFAULT_CAPACITY: usize = 10;

/// Bounded, ordered list of block hashes, oldest first
#[derive(Debug, Clone)]
pub struct BlockWindow {
    hashes: VecDeque<BlockHash>,
    capacity: usize,
}

impl Default for BlockWindow {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BlockWindow {
    /// Creates an empty window holding at most `capacity` hashes
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            hashes: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity,
        }
    }

    /// Replaces the contents with `hashes`, keeping the newest ones
    pub fn seed(&mut self, hashes: impl IntoIterator<Item = BlockHash>) {
        self.hashes.clear();
        for hash in hashes {
            self.append(hash);
        }
    }

    /// Appends `hash` unless it is already the tail.
    ///
    /// Returns false for a repeat of the tail. Only the tail is compared, so
    /// a hash seen earlier in the window is appended again.
    pub fn push(&mut self, hash: BlockHash) -> bool {
        if self.tail() == Some(hash) {
            return false;
        }
        self.append(hash);
        true
    }

    fn append(&mut self, hash: BlockHash) {
        if self.hashes.len() == self.capacity {
            self.hashes.pop_front();
        }
        self.hashes.push_back(hash);
    }

    /// Most recently appended hash
    pub fn tail(&self) -> Option<BlockHash> {
        self.hashes.back().copied()
    }

    /// Copy of the contents, oldest first
    pub fn snapshot(&self) -> Vec<BlockHash> {
        self.hashes.iter().copied().collect()
    }

    /// Number of hashes held
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// Returns true if no hash is held
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Maximum number of hashes held
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Window shared between the sync worker (sole writer) and readers
#[derive(Debug, Clone, Default)]
pub struct SharedWindow {
    inner: Arc<RwLock<BlockWindow>>,
}

impl SharedWindow {
    /// Wraps a window for sharing
    pub fn new(window: BlockWindow) -> Self {
        Self {
            inner: Arc::new(RwLock::new(window)),
        }
    }

    /// Consistent copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<BlockHash> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    pub(crate) fn seed(&self, hashes: Vec<BlockHash>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .seed(hashes);
    }

    pub(crate) fn push(&self, hash: BlockHash) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hash)
    }
}
