//! Chain synchronization engine.
//!
//! ## Algorithm Overview
//!
//! 1. **Seed**: fill a rolling window with the most recent block hashes
//!    (best effort; heights that fail to resolve are skipped)
//! 2. **Consume**: a single worker thread takes [`Signal`]s from a bounded
//!    queue, strictly in arrival order
//! 3. **Process**: for a block signal not already at the window tail, append
//!    it, fetch the block, detect and decode every marker-carrying
//!    transaction and emit one [`SyncEvent`] per transaction
//! 4. **Stop**: [`SyncHandle::stop`] lets the in-flight block finish, then
//!    the worker exits without taking further signals
//!
//! A failed block fetch drops that signal; a payload that fails to decode
//! becomes a [`SyncEvent::Failed`] and the rest of the block is processed.
//! Nothing is retried.
//!
//! ## Signal producers
//!
//! Anything holding a [`SignalSender`] can feed the engine: the
//! [`spawn_tip_poller`] loop, the ZMQ listener (with the `zmq` feature), or
//! a caller sending signals by hand.
//!
//! ```no_run
//! use runesync_core::node::{NodeConfig, RpcNode};
//! use runesync_core::sink::JsonLinesSink;
//! use runesync_core::sync::{ChainSync, SyncConfig};
//! use std::sync::Arc;
//!
//! # fn main() -> runesync_core::Result<()> {
//! let node = Arc::new(RpcNode::new(&NodeConfig::default())?);
//! let sink = Box::new(JsonLinesSink::new(std::io::stdout()));
//! let handle = ChainSync::spawn(node, sink, SyncConfig::new())?;
//! println!("recent: {:?}", handle.recent_blocks());
//! handle.stop();
//! handle.join()?;
//! # Ok(())
//! # }
//! ```

mod poller;
mod shutdown;
mod signal;
mod window;
#[cfg(feature = "zmq")]
mod listener;

pub use poller::spawn_tip_poller;
pub use shutdown::{Shutdown, ShutdownListener};
pub use signal::{Backpressure, Delivery, Signal, SignalSender};
pub use window::{BlockWindow, SharedWindow, DEFAULT_CAPACITY};
#[cfg(feature = "zmq")]
pub use listener::ZmqListener;

use crate::detector::{self, MarkerDetector, RuneDetector};
use crate::error::{Error, Result};
use crate::node::{self, NodeClient};
use crate::sink::{EventSink, SyncEvent};
use bitcoin::{BlockHash, Txid};
use crossbeam_channel::{select, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Configuration for the sync engine
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Number of recent block hashes kept in the window
    pub window_capacity: usize,
    /// Number of signals the queue holds before backpressure applies
    pub queue_capacity: usize,
    /// Interval between tip polls when polling is the signal source
    pub poll_interval: Duration,
    /// What producers do when the queue is full
    pub backpressure: Backpressure,
    /// Whether transaction signals are handed to the block handler
    pub dispatch_transactions: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            window_capacity: DEFAULT_CAPACITY,
            queue_capacity: 10,
            poll_interval: Duration::from_secs(5),
            backpressure: Backpressure::Block,
            dispatch_transactions: true,
        }
    }
}

impl SyncConfig {
    /// Creates a new sync config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the window capacity
    pub fn window_capacity(mut self, capacity: usize) -> Self {
        self.window_capacity = capacity;
        self
    }

    /// Sets the queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the tip polling interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the backpressure policy
    pub fn backpressure(mut self, policy: Backpressure) -> Self {
        self.backpressure = policy;
        self
    }

    /// Enables or disables dispatch of transaction signals
    pub fn dispatch_transactions(mut self, enabled: bool) -> Self {
        self.dispatch_transactions = enabled;
        self
    }
}

/// Counters reported by the worker when it exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Blocks fetched and scanned
    pub blocks: usize,
    /// Signals skipped because the block was already the window tail
    pub duplicates: usize,
    /// Signals dropped because the block could not be fetched
    pub fetch_failures: usize,
    /// Transactions decoded
    pub decoded: usize,
    /// Transactions whose payload failed to decode
    pub failed: usize,
}

/// Entry point for starting the engine
#[derive(Debug)]
pub struct ChainSync;

impl ChainSync {
    /// Seed the window and start the worker with the default [`RuneDetector`]
    pub fn spawn(
        node: Arc<dyn NodeClient>,
        sink: Box<dyn EventSink>,
        config: SyncConfig,
    ) -> Result<SyncHandle> {
        Self::spawn_with_detector(node, Box::new(RuneDetector::new()), sink, config)
    }

    /// Seed the window and start the worker with a custom detector
    pub fn spawn_with_detector(
        node: Arc<dyn NodeClient>,
        detector: Box<dyn MarkerDetector>,
        sink: Box<dyn EventSink>,
        config: SyncConfig,
    ) -> Result<SyncHandle> {
        let window = SharedWindow::new(BlockWindow::new(config.window_capacity));
        match node::recent_block_hashes(node.as_ref(), config.window_capacity) {
            Ok(hashes) => {
                info!("seeded window with {} block hashes", hashes.len());
                window.seed(hashes);
            }
            Err(e) => warn!("could not seed block window: {}", e),
        }

        let (sender, signals) = signal::queue(config.queue_capacity, config.backpressure);
        let shutdown = Arc::new(Shutdown::new());

        let worker = Worker {
            node,
            detector,
            sink,
            window: window.clone(),
            shutdown: shutdown.listener(),
            dispatch_transactions: config.dispatch_transactions,
            stats: SyncStats::default(),
        };

        let thread = thread::Builder::new()
            .name("runesync-worker".to_string())
            .spawn(move || worker.run(signals))
            .map_err(|e| Error::internal(format!("failed to start sync worker: {e}")))?;

        Ok(SyncHandle {
            sender,
            window,
            shutdown,
            thread,
        })
    }
}

/// Handle to a running engine
#[derive(Debug)]
pub struct SyncHandle {
    sender: SignalSender,
    window: SharedWindow,
    shutdown: Arc<Shutdown>,
    thread: JoinHandle<SyncStats>,
}

impl SyncHandle {
    /// A producer handle for the signal queue
    pub fn sender(&self) -> SignalSender {
        self.sender.clone()
    }

    /// Consistent copy of the recent block hashes, oldest first
    pub fn recent_blocks(&self) -> Vec<BlockHash> {
        self.window.snapshot()
    }

    /// The engine's shutdown, for stopping it from another thread
    pub fn shutdown(&self) -> Arc<Shutdown> {
        self.shutdown.clone()
    }

    /// A listener that observes the engine's shutdown
    pub fn shutdown_listener(&self) -> ShutdownListener {
        self.shutdown.listener()
    }

    /// Request a cooperative stop; the in-flight block still finishes
    pub fn stop(&self) {
        self.shutdown.trigger();
    }

    /// Wait for the worker to exit and return its counters.
    ///
    /// Call [`stop`](Self::stop) first, or this blocks for as long as
    /// signals keep arriving.
    pub fn join(self) -> Result<SyncStats> {
        let Self { sender, thread, .. } = self;
        drop(sender);
        thread
            .join()
            .map_err(|_| Error::internal("sync worker panicked"))
    }
}

struct Worker {
    node: Arc<dyn NodeClient>,
    detector: Box<dyn MarkerDetector>,
    sink: Box<dyn EventSink>,
    window: SharedWindow,
    shutdown: ShutdownListener,
    dispatch_transactions: bool,
    stats: SyncStats,
}

impl Worker {
    fn run(mut self, signals: Receiver<Signal>) -> SyncStats {
        info!("sync worker started");
        let wake = self.shutdown.wake().clone();

        loop {
            select! {
                recv(wake) -> _ => break,
                recv(signals) -> signal => {
                    let Ok(signal) = signal else {
                        debug!("all signal senders dropped");
                        break;
                    };
                    if self.shutdown.is_triggered() {
                        break;
                    }
                    self.handle(signal);
                }
            }
        }

        let pending = signals.len();
        if pending > 0 {
            debug!("discarding {} queued signals", pending);
        }
        info!("sync worker stopped: {:?}", self.stats);
        self.stats
    }

    fn handle(&mut self, signal: Signal) {
        match signal {
            Signal::Block(hash) => {
                if !self.window.push(hash) {
                    debug!("block {} is already the window tail", hash);
                    self.stats.duplicates += 1;
                    return;
                }
                self.process_block(hash);
            }
            Signal::Transaction(txid) if self.dispatch_transactions => {
                // Transaction signals go through the block handler keyed by
                // the txid, as the node notification wiring always has. The
                // lookup is expected to fail and drop the signal.
                self.process_block(txid_as_block_hash(txid));
            }
            Signal::Transaction(txid) => {
                debug!("ignoring transaction signal {}", txid);
            }
        }
    }

    fn process_block(&mut self, hash: BlockHash) {
        let block = match self.node.get_block(&hash) {
            Ok(block) => block,
            Err(e) => {
                warn!("dropping signal for {}: {}", hash, e);
                self.stats.fetch_failures += 1;
                return;
            }
        };
        self.stats.blocks += 1;

        let outcomes = detector::decode_block(&block, self.detector.as_ref());
        debug!("block {}: {} rune transactions", hash, outcomes.len());

        for outcome in outcomes {
            let event = match outcome.result {
                Ok(transaction) => {
                    self.stats.decoded += 1;
                    SyncEvent::Decoded {
                        block: hash,
                        transaction,
                    }
                }
                Err(e) => {
                    warn!("failed to decode {}: {}", outcome.txid, e);
                    self.stats.failed += 1;
                    SyncEvent::Failed {
                        block: hash,
                        txid: outcome.txid,
                        error: e.to_string(),
                    }
                }
            };

            if let Err(e) = self.sink.emit(&event) {
                error!("event sink failed for {}: {}", event.txid(), e);
            }
        }
    }
}

fn txid_as_block_hash(txid: Txid) -> BlockHash {
    BlockHash::from_raw_hash(txid.to_raw_hash())
}
