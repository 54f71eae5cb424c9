//! Signals delivered to the sync worker and the bounded queue carrying them.

use crate::error::{Error, Result};
use bitcoin::{BlockHash, Txid};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::warn;

/// Notification that something new reached the node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// A block was connected
    Block(BlockHash),
    /// A transaction was accepted to the mempool
    Transaction(Txid),
}

/// What a producer does when the queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backpressure {
    /// Wait until the worker frees a slot
    #[default]
    Block,
    /// Discard the signal and log it
    Drop,
}

/// Outcome of [`SignalSender::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The signal is in the queue
    Queued,
    /// The queue was full and the signal was discarded
    Dropped,
}

/// Cloneable producer handle for the sync queue
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: Sender<Signal>,
    backpressure: Backpressure,
}

impl SignalSender {
    /// Queue a signal according to the backpressure policy.
    ///
    /// Fails only when the worker has exited.
    pub fn send(&self, signal: Signal) -> Result<Delivery> {
        match self.backpressure {
            Backpressure::Block => self
                .tx
                .send(signal)
                .map(|()| Delivery::Queued)
                .map_err(|_| worker_gone()),
            Backpressure::Drop => match self.tx.try_send(signal) {
                Ok(()) => Ok(Delivery::Queued),
                Err(TrySendError::Full(signal)) => {
                    warn!("sync queue full, dropping {:?}", signal);
                    Ok(Delivery::Dropped)
                }
                Err(TrySendError::Disconnected(_)) => Err(worker_gone()),
            },
        }
    }

    /// Number of signals waiting
    pub fn queued(&self) -> usize {
        self.tx.len()
    }

    /// The backpressure policy of this sender
    pub fn backpressure(&self) -> Backpressure {
        self.backpressure
    }
}

fn worker_gone() -> Error {
    Error::internal("sync worker has stopped")
}

/// Creates the bounded queue between producers and the worker
pub(crate) fn queue(
    capacity: usize,
    backpressure: Backpressure,
) -> (SignalSender, Receiver<Signal>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (SignalSender { tx, backpressure }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;

    fn block(n: u8) -> Signal {
        Signal::Block(BlockHash::from_byte_array([n; 32]))
    }

    #[test]
    fn test_drop_policy_discards_when_full() {
        let (sender, rx) = queue(2, Backpressure::Drop);
        assert_eq!(sender.send(block(1)).unwrap(), Delivery::Queued);
        assert_eq!(sender.send(block(2)).unwrap(), Delivery::Queued);
        assert_eq!(sender.send(block(3)).unwrap(), Delivery::Dropped);
        assert_eq!(sender.queued(), 2);

        assert_eq!(rx.recv().unwrap(), block(1));
        assert_eq!(rx.recv().unwrap(), block(2));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_block_policy_waits_for_space() {
        let (sender, rx) = queue(1, Backpressure::Block);
        sender.send(block(1)).unwrap();

        let producer = {
            let sender = sender.clone();
            std::thread::spawn(move || sender.send(block(2)))
        };

        assert_eq!(rx.recv().unwrap(), block(1));
        assert_eq!(producer.join().unwrap().unwrap(), Delivery::Queued);
        assert_eq!(rx.recv().unwrap(), block(2));
    }

    #[test]
    fn test_send_fails_after_worker_exit() {
        let (sender, rx) = queue(1, Backpressure::Block);
        drop(rx);
        assert!(sender.send(block(1)).is_err());

        let (sender, rx) = queue(1, Backpressure::Drop);
        drop(rx);
        assert!(sender.send(block(1)).is_err());
    }
}
