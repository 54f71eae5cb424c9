//! Polling signal producer for nodes without push notifications.

use super::{ShutdownListener, Signal, SignalSender};
use crate::error::{Error, Result};
use crate::node::NodeClient;
use bitcoin::BlockHash;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Poll the chain height every `interval` and signal each new block.
///
/// The first poll signals the current tip only; if the engine seeded its
/// window from the same tip the worker skips it as a duplicate. After that
/// every height between the last signalled block and the new tip is
/// signalled in order, so blocks mined within one interval are not lost.
/// The thread exits on shutdown or once the worker has stopped.
pub fn spawn_tip_poller(
    node: Arc<dyn NodeClient>,
    sender: SignalSender,
    interval: Duration,
    shutdown: ShutdownListener,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("runesync-poller".to_string())
        .spawn(move || poll_loop(node.as_ref(), &sender, interval, &shutdown))
        .map_err(|e| Error::internal(format!("failed to start tip poller: {e}")))
}

/// Last block handed to the worker
#[derive(Debug, Clone, Copy)]
struct Signalled {
    height: u64,
    hash: BlockHash,
}

/// Producer stopped because the worker is gone
struct Disconnected;

fn poll_loop(
    node: &dyn NodeClient,
    sender: &SignalSender,
    interval: Duration,
    shutdown: &ShutdownListener,
) {
    info!("polling chain height every {:?}", interval);
    let mut last: Option<Signalled> = None;

    loop {
        if let Err(Disconnected) = catch_up(node, sender, &mut last) {
            debug!("tip poller exiting: worker stopped");
            return;
        }

        if shutdown.wait_timeout(interval) {
            debug!("tip poller shutting down");
            return;
        }
    }
}

/// Signal every block above `last` up to the current tip.
///
/// Node failures are logged and leave `last` at the final block that was
/// signalled, so the next poll resumes from there.
fn catch_up(
    node: &dyn NodeClient,
    sender: &SignalSender,
    last: &mut Option<Signalled>,
) -> std::result::Result<(), Disconnected> {
    let tip = match node.get_block_count() {
        Ok(tip) => tip,
        Err(e) => {
            warn!("tip poll failed: {}", e);
            return Ok(());
        }
    };

    let heights = match *last {
        None => tip..=tip,
        Some(prev) if tip > prev.height => prev.height + 1..=tip,
        // Same height or a shorter chain: only a changed tip is news
        Some(prev) => {
            match node.get_block_hash(tip) {
                Ok(hash) if tip == prev.height && hash == prev.hash => {}
                Ok(hash) => {
                    debug!("tip replaced at height {}: {}", tip, hash);
                    send_block(sender, tip, hash, last)?;
                }
                Err(e) => warn!("tip poll failed at height {}: {}", tip, e),
            }
            return Ok(());
        }
    };

    for height in heights {
        match node.get_block_hash(height) {
            Ok(hash) => send_block(sender, height, hash, last)?,
            Err(e) => {
                warn!("failed to resolve height {}: {}", height, e);
                break;
            }
        }
    }
    Ok(())
}

fn send_block(
    sender: &SignalSender,
    height: u64,
    hash: BlockHash,
    last: &mut Option<Signalled>,
) -> std::result::Result<(), Disconnected> {
    debug!("new block {} at height {}", hash, height);
    if let Err(e) = sender.send(Signal::Block(hash)) {
        debug!("signal for {} not delivered: {}", hash, e);
        return Err(Disconnected);
    }
    *last = Some(Signalled { height, hash });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{signal, Backpressure, Shutdown};
    use bitcoin::hashes::Hash;
    use bitcoin::{Block, Transaction, Txid};
    use std::sync::Mutex;

    /// Chain whose height follows a script, one entry per poll
    struct Heights {
        heights: Mutex<Vec<u64>>,
        hashes: Mutex<Vec<BlockHash>>,
    }

    impl Heights {
        fn new(heights: Vec<u64>) -> Self {
            Self {
                heights: Mutex::new(heights),
                hashes: Mutex::new((0..=10).map(hash).collect()),
            }
        }
    }

    impl NodeClient for Heights {
        fn get_block_count(&self) -> Result<u64> {
            let mut heights = self.heights.lock().unwrap();
            if heights.len() > 1 {
                Ok(heights.remove(0))
            } else {
                heights
                    .first()
                    .copied()
                    .ok_or_else(|| Error::node_unavailable("down"))
            }
        }

        fn get_block_hash(&self, height: u64) -> Result<BlockHash> {
            self.hashes
                .lock()
                .unwrap()
                .get(height as usize)
                .copied()
                .ok_or_else(|| Error::not_found(format!("height {height}")))
        }

        fn get_best_block_hash(&self) -> Result<BlockHash> {
            Err(Error::node_unavailable("unused"))
        }

        fn get_block(&self, hash: &BlockHash) -> Result<Block> {
            Err(Error::not_found(hash.to_string()))
        }

        fn get_transaction(&self, txid: &Txid) -> Result<Transaction> {
            Err(Error::not_found(txid.to_string()))
        }
    }

    fn hash(n: u64) -> BlockHash {
        BlockHash::from_byte_array([n as u8; 32])
    }

    #[test]
    fn test_signals_only_new_heights() {
        let node = Arc::new(Heights::new(vec![1, 1, 2, 2]));
        let (sender, rx) = signal::queue(10, Backpressure::Block);
        let shutdown = Shutdown::new();

        let poller =
            spawn_tip_poller(node, sender, Duration::from_millis(1), shutdown.listener()).unwrap();

        assert_eq!(rx.recv().unwrap(), Signal::Block(hash(1)));
        assert_eq!(rx.recv().unwrap(), Signal::Block(hash(2)));

        shutdown.trigger();
        poller.join().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_catches_up_every_skipped_height() {
        let node = Arc::new(Heights::new(vec![1, 3]));
        let (sender, rx) = signal::queue(10, Backpressure::Block);
        let shutdown = Shutdown::new();

        let poller =
            spawn_tip_poller(node, sender, Duration::from_millis(1), shutdown.listener()).unwrap();

        assert_eq!(rx.recv().unwrap(), Signal::Block(hash(1)));
        assert_eq!(rx.recv().unwrap(), Signal::Block(hash(2)));
        assert_eq!(rx.recv().unwrap(), Signal::Block(hash(3)));

        shutdown.trigger();
        poller.join().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_first_poll_starts_at_tip() {
        let node = Heights::new(vec![5]);
        let (sender, rx) = signal::queue(10, Backpressure::Block);
        let mut last = None;

        assert!(catch_up(&node, &sender, &mut last).is_ok());
        assert_eq!(rx.try_recv().unwrap(), Signal::Block(hash(5)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_resumes_after_unresolved_height() {
        let node = Heights::new(vec![4]);
        let (sender, rx) = signal::queue(10, Backpressure::Block);
        let mut last = Some(Signalled {
            height: 1,
            hash: hash(1),
        });

        node.hashes.lock().unwrap().truncate(3);
        assert!(catch_up(&node, &sender, &mut last).is_ok());
        assert_eq!(rx.try_recv().unwrap(), Signal::Block(hash(2)));
        assert!(rx.try_recv().is_err());
        assert_eq!(last.map(|l| l.height), Some(2));

        *node.hashes.lock().unwrap() = (0..=10).map(hash).collect();
        assert!(catch_up(&node, &sender, &mut last).is_ok());
        assert_eq!(rx.try_recv().unwrap(), Signal::Block(hash(3)));
        assert_eq!(rx.try_recv().unwrap(), Signal::Block(hash(4)));
    }

    #[test]
    fn test_replaced_tip_is_signalled() {
        let node = Heights::new(vec![2]);
        let (sender, rx) = signal::queue(10, Backpressure::Block);
        let mut last = Some(Signalled {
            height: 2,
            hash: hash(9),
        });

        assert!(catch_up(&node, &sender, &mut last).is_ok());
        assert_eq!(rx.try_recv().unwrap(), Signal::Block(hash(2)));

        assert!(catch_up(&node, &sender, &mut last).is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_exits_when_worker_is_gone() {
        let node = Arc::new(Heights::new(vec![1]));
        let (sender, rx) = signal::queue(1, Backpressure::Block);
        drop(rx);

        let shutdown = Shutdown::new();
        let poller =
            spawn_tip_poller(node, sender, Duration::from_secs(30), shutdown.listener()).unwrap();
        poller.join().unwrap();
    }
}
