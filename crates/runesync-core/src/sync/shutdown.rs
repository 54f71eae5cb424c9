//! Cooperative shutdown shared by the worker and its signal producers.
//!
//! Triggering drops the only sender of an empty channel, which wakes every
//! listener blocked on it at once.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Owner side: flips the flag and wakes listeners
#[derive(Debug)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    trigger: Mutex<Option<Sender<()>>>,
    listener: ShutdownListener,
}

/// Cloneable observer of a [`Shutdown`]
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    flag: Arc<AtomicBool>,
    wake: Receiver<()>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    /// Creates an untriggered shutdown
    pub fn new() -> Self {
        let flag = Arc::new(AtomicBool::new(false));
        let (trigger, wake) = crossbeam_channel::bounded(0);
        Self {
            listener: ShutdownListener {
                flag: flag.clone(),
                wake,
            },
            flag,
            trigger: Mutex::new(Some(trigger)),
        }
    }

    /// Returns a listener for another thread
    pub fn listener(&self) -> ShutdownListener {
        self.listener.clone()
    }

    /// Requests shutdown; idempotent
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Returns true once [`trigger`](Self::trigger) has been called
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl ShutdownListener {
    /// Returns true once shutdown was requested
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleeps for up to `timeout`, returning early with `true` on shutdown
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        match self.wake.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => self.is_triggered(),
            _ => true,
        }
    }

    /// Channel that becomes ready (disconnected) on shutdown, for `select!`
    pub(crate) fn wake(&self) -> &Receiver<()> {
        &self.wake
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_wait_times_out_without_trigger() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.listener().wait_timeout(Duration::from_millis(10)));
        assert!(!shutdown.is_triggered());
    }

    #[test]
    fn test_trigger_wakes_waiters() {
        let shutdown = Shutdown::new();
        let listener = shutdown.listener();

        let start = Instant::now();
        let waiter = thread::spawn(move || listener.wait_timeout(Duration::from_secs(30)));
        thread::sleep(Duration::from_millis(20));
        shutdown.trigger();

        assert!(waiter.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(30));
    }

    #[test]
    fn test_trigger_is_idempotent() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        shutdown.trigger();
        assert!(shutdown.listener().is_triggered());
        assert!(shutdown.listener().wait_timeout(Duration::from_secs(30)));
    }
}
