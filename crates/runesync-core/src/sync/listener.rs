//! ZMQ signal producer fed by the node's `hashblock` and `hashtx` topics.

use super::{ShutdownListener, Signal, SignalSender};
use crate::error::{Error, Result};
use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, Txid};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

const TOPIC_BLOCK: &[u8] = b"hashblock";
const TOPIC_TX: &[u8] = b"hashtx";

/// Subscribes to a node's ZMQ publisher and forwards hash notifications
#[derive(Debug, Clone)]
pub struct ZmqListener {
    endpoint: String,
    poll_timeout: Duration,
}

impl ZmqListener {
    /// Creates a listener for `endpoint`, e.g. `tcp://127.0.0.1:28332`
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            poll_timeout: Duration::from_millis(500),
        }
    }

    /// How long a receive blocks before the shutdown flag is checked again
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Connect, subscribe and start forwarding on a new thread.
    ///
    /// Connection errors are returned here; errors after that end the
    /// thread with a warning.
    pub fn spawn(self, sender: SignalSender, shutdown: ShutdownListener) -> Result<JoinHandle<()>> {
        let context = zmq::Context::new();
        let socket = context.socket(zmq::SUB).map_err(zmq_error)?;

        info!("connecting to ZMQ at {}", self.endpoint);
        socket.connect(&self.endpoint).map_err(zmq_error)?;
        socket.set_subscribe(TOPIC_BLOCK).map_err(zmq_error)?;
        socket.set_subscribe(TOPIC_TX).map_err(zmq_error)?;
        let timeout_ms = i32::try_from(self.poll_timeout.as_millis()).unwrap_or(i32::MAX);
        socket.set_rcvtimeo(timeout_ms).map_err(zmq_error)?;

        thread::Builder::new()
            .name("runesync-zmq".to_string())
            .spawn(move || {
                let _context = context;
                forward(&socket, &sender, &shutdown);
            })
            .map_err(|e| Error::internal(format!("failed to start ZMQ listener: {e}")))
    }
}

fn forward(socket: &zmq::Socket, sender: &SignalSender, shutdown: &ShutdownListener) {
    while !shutdown.is_triggered() {
        let frames = match socket.recv_multipart(0) {
            Ok(frames) => frames,
            Err(zmq::Error::EAGAIN) => continue,
            Err(e) => {
                warn!("ZMQ receive failed, listener exiting: {}", e);
                return;
            }
        };

        let Some(signal) = parse_notification(&frames) else {
            debug!("ignoring ZMQ message with {} frames", frames.len());
            continue;
        };

        if let Err(e) = sender.send(signal) {
            debug!("ZMQ listener exiting: {}", e);
            return;
        }
    }
    info!("ZMQ listener closed");
}

fn zmq_error(e: zmq::Error) -> Error {
    Error::node_unavailable(format!("zmq: {e}"))
}

/// Turn a `[topic, hash, sequence]` notification into a signal.
///
/// The node publishes hashes in display order, so they are reversed into
/// internal byte order.
fn parse_notification(frames: &[Vec<u8>]) -> Option<Signal> {
    let [topic, body, ..] = frames else {
        return None;
    };
    let mut bytes: [u8; 32] = body.as_slice().try_into().ok()?;
    bytes.reverse();

    match topic.as_slice() {
        TOPIC_BLOCK => Some(Signal::Block(BlockHash::from_byte_array(bytes))),
        TOPIC_TX => Some(Signal::Transaction(Txid::from_byte_array(bytes))),
        _ => None,
    }
}
