//! Access to a Bitcoin node.
//!
//! [`NodeClient`] is the capability the rest of the crate consumes; it is
//! passed explicitly to whatever needs it. [`RpcNode`] implements it over
//! Bitcoin Core's JSON-RPC interface with a per-call timeout.

use crate::detector::{self, DecodeOutcome, MarkerDetector};
use crate::error::{Error, Result};
use crate::model::RuneTransaction;
use bitcoin::{Block, BlockHash, Transaction, Txid};
use bitcoincore_rpc::jsonrpc::{self, simple_http::SimpleHttpTransport};
use bitcoincore_rpc::{Client, RpcApi};
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, trace};

pub use bitcoincore_rpc::Auth;

/// RPC error codes meaning "no such block or transaction"
const NOT_FOUND_CODES: [i32; 2] = [-5, -8];

/// Block and transaction lookups on a node
pub trait NodeClient: Send + Sync {
    /// Height of the best chain
    fn get_block_count(&self) -> Result<u64>;

    /// Hash of the block at `height` on the best chain
    fn get_block_hash(&self, height: u64) -> Result<BlockHash>;

    /// Hash of the chain tip
    fn get_best_block_hash(&self) -> Result<BlockHash>;

    /// Full block with its transactions
    fn get_block(&self, hash: &BlockHash) -> Result<Block>;

    /// A single transaction
    fn get_transaction(&self, txid: &Txid) -> Result<Transaction>;
}

/// Connection settings for [`RpcNode`]
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// JSON-RPC endpoint
    pub url: String,
    /// Credentials
    pub auth: Auth,
    /// Per-call timeout
    pub timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8332".to_string(),
            auth: Auth::None,
            timeout: Duration::from_secs(15),
        }
    }
}

impl NodeConfig {
    /// Creates a config for `url` with default credentials and timeout
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Sets the credentials
    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    /// Sets the per-call timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// [`NodeClient`] backed by Bitcoin Core JSON-RPC
pub struct RpcNode {
    client: Client,
}

impl std::fmt::Debug for RpcNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcNode").finish_non_exhaustive()
    }
}

impl RpcNode {
    /// Builds a client; no request is made until the first call
    pub fn new(config: &NodeConfig) -> Result<Self> {
        let (user, pass) = config
            .auth
            .clone()
            .get_user_pass()
            .map_err(|e| Error::node_unavailable(format!("invalid rpc credentials: {e}")))?;

        let mut builder = SimpleHttpTransport::builder()
            .url(&config.url)
            .map_err(|e| Error::node_unavailable(format!("invalid rpc url '{}': {e}", config.url)))?
            .timeout(config.timeout);
        if let Some(user) = user {
            builder = builder.auth(user, pass);
        }

        let client = Client::from_jsonrpc(jsonrpc::Client::with_transport(builder.build()));
        debug!("rpc client for {} (timeout {:?})", config.url, config.timeout);
        Ok(Self { client })
    }
}

impl NodeClient for RpcNode {
    fn get_block_count(&self) -> Result<u64> {
        self.client
            .get_block_count()
            .map_err(|e| map_rpc_error("block count", e))
    }

    fn get_block_hash(&self, height: u64) -> Result<BlockHash> {
        self.client
            .get_block_hash(height)
            .map_err(|e| map_rpc_error(format_args!("block at height {height}"), e))
    }

    fn get_best_block_hash(&self) -> Result<BlockHash> {
        self.client
            .get_best_block_hash()
            .map_err(|e| map_rpc_error("best block hash", e))
    }

    fn get_block(&self, hash: &BlockHash) -> Result<Block> {
        self.client
            .get_block(hash)
            .map_err(|e| map_rpc_error(format_args!("block {hash}"), e))
    }

    fn get_transaction(&self, txid: &Txid) -> Result<Transaction> {
        self.client
            .get_raw_transaction(txid, None)
            .map_err(|e| map_rpc_error(format_args!("transaction {txid}"), e))
    }
}

/// Classify an RPC failure as a missing object or an unavailable node
pub fn map_rpc_error(what: impl Display, err: bitcoincore_rpc::Error) -> Error {
    match &err {
        bitcoincore_rpc::Error::JsonRpc(jsonrpc::Error::Rpc(rpc))
            if NOT_FOUND_CODES.contains(&rpc.code) =>
        {
            Error::not_found(format!("{what}: {}", rpc.message))
        }
        _ => Error::node_unavailable(format!("{what}: {err}")),
    }
}

/// Fetch a transaction and decode it.
///
/// `Ok(None)` means the transaction exists but carries no rune marker.
pub fn fetch_transaction(
    node: &dyn NodeClient,
    txid: &Txid,
    detector: &dyn MarkerDetector,
) -> Result<Option<RuneTransaction>> {
    let tx = node.get_transaction(txid)?;
    detector::decode_transaction(&tx, detector).transpose()
}

/// Fetch a block and decode every marker-carrying transaction in it
pub fn fetch_block(
    node: &dyn NodeClient,
    hash: &BlockHash,
    detector: &dyn MarkerDetector,
) -> Result<Vec<DecodeOutcome>> {
    let block = node.get_block(hash)?;
    trace!("block {} has {} transactions", hash, block.txdata.len());
    Ok(detector::decode_block(&block, detector))
}

/// Hashes of the most recent `count` blocks, oldest first.
///
/// Heights that fail to resolve are skipped. A `count` of zero returns no
/// hashes without contacting the node.
pub fn recent_block_hashes(node: &dyn NodeClient, count: usize) -> Result<Vec<BlockHash>> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let tip = node.get_block_count()?;
    let start = tip.saturating_sub(count.saturating_sub(1) as u64);

    let span = usize::try_from(tip - start + 1).unwrap_or(usize::MAX);
    let mut hashes = Vec::with_capacity(span.min(count));
    for height in start..=tip {
        match node.get_block_hash(height) {
            Ok(hash) => hashes.push(hash),
            Err(e) => debug!("skipping height {}: {}", height, e),
        }
    }
    Ok(hashes)
}
