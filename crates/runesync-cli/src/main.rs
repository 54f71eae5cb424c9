//! runesync - Detect, decode and follow Rune payloads on a Bitcoin node
//!
//! Offline subcommands encode and decode `OP_RETURN` scripts; online ones
//! talk to a node over JSON-RPC and can run the sync engine until Ctrl-C.

use anyhow::{bail, Context, Result};
use bitcoin::{BlockHash, Txid};
use clap::{Args, Parser, Subcommand};
use runesync_core::codec;
use runesync_core::node::{self, Auth, NodeClient};
use runesync_core::sync::{self, SyncStats};
use runesync_core::{
    Assignment, ChainSync, EventSink, JsonLinesSink, NodeConfig, Rune, RuneDetector, RunePayload,
    RpcNode, SyncConfig, SyncEvent,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

/// Detect, decode and follow Rune payloads on a Bitcoin node
#[derive(Parser, Debug)]
#[command(name = "runesync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    rpc: RpcArgs,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// Node connection settings
#[derive(Args, Debug)]
struct RpcArgs {
    /// JSON-RPC endpoint of the node
    #[arg(long, env = "RPC_URL", default_value = "http://127.0.0.1:8332", global = true)]
    rpc_url: String,

    /// RPC username
    #[arg(long, env = "RPC_USER", global = true)]
    rpc_user: Option<String>,

    /// RPC password
    #[arg(long, env = "RPC_PASS", hide_env_values = true, global = true)]
    rpc_pass: Option<String>,

    /// Path to the node's .cookie file (instead of user and password)
    #[arg(long, env = "RPC_COOKIE", global = true)]
    rpc_cookie: Option<PathBuf>,

    /// Timeout for each RPC call, in seconds
    #[arg(long, default_value = "15", global = true)]
    rpc_timeout_secs: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode an output script (or a bare payload starting with 52) given as hex
    Decode {
        /// Script bytes in hex
        #[arg(long)]
        hex: String,
    },

    /// Build the OP_RETURN script for a payload and print it as hex
    Encode {
        /// Transfer as id:output:amount (repeatable)
        #[arg(long = "transfer", value_parser = parse_assignment)]
        transfers: Vec<Assignment>,

        /// Ticker of a rune to issue
        #[arg(long)]
        symbol: Option<String>,

        /// Decimals of the issued rune
        #[arg(long, requires = "symbol")]
        decimals: Option<u64>,
    },

    /// Fetch a transaction and decode its rune payload
    Tx {
        /// Transaction id
        txid: Txid,
    },

    /// Fetch a block and decode every rune transaction in it
    Block {
        /// Block hash
        hash: BlockHash,
    },

    /// Print the most recent block hashes, oldest first
    Recent {
        /// Number of blocks
        #[arg(long, default_value = "10")]
        count: usize,
    },

    /// Follow the chain and print one JSON line per rune transaction
    Sync(SyncArgs),
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// Subscribe to the node's ZMQ publisher instead of polling
    #[arg(long, value_name = "ENDPOINT")]
    zmq: Option<String>,

    /// Write events to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Drop signals when the queue is full instead of waiting
    #[arg(long)]
    drop_when_full: bool,

    /// Seconds between tip polls
    #[arg(long, default_value = "5")]
    poll_interval_secs: u64,

    /// Number of recent block hashes to remember
    #[arg(long, default_value = "10")]
    window: usize,

    /// Number of signals queued before backpressure applies
    #[arg(long, default_value = "10")]
    queue: usize,

    /// Ignore transaction notifications
    #[arg(long)]
    no_tx_dispatch: bool,
}

impl SyncArgs {
    fn config(&self) -> SyncConfig {
        let backpressure = if self.drop_when_full {
            sync::Backpressure::Drop
        } else {
            sync::Backpressure::Block
        };

        SyncConfig::new()
            .window_capacity(self.window)
            .queue_capacity(self.queue)
            .poll_interval(Duration::from_secs(self.poll_interval_secs))
            .backpressure(backpressure)
            .dispatch_transactions(!self.no_tx_dispatch)
    }
}

impl RpcArgs {
    fn auth(&self) -> Result<Auth> {
        match (&self.rpc_cookie, &self.rpc_user) {
            (Some(_), Some(_)) => bail!("--rpc-cookie and --rpc-user are mutually exclusive"),
            (Some(cookie), None) => Ok(Auth::CookieFile(cookie.clone())),
            (None, Some(user)) => Ok(Auth::UserPass(
                user.clone(),
                self.rpc_pass.clone().unwrap_or_default(),
            )),
            (None, None) => Ok(Auth::None),
        }
    }

    fn config(&self) -> Result<NodeConfig> {
        Ok(NodeConfig::new(&self.rpc_url)
            .auth(self.auth()?)
            .timeout(Duration::from_secs(self.rpc_timeout_secs)))
    }

    fn connect(&self) -> Result<RpcNode> {
        let config = self.config()?;
        RpcNode::new(&config)
            .with_context(|| format!("Failed to set up RPC client for {}", self.rpc_url))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Command::Decode { hex } => {
            let payload = decode_hex(hex)?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Command::Encode {
            transfers,
            symbol,
            decimals,
        } => {
            println!("{}", encode_hex(transfers, symbol.as_deref(), *decimals)?);
        }
        Command::Tx { txid } => {
            let node = cli.rpc.connect()?;
            match node::fetch_transaction(&node, txid, &RuneDetector)
                .with_context(|| format!("Failed to decode transaction {txid}"))?
            {
                Some(decoded) => println!("{}", serde_json::to_string_pretty(&decoded)?),
                None => println!("transaction {txid} carries no rune data"),
            }
        }
        Command::Block { hash } => {
            let node = cli.rpc.connect()?;
            let outcomes = node::fetch_block(&node, hash, &RuneDetector)
                .with_context(|| format!("Failed to fetch block {hash}"))?;
            debug!("block {} has {} rune transactions", hash, outcomes.len());
            for outcome in outcomes {
                let event = match outcome.result {
                    Ok(transaction) => SyncEvent::Decoded {
                        block: *hash,
                        transaction,
                    },
                    Err(e) => SyncEvent::Failed {
                        block: *hash,
                        txid: outcome.txid,
                        error: e.to_string(),
                    },
                };
                println!("{}", serde_json::to_string(&event)?);
            }
        }
        Command::Recent { count } => {
            let node = cli.rpc.connect()?;
            for hash in node::recent_block_hashes(&node, *count)
                .context("Failed to read recent blocks")?
            {
                println!("{hash}");
            }
        }
        Command::Sync(args) => run_sync(&cli.rpc, args)?,
    }

    Ok(())
}

/// Decode a hex script, or a bare payload when it starts with the marker
fn decode_hex(input: &str) -> Result<RunePayload> {
    let bytes = hex::decode(input.trim()).context("Input is not valid hex")?;
    let decoded = match bytes.first() {
        Some(&codec::MARKER) => codec::decode_payload(&bytes),
        _ => codec::decode_script(&bytes),
    };
    decoded.context("Failed to decode rune payload")
}

fn encode_hex(
    transfers: &[Assignment],
    symbol: Option<&str>,
    decimals: Option<u64>,
) -> Result<String> {
    let mut payload = RunePayload::transfers(transfers.to_vec());
    if let Some(symbol) = symbol {
        payload = payload.with_issuance(Rune {
            symbol: symbol.to_string(),
            decimals: decimals.unwrap_or(0),
        });
    }

    let script = codec::encode_script(&payload).context("Failed to encode payload")?;
    Ok(hex::encode(script.as_bytes()))
}

/// Parse an `id:output:amount` transfer
fn parse_assignment(input: &str) -> std::result::Result<Assignment, String> {
    let parts: Vec<&str> = input.split(':').collect();
    let [id, output, amount] = parts[..] else {
        return Err(format!("expected id:output:amount, got '{input}'"));
    };

    let number = |field: &str, value: &str| {
        value
            .parse::<u64>()
            .map_err(|e| format!("invalid {field} '{value}': {e}"))
    };
    Ok(Assignment::new(
        number("id", id)?,
        number("output", output)?,
        number("amount", amount)?,
    ))
}

/// Issuance and transfer totals for the exit summary
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tally {
    issuances: u64,
    transfers: u64,
}

/// Counts what passes through without keeping the records
#[derive(Debug, Default, Clone)]
struct TallySink(Arc<Mutex<Tally>>);

impl TallySink {
    fn totals(&self) -> Tally {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for TallySink {
    fn emit(&mut self, event: &SyncEvent) -> runesync_core::Result<()> {
        if let SyncEvent::Decoded { transaction, .. } = event {
            let mut tally = self.0.lock().unwrap_or_else(PoisonError::into_inner);
            tally.issuances += u64::from(transaction.issuance.is_some());
            tally.transfers += transaction.transfers.len() as u64;
        }
        Ok(())
    }
}

/// JSON-lines output plus a tally used for the exit summary
fn build_sinks(output: Option<&PathBuf>, tally: TallySink) -> Result<Vec<Box<dyn EventSink>>> {
    let json: Box<dyn EventSink> = match output {
        Some(path) => Box::new(
            JsonLinesSink::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?,
        ),
        None => Box::new(JsonLinesSink::new(std::io::stdout())),
    };

    Ok(vec![json, Box::new(tally)])
}

fn run_sync(rpc: &RpcArgs, args: &SyncArgs) -> Result<()> {
    let node: Arc<dyn NodeClient> = Arc::new(rpc.connect()?);
    let tally = TallySink::default();
    let config = args.config();
    let poll_interval = config.poll_interval;

    let sinks = build_sinks(args.output.as_ref(), tally.clone())?;
    let handle = ChainSync::spawn(node.clone(), Box::new(sinks), config)
        .context("Failed to start sync engine")?;

    let shutdown = handle.shutdown();
    ctrlc::set_handler(move || {
        info!("Interrupt received, finishing the current block");
        shutdown.trigger();
    })
    .context("Failed to install Ctrl-C handler")?;

    let producer = match &args.zmq {
        Some(endpoint) => spawn_zmq(endpoint, &handle)?,
        None => sync::spawn_tip_poller(
            node,
            handle.sender(),
            poll_interval,
            handle.shutdown_listener(),
        )?,
    };

    info!("Following the chain from {}", rpc.rpc_url);
    let stats = handle.join()?;
    if producer.join().is_err() {
        bail!("Signal producer panicked");
    }

    print_summary(&stats, tally.totals());
    Ok(())
}

#[cfg(feature = "zmq")]
fn spawn_zmq(
    endpoint: &str,
    handle: &runesync_core::SyncHandle,
) -> Result<std::thread::JoinHandle<()>> {
    sync::ZmqListener::new(endpoint)
        .spawn(handle.sender(), handle.shutdown_listener())
        .with_context(|| format!("Failed to subscribe to {endpoint}"))
}

#[cfg(not(feature = "zmq"))]
fn spawn_zmq(
    _endpoint: &str,
    handle: &runesync_core::SyncHandle,
) -> Result<std::thread::JoinHandle<()>> {
    handle.stop();
    bail!("runesync was built without ZMQ support (enable the `zmq` feature)")
}

fn print_summary(stats: &SyncStats, tally: Tally) {
    info!(
        "Summary: {} blocks, {} rune transactions, {} failed decodes, {} issuances, {} transfers",
        stats.blocks,
        stats.decoded,
        stats.failed,
        tally.issuances,
        tally.transfers
    );
}
