//! Node configuration: the constants table plus the handful of
//! deployment knobs (data directory, P2P listen/bootstrap, mining on/off).
//! Loaded from a JSON file when one is given, defaulted otherwise.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

use lakha_common::address::DEFAULT_HRP;
use lakha_common::{
    BLOCK_REWARD, BLOCK_TIME, MAX_BALANCE, MAX_BLOCK_TXS, MIN_STAKE, NODE_GAS_PRICE, P2P_SETTLE_MS,
};
use lakha_common::error::{NodeError, Result};
use lakha_mempool::MAX_POOL_SIZE;
use lakha_validator::PEER_REVIEW_INTERVAL;

/// Mirrors `lakha_validator::validator`'s private score-cache window; kept
/// here only for the config file's documentation value, since the score
/// cache itself is not independently configurable.
const SCORE_CACHE_SECONDS: f64 = 5.0;

/// The fixed genesis timestamp every node must agree on ("genesis
/// agreement").
pub const GENESIS_TIMESTAMP: f64 = 1_640_995_200.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub listen_addrs: Vec<String>,
    pub bootstrap_peers: Vec<String>,
    pub mining_enabled: bool,
    pub hrp: String,

    pub min_stake: f64,
    pub block_time: f64,
    pub block_reward: f64,
    pub node_gas_price: f64,
    pub mempool_cap: usize,
    pub max_block_txs: usize,
    pub max_balance: f64,
    pub score_cache_seconds: f64,
    pub peer_review_every: u64,
    pub p2p_settle_ms: u64,
    pub genesis_timestamp: f64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./lakha-data"),
            listen_addrs: vec!["/ip4/0.0.0.0/tcp/0".to_string()],
            bootstrap_peers: Vec::new(),
            mining_enabled: true,
            hrp: DEFAULT_HRP.to_string(),
            min_stake: MIN_STAKE,
            block_time: BLOCK_TIME,
            block_reward: BLOCK_REWARD,
            node_gas_price: NODE_GAS_PRICE,
            mempool_cap: MAX_POOL_SIZE,
            max_block_txs: MAX_BLOCK_TXS,
            max_balance: MAX_BALANCE,
            score_cache_seconds: SCORE_CACHE_SECONDS,
            peer_review_every: PEER_REVIEW_INTERVAL,
            p2p_settle_ms: P2P_SETTLE_MS,
            genesis_timestamp: GENESIS_TIMESTAMP,
        }
    }
}

impl NodeConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| NodeError::PersistenceError(e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| NodeError::PersistenceError(e.to_string()))
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let contents =
            serde_json::to_string_pretty(self).map_err(|e| NodeError::PersistenceError(e.to_string()))?;
        std::fs::write(path, contents).map_err(|e| NodeError::PersistenceError(e.to_string()))
    }
}

/// CLI flags for the `lakha-node` binary, driving its runtime from the
/// command line.
#[derive(Debug, Parser)]
#[command(name = "lakha-node", about = "A permissioned PoCS account-model chain node")]
pub struct Cli {
    /// Path to a JSON config file; defaults are used when absent.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory the embedded store writes to.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Multiaddr to listen on; may be given multiple times.
    #[arg(long = "listen")]
    pub listen_addrs: Vec<String>,

    /// Multiaddr of a peer to dial at startup; may be given multiple times.
    #[arg(long = "bootstrap")]
    pub bootstrap_peers: Vec<String>,

    /// Disables the mining loop (the node still serves reads and relays gossip).
    #[arg(long)]
    pub no_mine: bool,
}

impl Cli {
    pub fn into_config(self) -> Result<NodeConfig> {
        let mut cfg = match &self.config {
            Some(path) if path.exists() => NodeConfig::load_from_file(path)?,
            _ => NodeConfig::default(),
        };
        if let Some(data_dir) = self.data_dir {
            cfg.data_dir = data_dir;
        }
        if !self.listen_addrs.is_empty() {
            cfg.listen_addrs = self.listen_addrs;
        }
        if !self.bootstrap_peers.is_empty() {
            cfg.bootstrap_peers = self.bootstrap_peers;
        }
        if self.no_mine {
            cfg.mining_enabled = false;
        }
        Ok(cfg)
    }
}
