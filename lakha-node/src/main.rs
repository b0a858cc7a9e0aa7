use std::sync::Arc;

use clap::Parser;
use tracing::info;

use lakha_common::time::now;
use lakha_node::{Blockchain, Cli};
use lakha_p2p::{P2pConfig, P2pNode};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = match cli.into_config() {
        Ok(cfg) => cfg,
        Err(error) => {
            tracing::error!(%error, "failed to load configuration");
            std::process::exit(1);
        }
    };

    info!(data_dir = %cfg.data_dir.display(), "starting lakha-node");

    let blockchain = match Blockchain::open(&cfg) {
        Ok(chain) => chain,
        Err(error) => {
            tracing::error!(%error, "failed to boot chain state");
            std::process::exit(1);
        }
    };
    let chain = blockchain.chain_state();

    let p2p_cfg = P2pConfig {
        listen_addrs: cfg.listen_addrs.clone(),
        bootstrap_peers: cfg.bootstrap_peers.clone(),
        ..P2pConfig::default()
    };
    let p2p = match P2pNode::spawn(p2p_cfg, chain.clone()) {
        Ok(handle) => Some(handle),
        Err(error) => {
            tracing::warn!(%error, "p2p layer failed to start, running single-node");
            None
        }
    };

    info!(chain_length = chain.chain_length(), "chain booted");

    if !cfg.mining_enabled {
        info!("mining disabled, node is serving reads only");
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(cfg.block_time as u64)).await;
        }
    }

    run_mining_loop(chain, p2p, cfg.block_time).await;
}

async fn run_mining_loop(
    chain: Arc<lakha_consensus::ChainState>,
    p2p: Option<lakha_p2p::P2pHandle>,
    block_time: f64,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs_f64(block_time.max(0.1)));
    loop {
        interval.tick().await;
        let has_peers = p2p.as_ref().map(|handle| handle.has_peers()).unwrap_or(false);
        if chain.mine_block(now(), has_peers) {
            let block = chain.latest_block();
            info!(index = block.index, txs = block.transactions.len(), "mined block");
            if let Some(handle) = &p2p {
                handle.broadcast_block(block).await;
            }
        }
    }
}
