//! Network configuration: listen addresses and the bootstrap peer list a
//! node dials on startup.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct P2pConfig {
    /// Multiaddrs this node listens on, e.g. `/ip4/0.0.0.0/tcp/9000`.
    pub listen_addrs: Vec<String>,
    /// Multiaddrs of peers to dial at startup.
    pub bootstrap_peers: Vec<String>,
    /// Gossipsub topic used for transaction broadcast.
    pub tx_topic: String,
    /// Gossipsub topic used for block broadcast.
    pub block_topic: String,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            listen_addrs: vec!["/ip4/0.0.0.0/tcp/0".to_string()],
            bootstrap_peers: Vec::new(),
            tx_topic: "lakha/tx/1".to_string(),
            block_topic: "lakha/block/1".to_string(),
        }
    }
}
