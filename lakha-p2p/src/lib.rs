//! The gossip/request-response network layer: transaction and block
//! broadcast over gossipsub, peer discovery over kademlia/identify/mdns,
//! and a request-response protocol for backfilling missing ancestor blocks.

pub mod behaviour;
pub mod config;
pub mod error;
pub mod node;
pub mod protocol;

pub use config::P2pConfig;
pub use error::P2pError;
pub use node::{P2pHandle, P2pNode};
pub use protocol::GossipMessage;
