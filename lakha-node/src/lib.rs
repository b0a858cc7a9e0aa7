//! The node crate: chain boot/rehydration, the `Blockchain` orchestrator,
//! and configuration/CLI plumbing. `main.rs` is the thin binary that wires
//! this crate's pieces together with logging and the P2P/mining loops.

pub mod blockchain;
pub mod config;

pub use blockchain::{Admission, Blockchain};
pub use config::{Cli, NodeConfig};
