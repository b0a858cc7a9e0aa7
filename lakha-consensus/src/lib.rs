//! Block production, validation, append, and the chain's state root: the
//! subsystem that ties the ledger, contract engine, validator registry,
//! and mempool into one sequence of state transitions.

pub mod pipeline;
pub mod state_root;

pub use pipeline::{derive_contract_id, ChainState};
pub use state_root::compute_state_root;
