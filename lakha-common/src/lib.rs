pub mod address;
pub mod block;
pub mod error;
pub mod hash;
pub mod time;
pub mod transaction;

pub use address::AddressCodec;
pub use block::Block;
pub use error::{NodeError, Result};
pub use transaction::{Transaction, TransactionKind};

/// Per-account balance ceiling enforced by the ledger.
pub const MAX_BALANCE: f64 = 1e18;

/// The node's own gas price, used for every balance-sufficiency check and
/// gas debit regardless of what a transaction declares in `gas_price`.
pub const NODE_GAS_PRICE: f64 = 0.001;

/// Minimum amount a STAKE transaction may stake.
pub const MIN_STAKE: f64 = 10.0;

/// Nominal uptime credited to a validator for each block it produces.
pub const BLOCK_TIME: f64 = 5.0;

/// Credited to the producing validator's balance on every appended block.
pub const BLOCK_REWARD: f64 = 1.0;

/// Transactions taken from the mempool per proposed block.
pub const MAX_BLOCK_TXS: usize = 100;

/// Settle interval the miner waits when the P2P layer has at least one peer.
pub const P2P_SETTLE_MS: u64 = 500;
