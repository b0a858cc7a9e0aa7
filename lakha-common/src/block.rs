use serde::{Deserialize, Serialize};

use crate::hash::digest_canonical;
use crate::transaction::Transaction;

/// Fixed so that every node derives the same block-0 hash across restarts
/// and across independently-booted nodes (genesis agreement).
pub const GENESIS_TIMESTAMP: f64 = 1640995200.0;
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const GENESIS_VALIDATOR: &str = "genesis";
pub const GENESIS_FUNDING: f64 = 10_000_000.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: f64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub validator: String,
    #[serde(default)]
    pub state_root: String,
    #[serde(default)]
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    pub fn new(
        index: u64,
        timestamp: f64,
        transactions: Vec<Transaction>,
        previous_hash: impl Into<String>,
        validator: impl Into<String>,
        state_root: impl Into<String>,
    ) -> Self {
        let mut block = Self {
            index,
            timestamp,
            transactions,
            previous_hash: previous_hash.into(),
            validator: validator.into(),
            state_root: state_root.into(),
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    pub fn genesis() -> Self {
        Self::new(
            0,
            GENESIS_TIMESTAMP,
            Vec::new(),
            GENESIS_PREVIOUS_HASH,
            GENESIS_VALIDATOR,
            String::new(),
        )
    }

    /// Rebuilds the block's hash from its current fields. A block loaded
    /// from the store or received over the wire should have its hash
    /// re-derived and compared to the persisted/claimed value rather than
    /// trusted blindly.
    pub fn calculate_hash(&self) -> String {
        let preimage = serde_json::json!({
            "index": self.index,
            "timestamp": self.timestamp,
            "transactions": self.transactions,
            "previous_hash": self.previous_hash,
            "validator": self.validator,
            "state_root": self.state_root,
            "nonce": self.nonce,
        });
        digest_canonical(&preimage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_is_deterministic_across_nodes() {
        let a = Block::genesis();
        let b = Block::genesis();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.index, 0);
        assert_eq!(a.previous_hash, "0");
    }

    #[test]
    fn hash_changes_with_contents() {
        let mut a = Block::genesis();
        let original = a.hash.clone();
        a.nonce = 1;
        assert_ne!(a.calculate_hash(), original);
    }
}
