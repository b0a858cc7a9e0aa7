use serde::{Deserialize, Serialize};

use crate::hash::digest_canonical;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Transfer,
    ContractDeploy,
    ContractCall,
    Stake,
    /// Declared by the wire format but has no processing branch.
    /// Admission rejects it until a policy is provided.
    Unstake,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self).unwrap();
        write!(f, "{}", s.as_str().unwrap_or("unknown"))
    }
}

/// A transaction as it travels the wire and is stored in a block.
///
/// `hash` is the deterministic digest of every other field in canonical
/// sorted form; `signature` is carried but excluded from the hash preimage
/// so that a future signature scheme can be added without changing
/// transaction identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub from: String,
    pub to: String,
    pub amount: f64,
    #[serde(rename = "transaction_type")]
    pub kind: TransactionKind,
    #[serde(default = "default_data")]
    pub data: serde_json::Value,
    pub gas_limit: i64,
    pub gas_price: f64,
    pub nonce: u64,
    pub timestamp: f64,
    #[serde(default)]
    pub signature: String,
    pub hash: String,
}

fn default_data() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl Transaction {
    /// Builds a transaction and stamps it with its own canonical hash.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        amount: f64,
        kind: TransactionKind,
        data: serde_json::Value,
        gas_limit: i64,
        gas_price: f64,
        nonce: u64,
        timestamp: f64,
    ) -> Self {
        let mut tx = Self {
            from: from.into(),
            to: to.into(),
            amount,
            kind,
            data,
            gas_limit,
            gas_price,
            nonce,
            timestamp,
            signature: String::new(),
            hash: String::new(),
        };
        tx.hash = tx.calculate_hash();
        tx
    }

    /// Recomputes the canonical hash from the current fields. Two distinct
    /// transactions (differing in any hashed field) never collide in
    /// practice because the preimage is the full canonical field set.
    pub fn calculate_hash(&self) -> String {
        let preimage = serde_json::json!({
            "from_address": self.from,
            "to_address": self.to,
            "amount": self.amount,
            "transaction_type": self.kind,
            "data": self.data,
            "gas_limit": self.gas_limit,
            "gas_price": self.gas_price,
            "nonce": self.nonce,
            "timestamp": self.timestamp,
        });
        digest_canonical(&preimage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(nonce: u64) -> Transaction {
        Transaction::new(
            "genesis",
            "lakha1example",
            100.0,
            TransactionKind::Transfer,
            default_data(),
            21000,
            1.0,
            nonce,
            1_700_000_000.0,
        )
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(tx(0).hash, tx(0).hash);
    }

    #[test]
    fn distinct_transactions_hash_differently() {
        assert_ne!(tx(0).hash, tx(1).hash);
    }

    #[test]
    fn signature_does_not_affect_hash() {
        let mut a = tx(0);
        let unsigned_hash = a.hash.clone();
        a.signature = "deadbeef".into();
        assert_eq!(a.calculate_hash(), unsigned_hash);
    }

    #[test]
    fn kind_round_trips_as_snake_case() {
        let v = serde_json::to_value(TransactionKind::ContractDeploy).unwrap();
        assert_eq!(v, serde_json::json!("contract_deploy"));
    }
}
