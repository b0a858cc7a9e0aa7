//! Transaction admission and the pending pool.
//!
//! The pool itself knows nothing about balances or account state; callers
//! (the node) supply the account's expected next nonce at admission time, so
//! this crate stays a pure gatekeeper over what can even be considered for
//! inclusion in a block.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;

use lakha_common::address::{AddressCodec, GENESIS, STAKE_POOL};
use lakha_common::error::{NodeError, Result};
use lakha_common::transaction::{Transaction, TransactionKind};
use lakha_common::{MIN_STAKE, NODE_GAS_PRICE};

/// Hard ceiling on pending transactions.
pub const MAX_POOL_SIZE: usize = 10_000;

/// How many already-committed hashes are remembered for replay rejection
/// before the oldest are forgotten.
const PROCESSED_HASH_WINDOW: usize = 50_000;

pub struct Mempool {
    codec: AddressCodec,
    capacity: usize,
    transactions: RwLock<HashMap<String, Transaction>>,
    order: RwLock<VecDeque<String>>,
    pending_identities: RwLock<HashSet<(String, u64)>>,
    processed_hashes: RwLock<HashSet<String>>,
    processed_order: RwLock<VecDeque<String>>,
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new(AddressCodec::default(), MAX_POOL_SIZE)
    }
}

impl Mempool {
    pub fn new(codec: AddressCodec, capacity: usize) -> Self {
        Self {
            codec,
            capacity,
            transactions: RwLock::new(HashMap::new()),
            order: RwLock::new(VecDeque::new()),
            pending_identities: RwLock::new(HashSet::new()),
            processed_hashes: RwLock::new(HashSet::new()),
            processed_order: RwLock::new(VecDeque::new()),
        }
    }

    /// Runs every stateless and kind-specific admission rule
    /// §4.5), then queues the transaction in arrival order. `expected_nonce`
    /// is the caller's current view of `tx.from`'s next nonce; `from ==
    /// "genesis"` is exempted from the nonce check (open question 4: a
    /// documented, demo-only relaxation for multi-node convergence).
    /// `sender_balance` is the caller's current view of `tx.from`'s balance,
    /// checked against `amount + gas_limit * NODE_GAS_PRICE`.
    pub fn add_transaction(&self, tx: Transaction, expected_nonce: u64, sender_balance: f64) -> Result<()> {
        self.validate_stateless(&tx)?;
        self.validate_kind(&tx)?;

        let required = tx.amount + tx.gas_limit as f64 * NODE_GAS_PRICE;
        if sender_balance < required {
            return Err(NodeError::InsufficientFunds {
                have: sender_balance,
                need: required,
            });
        }

        if self.processed_hashes.read().unwrap().contains(&tx.hash) {
            return Err(NodeError::DuplicateHash(tx.hash.clone()));
        }
        if self.transactions.read().unwrap().contains_key(&tx.hash) {
            return Err(NodeError::DuplicateHash(tx.hash.clone()));
        }

        if tx.from != GENESIS && tx.nonce != expected_nonce {
            return Err(NodeError::InvalidNonce {
                address: tx.from.clone(),
                expected: expected_nonce,
                got: tx.nonce,
            });
        }

        let identity = (tx.from.clone(), tx.nonce);
        {
            let pending = self.pending_identities.read().unwrap();
            if pending.contains(&identity) {
                return Err(NodeError::DuplicateNonceInMempool {
                    address: tx.from.clone(),
                    nonce: tx.nonce,
                });
            }
        }

        if self.transactions.read().unwrap().len() >= self.capacity {
            return Err(NodeError::MempoolFull);
        }

        let hash = tx.hash.clone();
        self.pending_identities.write().unwrap().insert(identity);
        self.order.write().unwrap().push_back(hash.clone());
        self.transactions.write().unwrap().insert(hash, tx);
        Ok(())
    }

    fn validate_stateless(&self, tx: &Transaction) -> Result<()> {
        if !self.codec.is_usable(&tx.from) {
            return Err(NodeError::InvalidAddress(tx.from.clone()));
        }
        if !self.codec.is_usable(&tx.to) {
            return Err(NodeError::InvalidAddress(tx.to.clone()));
        }
        if tx.amount < 0.0 {
            return Err(NodeError::NegativeAmount(tx.amount));
        }
        if tx.gas_limit <= 0 || tx.gas_price <= 0.0 {
            return Err(NodeError::InvalidGas {
                limit: tx.gas_limit,
                price: tx.gas_price,
            });
        }
        if tx.to == STAKE_POOL && tx.kind != TransactionKind::Stake {
            return Err(NodeError::KindSpecific(
                "only STAKE transactions may target the stake pool".into(),
            ));
        }
        Ok(())
    }

    /// Kind-specific shape checks; the heavier semantic checks
    /// (sufficient balance, contract existence) happen during block
    /// production, not admission.
    fn validate_kind(&self, tx: &Transaction) -> Result<()> {
        match tx.kind {
            TransactionKind::Transfer => Ok(()),
            TransactionKind::Stake => {
                if tx.to != STAKE_POOL {
                    return Err(NodeError::KindSpecific(
                        "STAKE transactions must target the stake pool".into(),
                    ));
                }
                if tx.amount < MIN_STAKE {
                    return Err(NodeError::KindSpecific(format!(
                        "STAKE transactions must stake at least {MIN_STAKE}"
                    )));
                }
                Ok(())
            }
            TransactionKind::ContractDeploy => match tx.data.get("contract_code") {
                Some(serde_json::Value::String(code)) if !code.is_empty() => Ok(()),
                _ => Err(NodeError::KindSpecific(
                    "CONTRACT_DEPLOY requires non-empty string data.contract_code".into(),
                )),
            },
            TransactionKind::ContractCall => {
                match tx.data.get("contract_address") {
                    Some(serde_json::Value::String(s)) if !s.is_empty() => Ok(()),
                    _ => Err(NodeError::KindSpecific(
                        "CONTRACT_CALL requires data.contract_address".into(),
                    )),
                }
            }
            TransactionKind::Unstake => Err(NodeError::KindSpecific(
                "UNSTAKE is not yet supported".into(),
            )),
        }
    }

    /// Removes committed transactions from the pool and records their
    /// hashes for replay rejection.
    pub fn remove_committed(&self, hashes: &[String]) {
        let mut transactions = self.transactions.write().unwrap();
        let mut pending_identities = self.pending_identities.write().unwrap();
        let mut processed = self.processed_hashes.write().unwrap();
        let mut processed_order = self.processed_order.write().unwrap();

        for hash in hashes {
            if let Some(tx) = transactions.remove(hash) {
                pending_identities.remove(&(tx.from, tx.nonce));
            }
            if processed.insert(hash.clone()) {
                processed_order.push_back(hash.clone());
            }
        }
        while processed_order.len() > PROCESSED_HASH_WINDOW {
            if let Some(old) = processed_order.pop_front() {
                processed.remove(&old);
            }
        }

        let mut order = self.order.write().unwrap();
        order.retain(|h| transactions.contains_key(h));
    }

    /// The oldest `limit` pending transactions, FIFO by arrival.
    pub fn take_batch(&self, limit: usize) -> Vec<Transaction> {
        let order = self.order.read().unwrap();
        let transactions = self.transactions.read().unwrap();
        order
            .iter()
            .take(limit)
            .filter_map(|h| transactions.get(h).cloned())
            .collect()
    }

    pub fn pending_hashes(&self) -> Vec<String> {
        self.order.read().unwrap().iter().cloned().collect()
    }

    pub fn get(&self, hash: &str) -> Option<Transaction> {
        self.transactions.read().unwrap().get(hash).cloned()
    }

    pub fn len(&self) -> usize {
        self.transactions.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_processed(&self, hash: &str) -> bool {
        self.processed_hashes.read().unwrap().contains(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakha_common::address::DEFAULT_HRP;

    fn codec() -> AddressCodec {
        AddressCodec::new(DEFAULT_HRP)
    }

    fn addr(codec: &AddressCodec, seed: u8) -> String {
        codec.encode(&[seed; 20]).unwrap()
    }

    fn transfer(from: &str, to: &str, nonce: u64) -> Transaction {
        Transaction::new(
            from,
            to,
            10.0,
            TransactionKind::Transfer,
            serde_json::json!({}),
            21000,
            1.0,
            nonce,
            1_700_000_000.0,
        )
    }

    #[test]
    fn accepts_a_well_formed_transfer() {
        let codec = codec();
        let pool = Mempool::new(codec.clone(), MAX_POOL_SIZE);
        let tx = transfer(&addr(&codec, 1), &addr(&codec, 2), 0);
        assert!(pool.add_transaction(tx, 0, 1000.0).is_ok());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn rejects_bad_nonce() {
        let codec = codec();
        let pool = Mempool::new(codec.clone(), MAX_POOL_SIZE);
        let tx = transfer(&addr(&codec, 1), &addr(&codec, 2), 5);
        let err = pool.add_transaction(tx, 0, 1000.0).unwrap_err();
        assert!(matches!(err, NodeError::InvalidNonce { .. }));
    }

    #[test]
    fn genesis_sender_bypasses_nonce_check() {
        let codec = codec();
        let pool = Mempool::new(codec.clone(), MAX_POOL_SIZE);
        let tx = transfer(GENESIS, &addr(&codec, 2), 999);
        assert!(pool.add_transaction(tx, 0, 1000.0).is_ok());
    }

    #[test]
    fn rejects_duplicate_from_nonce_pair() {
        let codec = codec();
        let pool = Mempool::new(codec.clone(), MAX_POOL_SIZE);
        let from = addr(&codec, 1);
        let to = addr(&codec, 2);
        pool.add_transaction(transfer(&from, &to, 0), 0, 1000.0).unwrap();
        let second = transfer(&from, &to, 0);
        let err = pool.add_transaction(second, 0, 1000.0).unwrap_err();
        assert!(matches!(err, NodeError::DuplicateNonceInMempool { .. }));
    }

    #[test]
    fn rejects_replay_of_a_processed_hash() {
        let codec = codec();
        let pool = Mempool::new(codec.clone(), MAX_POOL_SIZE);
        let tx = transfer(&addr(&codec, 1), &addr(&codec, 2), 0);
        let hash = tx.hash.clone();
        pool.add_transaction(tx.clone(), 0, 1000.0).unwrap();
        pool.remove_committed(&[hash]);
        let err = pool.add_transaction(tx, 0, 1000.0).unwrap_err();
        assert!(matches!(err, NodeError::DuplicateHash(_)));
    }

    #[test]
    fn rejects_stake_to_non_stake_pool_address() {
        let codec = codec();
        let pool = Mempool::new(codec.clone(), MAX_POOL_SIZE);
        let mut tx = transfer(&addr(&codec, 1), &addr(&codec, 2), 0);
        tx.kind = TransactionKind::Stake;
        let err = pool.add_transaction(tx, 0, 1000.0).unwrap_err();
        assert!(matches!(err, NodeError::KindSpecific(_)));
    }

    #[test]
    fn rejects_stake_below_minimum() {
        let codec = codec();
        let pool = Mempool::new(codec.clone(), MAX_POOL_SIZE);
        let mut tx = transfer(&addr(&codec, 1), &STAKE_POOL.to_string(), 0);
        tx.kind = TransactionKind::Stake;
        tx.amount = 1.0;
        tx.hash = tx.calculate_hash();
        let err = pool.add_transaction(tx, 0, 1000.0).unwrap_err();
        assert!(matches!(err, NodeError::KindSpecific(_)));
    }

    #[test]
    fn rejects_insufficient_balance() {
        let codec = codec();
        let pool = Mempool::new(codec.clone(), MAX_POOL_SIZE);
        let tx = transfer(&addr(&codec, 1), &addr(&codec, 2), 0);
        let err = pool.add_transaction(tx, 0, 1.0).unwrap_err();
        assert!(matches!(err, NodeError::InsufficientFunds { .. }));
    }

    #[test]
    fn rejects_unstake_outright() {
        let codec = codec();
        let pool = Mempool::new(codec.clone(), MAX_POOL_SIZE);
        let mut tx = transfer(&addr(&codec, 1), &addr(&codec, 2), 0);
        tx.kind = TransactionKind::Unstake;
        let err = pool.add_transaction(tx, 0, 1000.0).unwrap_err();
        assert!(matches!(err, NodeError::KindSpecific(_)));
    }

    #[test]
    fn rejects_contract_deploy_without_code() {
        let codec = codec();
        let pool = Mempool::new(codec.clone(), MAX_POOL_SIZE);
        let mut tx = transfer(&addr(&codec, 1), &addr(&codec, 2), 0);
        tx.kind = TransactionKind::ContractDeploy;
        let err = pool.add_transaction(tx, 0, 1000.0).unwrap_err();
        assert!(matches!(err, NodeError::KindSpecific(_)));
    }

    #[test]
    fn enforces_pool_capacity() {
        let codec = codec();
        let pool = Mempool::new(codec.clone(), 1);
        let from1 = addr(&codec, 1);
        let from2 = addr(&codec, 3);
        let to = addr(&codec, 2);
        pool.add_transaction(transfer(&from1, &to, 0), 0, 1000.0).unwrap();
        let err = pool.add_transaction(transfer(&from2, &to, 0), 0, 1000.0).unwrap_err();
        assert!(matches!(err, NodeError::MempoolFull));
    }

    #[test]
    fn take_batch_preserves_fifo_order() {
        let codec = codec();
        let pool = Mempool::new(codec.clone(), MAX_POOL_SIZE);
        let to = addr(&codec, 9);
        let first = transfer(&addr(&codec, 1), &to, 0);
        let second = transfer(&addr(&codec, 2), &to, 0);
        let first_hash = first.hash.clone();
        pool.add_transaction(first, 0, 1000.0).unwrap();
        pool.add_transaction(second, 0, 1000.0).unwrap();
        let batch = pool.take_batch(10);
        assert_eq!(batch[0].hash, first_hash);
    }
}
