//! The `Blockchain` orchestrator: owns the ledger, mempool, contract
//! engine, and chain pipeline, and exposes the node's public API surface
//! the P2P layer, a CLI, or an eventual RPC surface calls into.

use std::path::Path;
use std::sync::Arc;

use lakha_common::address::AddressCodec;
use lakha_common::block::Block;
use lakha_common::error::Result;
use lakha_common::time::now;
use lakha_common::transaction::Transaction;
use lakha_consensus::ChainState;
use lakha_contracts::ContractEngine;
use lakha_ledger::{Account, Ledger};
use lakha_mempool::Mempool;
use lakha_store::Store;
use lakha_validator::Validator;

use crate::config::NodeConfig;

pub struct Blockchain {
    chain: Arc<ChainState>,
}

/// The outcome `submit_transaction` reports to a caller:
/// `accepted` or `rejected(reason)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Accepted,
    Rejected(String),
}

impl Blockchain {
    pub fn open(cfg: &NodeConfig) -> Result<Self> {
        std::fs::create_dir_all(&cfg.data_dir)
            .map_err(|e| lakha_common::error::NodeError::PersistenceError(e.to_string()))?;
        let store = Arc::new(Store::open(Path::new(&cfg.data_dir).join("lakha.redb"))?);
        let codec = AddressCodec::new(cfg.hrp.clone());
        let ledger = Arc::new(Ledger::new(store.clone(), codec.clone()));
        let contracts = Arc::new(ContractEngine::new(codec.clone()));
        let mempool = Arc::new(Mempool::new(codec.clone(), cfg.mempool_cap));
        let chain = Arc::new(ChainState::new(store, codec, ledger, contracts, mempool));
        chain.boot(cfg.genesis_timestamp)?;
        Ok(Self { chain })
    }

    pub fn chain_state(&self) -> Arc<ChainState> {
        self.chain.clone()
    }

    pub fn submit_transaction(&self, tx: Transaction) -> Admission {
        let nonce = self.chain.ledger().get_nonce(&tx.from);
        let balance = self.chain.ledger().get_balance(&tx.from);
        match self.chain.mempool().add_transaction(tx, nonce, balance) {
            Ok(()) => Admission::Accepted,
            Err(error) => Admission::Rejected(error.to_string()),
        }
    }

    pub fn get_block(&self, index: u64) -> Option<Block> {
        self.chain.get_block(index)
    }

    pub fn get_latest_block(&self) -> Block {
        self.chain.latest_block()
    }

    pub fn get_chain_length(&self) -> u64 {
        self.chain.chain_length()
    }

    pub fn get_pending(&self) -> Vec<Transaction> {
        self.chain
            .mempool()
            .pending_hashes()
            .into_iter()
            .filter_map(|hash| self.chain.mempool().get(&hash))
            .collect()
    }

    pub fn get_account(&self, address: &str) -> Option<Account> {
        self.chain.ledger().get_account(address)
    }

    pub fn get_balance(&self, address: &str) -> f64 {
        self.chain.ledger().get_balance(address)
    }

    pub fn get_nonce(&self, address: &str) -> u64 {
        self.chain.ledger().get_nonce(address)
    }

    pub fn get_validators(&self) -> Vec<Validator> {
        self.chain
            .with_validators(|registry| registry.list().into_iter().cloned().collect())
    }

    pub fn get_validator(&self, address: &str) -> Option<Validator> {
        self.chain
            .with_validators(|registry| registry.get(address).cloned())
    }

    /// Registers a new validator directly (outside of a STAKE transaction),
    /// matching the `register_validator(address, stake) -> bool` entry of
    /// the public API surface. Returns `false` if the stake is below
    /// `MIN_STAKE` or the address is already registered.
    pub fn register_validator(&self, address: &str, stake: f64) -> bool {
        if stake < lakha_common::MIN_STAKE {
            return false;
        }
        self.chain.with_validators_mut(|registry| {
            if registry.contains(address) {
                return false;
            }
            registry.register(address, stake, now());
            true
        })
    }

    pub fn mine_block(&self) -> bool {
        self.chain.mine_block(now(), false)
    }

    pub fn get_contract(&self, address: &str) -> Option<lakha_contracts::ContractState> {
        self.chain.contracts().get(address)
    }

    pub fn get_contract_state(&self, address: &str, key_path: &str) -> Result<serde_json::Value> {
        self.chain.contracts().get_contract_state(address, key_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakha_common::address::GENESIS;
    use lakha_common::block::GENESIS_FUNDING;
    use lakha_common::transaction::TransactionKind;

    fn config(dir: &tempfile::TempDir) -> NodeConfig {
        let mut cfg = NodeConfig::default();
        cfg.data_dir = dir.path().to_path_buf();
        cfg
    }

    #[test]
    fn genesis_funding_and_first_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let chain = Blockchain::open(&config(&dir)).unwrap();
        let receiver = chain.chain.codec().encode(&[7u8; 20]).unwrap();

        let tx = Transaction::new(
            GENESIS,
            &receiver,
            100.0,
            TransactionKind::Transfer,
            serde_json::json!({}),
            21_000,
            1.0,
            0,
            1_700_000_000.0,
        );
        assert_eq!(chain.submit_transaction(tx), Admission::Accepted);
        assert!(chain.mine_block());

        assert_eq!(chain.get_balance(&receiver), 100.0);
        assert_eq!(
            chain.get_balance(GENESIS),
            GENESIS_FUNDING - 100.0 - 21_000.0 * lakha_common::NODE_GAS_PRICE
        );
        assert_eq!(chain.get_nonce(GENESIS), 1);
        assert_eq!(chain.get_chain_length(), 2);
    }

    #[test]
    fn replay_is_rejected_after_commit() {
        let dir = tempfile::tempdir().unwrap();
        let chain = Blockchain::open(&config(&dir)).unwrap();
        let receiver = chain.chain.codec().encode(&[8u8; 20]).unwrap();
        let tx = Transaction::new(
            GENESIS,
            &receiver,
            50.0,
            TransactionKind::Transfer,
            serde_json::json!({}),
            21_000,
            1.0,
            0,
            1_700_000_000.0,
        );
        assert_eq!(chain.submit_transaction(tx.clone()), Admission::Accepted);
        assert!(chain.mine_block());

        let before_len = chain.get_chain_length();
        match chain.submit_transaction(tx) {
            Admission::Rejected(reason) => assert!(reason.contains("duplicate")),
            Admission::Accepted => panic!("replayed transaction must be rejected"),
        }
        assert_eq!(chain.get_pending().len(), 0);
        assert_eq!(chain.get_chain_length(), before_len);
    }

    #[test]
    fn restart_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir);
        let receiver;
        {
            let chain = Blockchain::open(&cfg).unwrap();
            receiver = chain.chain.codec().encode(&[9u8; 20]).unwrap();
            let tx = Transaction::new(
                GENESIS,
                &receiver,
                10.0,
                TransactionKind::Transfer,
                serde_json::json!({}),
                21_000,
                1.0,
                0,
                1_700_000_000.0,
            );
            chain.submit_transaction(tx);
            assert!(chain.mine_block());
        }
        let reopened = Blockchain::open(&cfg).unwrap();
        assert_eq!(reopened.get_chain_length(), 2);
        assert_eq!(reopened.get_balance(&receiver), 10.0);
    }
}
