//! The block production, validation, and append pipeline: the one place
//! every other crate's state gets mutated together.
//!
//! Ledger, contract, validator, and mempool mutations all happen on this
//! struct's own locks rather than through some outer coordinator, so a
//! single `Arc<ChainState>` can be shared between the mining loop and
//! whatever RPC/P2P surface calls into it later.

use std::sync::{Arc, RwLock};

use sha2::{Digest, Sha256};

use lakha_common::address::{AddressCodec, GENESIS, STAKE_POOL};
use lakha_common::block::{Block, GENESIS_FUNDING};
use lakha_common::error::{NodeError, Result};
use lakha_common::transaction::{Transaction, TransactionKind};
use lakha_common::{BLOCK_REWARD, BLOCK_TIME, MAX_BLOCK_TXS, NODE_GAS_PRICE, P2P_SETTLE_MS};
use lakha_contracts::{ContractEngine, ContractState, Value};
use lakha_ledger::Ledger;
use lakha_mempool::Mempool;
use lakha_store::{Store, CONTRACT_PREFIX, VALIDATOR_PREFIX};
use lakha_validator::{Validator, ValidatorRegistry};

use crate::state_root;

/// Derives a contract's 20-byte identifier from the hash of the deploying
/// transaction, so the same deploy is never assigned two addresses and two
/// independently-replaying nodes agree on the result.
/// Derives a deployed contract's address deterministically from the hash of
/// the deploying transaction, so independently-replaying nodes (and callers
/// predicting an address before a block is mined) agree on it.
pub fn derive_contract_id(tx_hash: &str) -> [u8; 20] {
    let mut hasher = Sha256::new();
    hasher.update(tx_hash.as_bytes());
    let digest = hasher.finalize();
    let mut id = [0u8; 20];
    id.copy_from_slice(&digest[..20]);
    id
}

pub struct ChainState {
    store: Arc<Store>,
    codec: AddressCodec,
    ledger: Arc<Ledger>,
    contracts: Arc<ContractEngine>,
    validators: RwLock<ValidatorRegistry>,
    mempool: Arc<Mempool>,
    chain: RwLock<Vec<Block>>,
}

impl ChainState {
    pub fn new(
        store: Arc<Store>,
        codec: AddressCodec,
        ledger: Arc<Ledger>,
        contracts: Arc<ContractEngine>,
        mempool: Arc<Mempool>,
    ) -> Self {
        Self {
            store,
            codec,
            ledger,
            contracts,
            validators: RwLock::new(ValidatorRegistry::new()),
            mempool,
            chain: RwLock::new(Vec::new()),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn contracts(&self) -> &ContractEngine {
        &self.contracts
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn chain_length(&self) -> u64 {
        self.chain.read().unwrap().len() as u64
    }

    pub fn latest_block(&self) -> Block {
        self.chain
            .read()
            .unwrap()
            .last()
            .cloned()
            .expect("boot() always seeds at least the genesis block")
    }

    pub fn get_block(&self, index: u64) -> Option<Block> {
        self.chain.read().unwrap().get(index as usize).cloned()
    }

    pub fn with_validators<R>(&self, f: impl FnOnce(&ValidatorRegistry) -> R) -> R {
        f(&self.validators.read().unwrap())
    }

    pub fn with_validators_mut<R>(&self, f: impl FnOnce(&mut ValidatorRegistry) -> R) -> R {
        f(&mut self.validators.write().unwrap())
    }

    /// Loads every persisted account, contract, and validator, then replays
    /// `block:0`, `block:1`, ... until the first gap. An empty store gets a
    /// fresh genesis block and the genesis account's initial funding.
    pub fn boot(&self, now: f64) -> Result<()> {
        self.ledger.rehydrate()?;

        for (_, bytes) in self.store.iterate(CONTRACT_PREFIX)? {
            let contract: ContractState =
                serde_json::from_slice(&bytes).map_err(|e| NodeError::PersistenceError(e.to_string()))?;
            self.contracts.insert(contract);
        }

        {
            let mut registry = self.validators.write().unwrap();
            for (_, bytes) in self.store.iterate(VALIDATOR_PREFIX)? {
                let validator: Validator =
                    serde_json::from_slice(&bytes).map_err(|e| NodeError::PersistenceError(e.to_string()))?;
                registry.insert(validator);
            }
        }

        let stored_blocks = self.store.blocks_until_gap()?;
        if stored_blocks.is_empty() {
            self.bootstrap_genesis(now)?;
        } else {
            let mut chain = self.chain.write().unwrap();
            for bytes in stored_blocks {
                let block: Block =
                    serde_json::from_slice(&bytes).map_err(|e| NodeError::PersistenceError(e.to_string()))?;
                chain.push(block);
            }
        }
        Ok(())
    }

    fn bootstrap_genesis(&self, now: f64) -> Result<()> {
        let _ = now;
        let genesis_block = Block::genesis();
        self.persist_block(&genesis_block)?;
        self.chain.write().unwrap().push(genesis_block);
        self.ledger.create_account(GENESIS, GENESIS_FUNDING)?;
        Ok(())
    }

    fn persist_block(&self, block: &Block) -> Result<()> {
        let value = serde_json::to_value(block).map_err(|e| NodeError::PersistenceError(e.to_string()))?;
        self.store.put_json(&format!("block:{}", block.index), &value)
    }

    fn persist_contract(&self, address: &str) -> Result<()> {
        if let Some(contract) = self.contracts.get(address) {
            let value =
                serde_json::to_value(&contract).map_err(|e| NodeError::PersistenceError(e.to_string()))?;
            self.store.put_json(&format!("{CONTRACT_PREFIX}{address}"), &value)?;
        }
        Ok(())
    }

    fn persist_validator(&self, address: &str) -> Result<()> {
        let registry = self.validators.read().unwrap();
        if let Some(validator) = registry.get(address) {
            let value =
                serde_json::to_value(validator).map_err(|e| NodeError::PersistenceError(e.to_string()))?;
            self.store.put_json(&format!("{VALIDATOR_PREFIX}{address}"), &value)?;
        }
        Ok(())
    }

    /// Takes up to `MAX_BLOCK_TXS` pending transactions, snapshots the
    /// resulting state root, and chains off the current tip. Does not touch
    /// the mempool or the ledger; those only change on `add_block`.
    pub fn create_block(&self, validator_address: &str, now: f64) -> Block {
        let transactions = self.mempool.take_batch(MAX_BLOCK_TXS);
        let state_root = state_root::compute_state_root(&self.ledger, &self.contracts);
        let chain = self.chain.read().unwrap();
        let tip = chain.last().expect("boot() always seeds at least the genesis block");
        Block::new(
            chain.len() as u64,
            now,
            transactions,
            tip.hash.clone(),
            validator_address,
            state_root,
        )
    }

    pub fn validate_block(&self, block: &Block) -> bool {
        let chain = self.chain.read().unwrap();
        if block.index != chain.len() as u64 {
            return false;
        }
        let tip = match chain.last() {
            Some(tip) => tip,
            None => return false,
        };
        if block.previous_hash != tip.hash {
            return false;
        }
        drop(chain);
        if block.validator != GENESIS && !self.validators.read().unwrap().contains(&block.validator) {
            return false;
        }
        block.hash == block.calculate_hash()
    }

    /// Applies one transaction's balance moves, contract dispatch, and
    /// nonce bump. The sender's nonce is bumped unconditionally, mirroring
    /// that a transaction occupies its nonce slot whether or not it
    /// ultimately succeeds.
    fn process_transaction(&self, tx: &Transaction, block_number: u64, now: f64) -> Result<()> {
        self.ledger.increment_nonce(&tx.from)?;
        let gas_cost = tx.gas_limit.max(0) as f64 * NODE_GAS_PRICE;
        let gas_limit = tx.gas_limit.max(0) as u64;

        match tx.kind {
            TransactionKind::Transfer => self.ledger.record_transaction(
                &tx.hash,
                block_number,
                &tx.from,
                &tx.to,
                tx.amount,
                "transfer",
                "Token transfer",
                gas_cost,
            ),
            TransactionKind::Stake => {
                self.ledger.record_transaction(
                    &tx.hash,
                    block_number,
                    &tx.from,
                    STAKE_POOL,
                    tx.amount,
                    "stake",
                    "Validator stake",
                    gas_cost,
                )?;
                self.with_validators_mut(|registry| {
                    if !registry.contains(&tx.from) {
                        registry.register(&tx.from, tx.amount, now);
                    }
                });
                self.persist_validator(&tx.from)
            }
            TransactionKind::ContractDeploy => {
                let code = tx
                    .data
                    .get("contract_code")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let initial_state = tx
                    .data
                    .get("initial_state")
                    .cloned()
                    .unwrap_or_else(|| serde_json::json!({}));
                let contract_id = derive_contract_id(&tx.hash);
                let address = self
                    .contracts
                    .deploy_contract(code, &initial_state, &tx.from, gas_limit, &contract_id, now)?;
                self.persist_contract(&address)?;
                self.ledger
                    .update_balance(&tx.from, -gas_cost, &tx.hash, block_number, "Gas cost for contract deployment", gas_cost)
                    .map(|_| ())
            }
            TransactionKind::ContractCall => {
                let contract_address = tx
                    .data
                    .get("contract_address")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let function_name = tx
                    .data
                    .get("function_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let args: Vec<Value> = tx
                    .data
                    .get("args")
                    .and_then(|v| v.as_array())
                    .cloned()
                    .unwrap_or_default()
                    .iter()
                    .map(Value::from_json)
                    .collect();
                self.contracts
                    .call_contract(&contract_address, function_name, args, &tx.from, gas_limit, block_number, now)?;
                self.persist_contract(&contract_address)?;
                self.ledger
                    .update_balance(&tx.from, -gas_cost, &tx.hash, block_number, "Gas cost for contract call", gas_cost)
                    .map(|_| ())
            }
            TransactionKind::Unstake => Err(NodeError::KindSpecific("UNSTAKE is not yet supported".into())),
        }
    }

    /// Validates, applies every transaction (skipping failures rather than
    /// aborting the block), evicts committed hashes from the mempool,
    /// persists, and rewards the validator.
    pub fn add_block(&self, block: Block, now: f64) -> bool {
        if !self.validate_block(&block) {
            tracing::warn!(index = block.index, "rejected invalid block");
            return false;
        }

        let tx_count = block.transactions.len() as u64;
        for tx in &block.transactions {
            if let Err(error) = self.process_transaction(tx, block.index, now) {
                tracing::warn!(tx_hash = %tx.hash, %error, "transaction processing failed, skipping");
            }
        }

        let hashes: Vec<String> = block.transactions.iter().map(|tx| tx.hash.clone()).collect();
        let tx_kinds: Vec<String> = block.transactions.iter().map(|tx| tx.kind.to_string()).collect();
        self.mempool.remove_committed(&hashes);

        if let Err(error) = self.persist_block(&block) {
            tracing::error!(%error, "failed to persist block");
            return false;
        }

        let validator_address = block.validator.clone();
        let block_index = block.index;
        self.chain.write().unwrap().push(block);

        if let Err(error) =
            self.ledger
                .update_balance(&validator_address, BLOCK_REWARD, "", block_index, "Block reward", 0.0)
        {
            tracing::warn!(%error, "failed to credit block reward");
        }

        let chain_len = self.chain_length();
        let peer_review_candidate = self.with_validators_mut(|registry| {
            if let Some(validator) = registry.get_mut(&validator_address) {
                validator.blocks_validated += 1;
                validator.last_block_time = now;
                validator.total_rewards += BLOCK_REWARD;
                validator.update_activity(now);
                validator.update_contribution_score(10.0, "block_validated", now);
                validator.update_reliability_score(true, 1.0);
                validator.record_transaction_kinds(tx_kinds);
                validator.update_uptime(BLOCK_TIME);
                validator.record_block_attempt(true, tx_count);
                true
            } else {
                false
            }
        });
        if peer_review_candidate {
            if let Err(error) = self.persist_validator(&validator_address) {
                tracing::warn!(%error, "failed to persist validator after block reward");
            }
        }
        self.with_validators_mut(|registry| registry.trigger_peer_reviews(chain_len, now));

        true
    }

    /// Selects a validator (genesis-special-cased for the very first block
    /// when no validator is registered yet), waits out the P2P settle
    /// window if peers are connected, and produces + appends one block.
    /// Returns `false` immediately if there is nothing pending to mine.
    pub fn mine_block(&self, now: f64, has_peers: bool) -> bool {
        if self.mempool.is_empty() {
            return false;
        }
        if has_peers {
            std::thread::sleep(std::time::Duration::from_millis(P2P_SETTLE_MS));
        }

        let chain_len = self.chain_length();
        let no_validators = self.with_validators(|registry| registry.is_empty());
        let validator = if chain_len == 1 && no_validators {
            GENESIS.to_string()
        } else {
            self.with_validators_mut(|registry| registry.select_validator(now))
                .unwrap_or_else(|| GENESIS.to_string())
        };

        let block = self.create_block(&validator, now);
        self.add_block(block, now)
    }

    pub fn codec(&self) -> &AddressCodec {
        &self.codec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakha_common::address::AddressCodec;

    fn chain() -> (ChainState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("chain.redb")).unwrap());
        let codec = AddressCodec::default();
        let ledger = Arc::new(Ledger::new(store.clone(), codec.clone()));
        let contracts = Arc::new(ContractEngine::new(codec.clone()));
        let mempool = Arc::new(Mempool::new(codec.clone(), lakha_mempool::MAX_POOL_SIZE));
        let chain = ChainState::new(store, codec, ledger, contracts, mempool);
        chain.boot(1_700_000_000.0).unwrap();
        (chain, dir)
    }

    fn transfer(from: &str, to: &str, amount: f64, nonce: u64) -> Transaction {
        Transaction::new(
            from,
            to,
            amount,
            TransactionKind::Transfer,
            serde_json::json!({}),
            21_000,
            1.0,
            nonce,
            1_700_000_100.0,
        )
    }

    #[test]
    fn boot_seeds_genesis_block_and_funding() {
        let (chain, _dir) = chain();
        assert_eq!(chain.chain_length(), 1);
        assert_eq!(chain.ledger().get_balance(GENESIS), GENESIS_FUNDING);
    }

    #[test]
    fn mine_block_returns_false_when_mempool_empty() {
        let (chain, _dir) = chain();
        assert!(!chain.mine_block(1_700_000_100.0, false));
    }

    #[test]
    fn first_block_is_mined_by_genesis_with_no_validators() {
        let (chain, _dir) = chain();
        let receiver = chain.codec().encode(&[9u8; 20]).unwrap();
        let tx = transfer(GENESIS, &receiver, 100.0, 0);
        chain.mempool().add_transaction(tx, 0, GENESIS_FUNDING).unwrap();

        assert!(chain.mine_block(1_700_000_100.0, false));
        assert_eq!(chain.chain_length(), 2);
        assert_eq!(chain.ledger().get_balance(&receiver), 100.0);
        assert_eq!(
            chain.ledger().get_balance(GENESIS),
            GENESIS_FUNDING - 100.0 - 21_000.0 * NODE_GAS_PRICE
        );
    }

    #[test]
    fn stake_transaction_registers_a_validator() {
        let (chain, _dir) = chain();
        let validator_addr = chain.codec().encode(&[5u8; 20]).unwrap();
        chain
            .mempool()
            .add_transaction(transfer(GENESIS, &validator_addr, 1000.0, 0), 0, GENESIS_FUNDING)
            .unwrap();
        assert!(chain.mine_block(1_700_000_100.0, false));

        let mut stake_tx = transfer(&validator_addr, STAKE_POOL, 100.0, 0);
        stake_tx.kind = TransactionKind::Stake;
        stake_tx.hash = stake_tx.calculate_hash();
        chain
            .mempool()
            .add_transaction(stake_tx, 0, chain.ledger().get_balance(&validator_addr))
            .unwrap();
        assert!(chain.mine_block(1_700_000_200.0, false));

        assert!(chain.with_validators(|registry| registry.contains(&validator_addr)));
        assert_eq!(chain.with_validators(|r| r.get(&validator_addr).unwrap().stake), 100.0);
    }

    #[test]
    fn invalid_previous_hash_is_rejected() {
        let (chain, _dir) = chain();
        let mut block = chain.create_block(GENESIS, 1_700_000_100.0);
        block.previous_hash = "not-the-tip".to_string();
        block.hash = block.calculate_hash();
        assert!(!chain.add_block(block, 1_700_000_100.0));
        assert_eq!(chain.chain_length(), 1);
    }
}
