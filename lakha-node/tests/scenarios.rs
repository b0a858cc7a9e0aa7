//! End-to-end scenarios exercising the node's public API the way a caller
//! (RPC, CLI, or another node's P2P layer) would.

use lakha_common::address::{GENESIS, STAKE_POOL};
use lakha_common::transaction::TransactionKind;
use lakha_common::Transaction;
use lakha_node::{Admission, Blockchain, NodeConfig};

fn config(dir: &tempfile::TempDir) -> NodeConfig {
    let mut cfg = NodeConfig::default();
    cfg.data_dir = dir.path().to_path_buf();
    cfg
}

fn transfer(from: &str, to: &str, amount: f64, gas_limit: i64, nonce: u64) -> Transaction {
    Transaction::new(
        from,
        to,
        amount,
        TransactionKind::Transfer,
        serde_json::json!({}),
        gas_limit,
        1.0,
        nonce,
        1_700_000_000.0,
    )
}

#[test]
fn stake_and_selection() {
    let dir = tempfile::tempdir().unwrap();
    let chain = Blockchain::open(&config(&dir)).unwrap();
    let validator_addr = chain.chain_state().codec().encode(&[3u8; 20]).unwrap();

    chain.submit_transaction(transfer(GENESIS, &validator_addr, 1000.0, 21_000, 0));
    assert!(chain.mine_block());

    let mut stake_tx = transfer(&validator_addr, STAKE_POOL, 100.0, 10, 0);
    stake_tx.kind = TransactionKind::Stake;
    stake_tx.hash = stake_tx.calculate_hash();
    assert_eq!(chain.submit_transaction(stake_tx), Admission::Accepted);
    assert!(chain.mine_block());

    let validator = chain.get_validator(&validator_addr).expect("registered");
    assert_eq!(validator.stake, 100.0);
    assert!((chain.get_balance(&validator_addr) - 899.99).abs() < 1e-9);

    assert!(chain.mine_block());
    assert_eq!(chain.get_latest_block().validator, validator_addr);
}

#[test]
fn contract_deploy_and_call_survives_restart() {
    const COUNTER_SRC: &str = r#"
        fn set_counter(value) {
            set_state("counter", value);
        }
    "#;

    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);
    let contract_address;
    {
        let chain = Blockchain::open(&cfg).unwrap();

        let mut deploy_tx = transfer(GENESIS, GENESIS, 0.0, 50_000, 0);
        deploy_tx.kind = TransactionKind::ContractDeploy;
        deploy_tx.data = serde_json::json!({
            "contract_code": COUNTER_SRC,
            "initial_state": {"counter": 0},
        });
        deploy_tx.hash = deploy_tx.calculate_hash();
        contract_address = lakha_common::AddressCodec::default()
            .encode(&lakha_consensus::derive_contract_id(&deploy_tx.hash))
            .unwrap();

        assert_eq!(chain.submit_transaction(deploy_tx), Admission::Accepted);
        assert!(chain.mine_block());
        assert!(chain.get_contract(&contract_address).is_some());

        let mut call_tx = transfer(GENESIS, GENESIS, 0.0, 50_000, 1);
        call_tx.kind = TransactionKind::ContractCall;
        call_tx.data = serde_json::json!({
            "contract_address": contract_address,
            "function_name": "set_counter",
            "args": [5],
        });
        call_tx.hash = call_tx.calculate_hash();
        assert_eq!(chain.submit_transaction(call_tx), Admission::Accepted);
        assert!(chain.mine_block());

        assert_eq!(
            chain.get_contract_state(&contract_address, "counter").unwrap(),
            serde_json::json!(5)
        );
    }

    let reopened = Blockchain::open(&cfg).unwrap();
    assert_eq!(
        reopened.get_contract_state(&contract_address, "counter").unwrap(),
        serde_json::json!(5)
    );
}

#[test]
fn penalty_and_rehabilitation() {
    let dir = tempfile::tempdir().unwrap();
    let chain = Blockchain::open(&config(&dir)).unwrap();
    let validator_addr = chain.chain_state().codec().encode(&[4u8; 20]).unwrap();
    assert!(chain.register_validator(&validator_addr, 50.0));

    chain.chain_state().with_validators_mut(|registry| {
        let validator = registry.get_mut(&validator_addr).unwrap();
        validator.apply_penalty("malicious", 20.0, "double-sign", 1_700_000_000.0);
        assert!(validator.current_penalty_multiplier >= 1.5);
        let reputation_after_penalty = validator.reputation_score;
        assert!(reputation_after_penalty < 100.0);

        for _ in 0..20 {
            validator.earn_contribution_credits("rehab", 5.0, "community service", 1_700_000_100.0);
        }
        assert!(validator.current_penalty_multiplier < 5.0);
        assert_eq!(validator.rehabilitation_progress, 0.0);
    });
}
