//! The block `state_root`: a canonical hash over the ledger and contract
//! snapshots at block-creation time.

use lakha_common::hash::digest_canonical;
use lakha_contracts::ContractEngine;
use lakha_ledger::Ledger;

pub fn compute_state_root(ledger: &Ledger, contracts: &ContractEngine) -> String {
    let preimage = serde_json::json!({
        "accounts": ledger.accounts_summary(),
        "contracts": contracts.snapshot(),
    });
    digest_canonical(&preimage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakha_common::address::AddressCodec;
    use lakha_store::Store;
    use std::sync::Arc;

    #[test]
    fn state_root_changes_when_ledger_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("ledger.redb")).unwrap());
        let ledger = Ledger::new(store, AddressCodec::default());
        let contracts = ContractEngine::default();

        let before = compute_state_root(&ledger, &contracts);
        ledger.create_account("genesis", 100.0).unwrap();
        let after = compute_state_root(&ledger, &contracts);
        assert_ne!(before, after);
    }
}
