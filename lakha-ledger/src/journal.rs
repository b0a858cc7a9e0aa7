use serde::{Deserialize, Serialize};

/// One leg of a balance move. `record_transaction` and `update_balance`
/// each append one or more of these; a transfer with a nonzero gas cost
/// produces three (debit, credit, gas) rather than one net entry, so the
/// journal can always answer "why did this balance change" without
/// reconstructing it from the block log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Debit,
    Credit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub tx_hash: String,
    pub block_number: u64,
    pub account: String,
    pub kind: EntryKind,
    pub amount: f64,
    pub balance_after: f64,
    pub description: String,
    pub timestamp: f64,
}
