use serde::{Deserialize, Serialize};

/// On-ledger record for one address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    pub balance: f64,
    pub nonce: u64,
    pub created_at: f64,
    pub updated_at: f64,
    pub is_contract: bool,
    #[serde(default)]
    pub contract_address: Option<String>,
}

impl Account {
    pub fn new(address: impl Into<String>, balance: f64, now: f64) -> Self {
        Self {
            address: address.into(),
            balance,
            nonce: 0,
            created_at: now,
            updated_at: now,
            is_contract: false,
            contract_address: None,
        }
    }
}
