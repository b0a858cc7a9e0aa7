//! The contract registry, sandboxed source validator, and tree-walking
//! interpreter.

pub mod ast;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod sandbox;
pub mod state;
pub mod value;

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use lakha_common::address::AddressCodec;
use lakha_common::error::{NodeError, Result};

pub use interpreter::ExecutionContext;
pub use sandbox::validate_contract_source;
pub use state::{sanitize_to_json, ContractEvent, ContractState, ContractStatus};
pub use value::Value;

/// Every contract deploy validates source against this ceiling before the
/// per-call `gas_limit` governs execution.
pub const MAX_GAS_LIMIT: u64 = 1_000_000;

pub struct ContractEngine {
    codec: AddressCodec,
    contracts: RwLock<HashMap<String, ContractState>>,
    events: RwLock<Vec<ContractEvent>>,
}

impl Default for ContractEngine {
    fn default() -> Self {
        Self::new(AddressCodec::default())
    }
}

impl ContractEngine {
    pub fn new(codec: AddressCodec) -> Self {
        Self {
            codec,
            contracts: RwLock::new(HashMap::new()),
            events: RwLock::new(Vec::new()),
        }
    }

    pub fn get(&self, address: &str) -> Option<ContractState> {
        self.contracts.read().unwrap().get(address).cloned()
    }

    pub fn insert(&self, contract: ContractState) {
        self.contracts
            .write()
            .unwrap()
            .insert(contract.contract_address.clone(), contract);
    }

    pub fn events(&self) -> Vec<ContractEvent> {
        self.events.read().unwrap().clone()
    }

    /// Every contract, sorted by address, for the node's read-only
    /// introspection surface and for the block `state_root` computation.
    pub fn snapshot(&self) -> Vec<ContractState> {
        let mut contracts: Vec<ContractState> = self.contracts.read().unwrap().values().cloned().collect();
        contracts.sort_by(|a, b| a.contract_address.cmp(&b.contract_address));
        contracts
    }

    /// Validates `contract_code`, mints a fresh address, sanitizes the
    /// initial state, stores the contract, and emits `ContractDeployed`.
    pub fn deploy_contract(
        &self,
        contract_code: &str,
        initial_state: &serde_json::Value,
        deployer_address: &str,
        gas_limit: u64,
        contract_id: &[u8; 20],
        now: f64,
    ) -> Result<String> {
        if gas_limit > MAX_GAS_LIMIT {
            return Err(NodeError::InvalidGas {
                limit: gas_limit as i64,
                price: 0.0,
            });
        }
        validate_contract_source(contract_code, gas_limit)?;

        let state_value = Value::from_json(initial_state);
        let sanitized = match state_value {
            Value::Dict(d) => state::sanitize_to_json(&d),
            _ => serde_json::Value::Object(Default::default()),
        };

        let contract_address = self
            .codec
            .encode(contract_id)
            .map_err(|_| NodeError::InvalidAddress("contract address generation failed".into()))?;

        let contract = ContractState {
            contract_address: contract_address.clone(),
            code: contract_code.to_string(),
            data: sanitized.clone(),
            owner: deployer_address.to_string(),
            status: ContractStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.insert(contract);

        self.events.write().unwrap().push(ContractEvent {
            contract_address: contract_address.clone(),
            event_name: "ContractDeployed".to_string(),
            data: serde_json::json!({
                "deployer": deployer_address,
                "contract_address": contract_address,
                "initial_state": sanitized,
            }),
            block_number: 0,
            transaction_hash: String::new(),
        });

        Ok(contract_address)
    }

    /// Runs `function_name` on the deployed contract. On success, the
    /// sanitized post-call state is persisted; on error, nothing is written
    /// back, which is the snapshot-on-entry revert contracts require.
    pub fn call_contract(
        &self,
        contract_address: &str,
        function_name: &str,
        args: Vec<Value>,
        caller_address: &str,
        gas_limit: u64,
        block_index: u64,
        now: f64,
    ) -> Result<Value> {
        let contract = self
            .contracts
            .read()
            .unwrap()
            .get(contract_address)
            .cloned()
            .ok_or_else(|| NodeError::ContractValidationFailed("contract not found".into()))?;
        if contract.status != ContractStatus::Active {
            return Err(NodeError::ContractValidationFailed(
                "contract is not active".into(),
            ));
        }

        let program = parser::parse(&contract.code)?;
        let mut data: BTreeMap<String, Value> = match Value::from_json(&contract.data) {
            Value::Dict(d) => d,
            _ => BTreeMap::new(),
        };

        let context = ExecutionContext {
            caller: caller_address.to_string(),
            block_index,
            block_timestamp: now,
        };
        let mut interp = interpreter::Interpreter::new(&program, &mut data, context, gas_limit);
        let result = interp.call(function_name, args)?;
        let emitted = interp.take_events();

        let sanitized = state::sanitize_to_json(&data);
        let mut updated = contract;
        updated.data = sanitized;
        updated.updated_at = now;
        let address = updated.contract_address.clone();
        self.insert(updated);

        if !emitted.is_empty() {
            let mut events = self.events.write().unwrap();
            for (name, payload) in emitted {
                events.push(ContractEvent {
                    contract_address: address.clone(),
                    event_name: name,
                    data: payload.to_json(),
                    block_number: block_index,
                    transaction_hash: String::new(),
                });
            }
        }

        Ok(result)
    }

    /// Reads contract state, optionally navigating a dotted key path (e.g.
    /// `"students.123.grade"`), returning `None` when any segment is absent.
    pub fn get_contract_state(&self, contract_address: &str, key_path: &str) -> Result<serde_json::Value> {
        let contract = self
            .contracts
            .read()
            .unwrap()
            .get(contract_address)
            .cloned()
            .ok_or_else(|| NodeError::ContractValidationFailed("contract not found".into()))?;
        if key_path.is_empty() {
            return Ok(contract.data);
        }
        let mut current = &contract.data;
        for segment in key_path.split('.') {
            match current.get(segment) {
                Some(next) => current = next,
                None => return Ok(serde_json::Value::Null),
            }
        }
        Ok(current.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ContractEngine {
        ContractEngine::default()
    }

    const COUNTER_SRC: &str = r#"
        fn increment() {
            let current = get_state("count");
            set_state("count", 1);
            emit_event("Incremented", msg.sender);
        }
    "#;

    #[test]
    fn deploy_then_call_persists_state_and_events() {
        let engine = engine();
        let address = engine
            .deploy_contract(
                COUNTER_SRC,
                &serde_json::json!({"count": 0}),
                "lakha1deployer",
                10_000,
                &[1u8; 20],
                1_700_000_000.0,
            )
            .unwrap();

        engine
            .call_contract(&address, "increment", vec![], "lakha1caller", 10_000, 1, 1_700_000_001.0)
            .unwrap();

        let state = engine.get_contract_state(&address, "count").unwrap();
        assert_eq!(state, serde_json::json!(1));
        assert_eq!(engine.events().len(), 2); // ContractDeployed + Incremented
    }

    #[test]
    fn call_on_unknown_contract_fails() {
        let engine = engine();
        let err = engine
            .call_contract("lakha1missing", "increment", vec![], "caller", 10_000, 1, 0.0)
            .unwrap_err();
        assert!(matches!(err, NodeError::ContractValidationFailed(_)));
    }

    #[test]
    fn deploy_rejects_forbidden_source() {
        let engine = engine();
        let err = engine
            .deploy_contract(
                "let x = os;",
                &serde_json::json!({}),
                "lakha1deployer",
                10_000,
                &[2u8; 20],
                0.0,
            )
            .unwrap_err();
        assert!(matches!(err, NodeError::ForbiddenConstruct(_)));
    }

    #[test]
    fn deploy_rejects_gas_limit_above_ceiling() {
        let engine = engine();
        let err = engine
            .deploy_contract(
                COUNTER_SRC,
                &serde_json::json!({}),
                "lakha1deployer",
                MAX_GAS_LIMIT + 1,
                &[3u8; 20],
                0.0,
            )
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidGas { .. }));
    }
}
