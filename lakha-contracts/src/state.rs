//! Contract registry types and state sanitization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractState {
    pub contract_address: String,
    pub code: String,
    pub data: Json,
    pub owner: String,
    pub status: ContractStatus,
    pub created_at: f64,
    pub updated_at: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractEvent {
    pub contract_address: String,
    pub event_name: String,
    pub data: Json,
    pub block_number: u64,
    pub transaction_hash: String,
}

/// Recursively sanitizes a runtime `Value` so it always round-trips through
/// JSON: `None` is dropped from containing objects, the empty
/// string key becomes `"_empty_key"`, and non-finite floats are clamped to
/// large finite sentinels (`+inf -> 1e308`, `-inf -> -1e308`, `NaN -> 0.0`).
/// This has to run on `Value` rather than `serde_json::Value` because
/// `serde_json` cannot represent a non-finite float at all — by the time a
/// number becomes `serde_json::Value`, the information sanitization needs
/// to act on is already gone.
pub fn sanitize_value(value: &Value) -> Option<Value> {
    match value {
        Value::None => None,
        Value::Bool(_) | Value::Int(_) | Value::Str(_) => Some(value.clone()),
        Value::Float(f) => Some(Value::Float(if f.is_infinite() {
            if *f > 0.0 {
                1e308
            } else {
                -1e308
            }
        } else if f.is_nan() {
            0.0
        } else {
            *f
        })),
        Value::List(items) => Some(Value::List(items.iter().filter_map(sanitize_value).collect())),
        Value::Dict(obj) => Some(Value::Dict(sanitize_object(obj))),
    }
}

pub fn sanitize_object(obj: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    for (key, value) in obj {
        let key = if key.is_empty() {
            "_empty_key".to_string()
        } else {
            key.clone()
        };
        if let Some(sanitized) = sanitize_value(value) {
            out.insert(key, sanitized);
        }
    }
    out
}

/// Sanitizes a whole state map and hands back the JSON form the store
/// persists.
pub fn sanitize_to_json(obj: &BTreeMap<String, Value>) -> Json {
    Value::Dict(sanitize_object(obj)).to_json()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(pairs: Vec<(&str, Value)>) -> BTreeMap<String, Value> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn drops_null_fields() {
        let input = dict(vec![("a", Value::Int(1)), ("b", Value::None)]);
        let sanitized = sanitize_object(&input);
        assert!(sanitized.contains_key("a"));
        assert!(!sanitized.contains_key("b"));
    }

    #[test]
    fn renames_empty_key() {
        let input = dict(vec![("", Value::Int(1))]);
        let sanitized = sanitize_object(&input);
        assert!(sanitized.contains_key("_empty_key"));
    }

    #[test]
    fn clamps_non_finite_floats() {
        let input = dict(vec![
            ("pos_inf", Value::Float(f64::INFINITY)),
            ("neg_inf", Value::Float(f64::NEG_INFINITY)),
            ("nan", Value::Float(f64::NAN)),
        ]);
        let sanitized = sanitize_object(&input);
        assert_eq!(sanitized["pos_inf"].as_f64(), Some(1e308));
        assert_eq!(sanitized["neg_inf"].as_f64(), Some(-1e308));
        assert_eq!(sanitized["nan"].as_f64(), Some(0.0));
    }
}
