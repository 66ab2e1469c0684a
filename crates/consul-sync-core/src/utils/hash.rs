//! Deterministic structural hash of option objects.
//!
//! Used as the key of the client and API caches: two configurations that
//! differ only in map key order, or in the order of array elements, hash
//! the same.

use serde::Serialize;
use serde_json::Value;
use xxhash_rust::xxh32::xxh32;

const SEED: u32 = 0xCAFE_BABE;

const UNDEFINED: &str = "#thisisundefined#";
const NULL: &str = "#thisisnull#";
const EMPTY_STRING: &str = "#thisisemptystring#";

/// Hash of an optional value; `None` is the "undefined" sentinel.
pub fn hash_value(value: Option<&Value>) -> String {
    let input = match value {
        None => UNDEFINED.to_string(),
        Some(v) => hash_input(v),
    };
    format!("{:x}", xxh32(input.as_bytes(), SEED))
}

/// Hash of anything serializable. Serialization failure hashes as "undefined".
pub fn config_hash<T: Serialize + ?Sized>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(v) => hash_value(Some(&v)),
        Err(e) => {
            tracing::warn!("config_hash: value is not serializable: {}", e);
            hash_value(None)
        },
    }
}

fn hash_input(value: &Value) -> String {
    match value {
        Value::Null => NULL.to_string(),
        Value::String(s) if s.is_empty() => EMPTY_STRING.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => format!("i{}", n),
        Value::Bool(b) => format!("b{}", u8::from(*b)),
        Value::Array(items) => {
            let mut pairs: Vec<(String, &Value)> =
                items.iter().map(|item| (hash_value(Some(item)), item)).collect();
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            let sorted: Vec<&Value> = pairs.into_iter().map(|(_, v)| v).collect();
            serde_json::to_string(&sorted).unwrap_or_default()
        },
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            keys.into_iter()
                .map(|key| format!("{}{}", key, hash_value(map.get(key))))
                .collect()
        },
    }
}
