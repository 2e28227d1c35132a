//! Cache Key Module
//!
//! Derives a deterministic cache key from a (namespace, identifier, params)
//! triple. The key doubles as an entry file name, so it carries the
//! human-readable namespace and identifier as a prefix for inspectability,
//! followed by a SHA-256 digest of the canonicalized request shape.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

// == Key Generation ==
/// Derives the cache key for a (namespace, identifier, params) triple.
///
/// Pure function, no I/O. Identical triples always yield the same key:
/// `params` is compared by serialized form, so mapping keys are sorted
/// recursively before digesting and insertion order never matters.
///
/// # Arguments
/// * `namespace` - Logical grouping, e.g. the tool family ("tool")
/// * `identifier` - Operation name, e.g. "fetchTicker"
/// * `params` - Request parameters; `None` is treated as an empty mapping
pub fn generate_key(namespace: &str, identifier: &str, params: Option<&Value>) -> String {
    let empty = Value::Object(Map::new());
    let mut envelope = Map::new();
    envelope.insert("namespace".to_string(), Value::String(namespace.to_string()));
    envelope.insert("identifier".to_string(), Value::String(identifier.to_string()));
    envelope.insert(
        "params".to_string(),
        canonicalize(params.unwrap_or(&empty)),
    );

    let canonical = serde_json::to_string(&Value::Object(envelope))
        .expect("canonical JSON value serialization cannot fail");

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hex::encode(hasher.finalize());

    format!("{namespace}_{identifier}_{digest}")
}

// == Canonicalization ==
/// Rebuilds a JSON value with every object's keys in sorted order.
///
/// Arrays keep their element order (position is meaningful); only mapping
/// key order is normalized, recursively.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<(&String, &Value)> = map.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
