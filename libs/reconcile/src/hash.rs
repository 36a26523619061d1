//! Change detection for reconciled objects.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hash of the parts of an object a reconciler acts on.
///
/// Covers `spec` and `metadata.labels`; status-only writes keep the hash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpecHash(String);

impl SpecHash {
    /// Compute a spec hash from canonical JSON.
    pub fn from_json(json: &Value) -> Self {
        let canonical = canonical_json(json);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let result = hasher.finalize();
        Self(format!("sha256:{}", hex::encode(&result[..16])))
    }

    /// Hash the desired-state parts of a serialized object.
    pub fn of_object(object: &Value) -> Self {
        let desired = serde_json::json!({
            "spec": object.get("spec").cloned().unwrap_or(Value::Null),
            "labels": object
                .get("metadata")
                .and_then(|m| m.get("labels"))
                .cloned()
                .unwrap_or(Value::Null),
        });
        Self::from_json(&desired)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SpecHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the manager last saw of an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub spec_hash: SpecHash,
    pub resource_version: String,
}

impl Fingerprint {
    pub fn of_object(object: &Value) -> Self {
        Self {
            spec_hash: SpecHash::of_object(object),
            resource_version: object
                .get("metadata")
                .and_then(|m| m.get("resourceVersion"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// Produce canonical JSON (sorted keys, no extra whitespace).
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let inner: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("{}:{}", Value::String((*k).clone()), canonical_json(v)))
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        Value::Array(arr) => {
            let inner: Vec<String> = arr.iter().map(canonical_json).collect();
            format!("[{}]", inner.join(","))
        }
        other => other.to_string(),
    }
}
