//! Stable hashing helpers for operator identities, cache ids, and manifests.
//!
//! Everything that ends up as a durable key (operator ids, dataset ids) is
//! hashed over a *canonical* JSON rendering: object keys sorted at every level,
//! no insignificant whitespace. Do not hash `serde_json::to_string` output of
//! arbitrary values directly; key order there depends on crate features.

use blake3::Hasher;
use serde::Serialize;
use serde_json::Value as Json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        // blake3 hex(32b) is 64 hex chars
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut s, "{:02x}", b);
        }
        s
    }

    /// First `n` hex characters of the digest (clamped to 64).
    pub fn short_hex(&self, n: usize) -> String {
        let mut hex = self.to_hex();
        hex.truncate(n.min(64));
        hex
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    let mut h = Hasher::new();
    h.update(bytes);
    let out = h.finalize();
    Hash256(out.into())
}

pub fn hash_str(s: &str) -> Hash256 {
    hash_bytes(s.as_bytes())
}

/// Hash any serde-serializable value deterministically (via canonical JSON).
pub fn hash_serde<T: Serialize>(v: &T) -> Result<Hash256, crate::error::Error> {
    let json = serde_json::to_value(v)?;
    Ok(hash_str(&canonical_json(&json)))
}

/// Render JSON with object keys sorted recursively.
pub fn canonical_json(v: &Json) -> String {
    let mut out = String::new();
    write_canonical(v, &mut out);
    out
}

fn write_canonical(v: &Json, out: &mut String) {
    match v {
        Json::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // String keys always serialize.
                out.push_str(&Json::String((*k).clone()).to_string());
                out.push(':');
                write_canonical(&map[k.as_str()], out);
            }
            out.push('}');
        }
        Json::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let a = json!({"b": 1, "a": {"z": true, "y": [3, {"k": 1, "j": 2}]}});
        assert_eq!(
            canonical_json(&a),
            r#"{"a":{"y":[3,{"j":2,"k":1}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn hash_serde_ignores_key_insertion_order() {
        let mut m1 = serde_json::Map::new();
        m1.insert("x".into(), json!(1));
        m1.insert("y".into(), json!("two"));
        let mut m2 = serde_json::Map::new();
        m2.insert("y".into(), json!("two"));
        m2.insert("x".into(), json!(1));
        assert_eq!(hash_serde(&m1).unwrap(), hash_serde(&m2).unwrap());
    }

    #[test]
    fn short_hex_truncates() {
        let h = hash_str("semflow");
        assert_eq!(h.short_hex(6).len(), 6);
        assert!(h.to_hex().starts_with(&h.short_hex(6)));
        assert_eq!(h.short_hex(100).len(), 64);
    }
}
