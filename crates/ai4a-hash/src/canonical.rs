//! Canonical JSON serialization and the SHA-256 wrapper built on it.
//!
//! Every hash in the system is `SHA-256(canonical(value))` rendered as
//! lowercase hex. The canonical form is independent of mapping iteration
//! order: object keys are sorted lexicographically at every nesting level,
//! numbers use canonical decimal form (no trailing zeros, `-0` collapses to
//! `0`), and strings are minimally escaped.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Failures while producing a canonical byte form.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// The value could not be converted to a JSON tree.
    #[error("value is not representable as JSON: {0}")]
    NotJson(#[from] serde_json::Error),
}

/// Render `value` in canonical form.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(n, out),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Keys sorted lexicographically regardless of the map's own order.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
    }
}

fn write_number(n: &serde_json::Number, out: &mut String) {
    if let Some(i) = n.as_i64() {
        out.push_str(&i.to_string());
    } else if let Some(u) = n.as_u64() {
        out.push_str(&u.to_string());
    } else if let Some(f) = n.as_f64() {
        // Display yields the shortest round-trippable decimal form, which
        // already has no trailing zeros; `-0` still needs collapsing.
        let rendered = format!("{f}");
        if rendered == "-0" {
            out.push('0');
        } else {
            out.push_str(&rendered);
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    // serde_json applies exactly the minimal escape set.
    match serde_json::to_string(s) {
        Ok(escaped) => out.push_str(&escaped),
        Err(_) => out.push_str("\"\""),
    }
}

/// Lowercase hex SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// `SHA-256(canonical(value))` as lowercase hex.
pub fn compute_hash(value: &Value) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

/// Canonical hash of any serializable value.
pub fn hash_of<T: Serialize>(value: &T) -> Result<String, HashError> {
    let tree = serde_json::to_value(value)?;
    Ok(compute_hash(&tree))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_sorted_at_every_level() {
        let a = json!({"b": {"z": 1, "a": 2}, "a": 3});
        let b = json!({"a": 3, "b": {"a": 2, "z": 1}});
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&a), r#"{"a":3,"b":{"a":2,"z":1}}"#);
    }

    #[test]
    fn numbers_canonicalized() {
        assert_eq!(canonical_json(&json!(1.0)), "1");
        assert_eq!(canonical_json(&json!(0.5)), "0.5");
        assert_eq!(canonical_json(&json!(-0.0)), "0");
        assert_eq!(canonical_json(&json!(42)), "42");
        assert_eq!(canonical_json(&json!(-7)), "-7");
    }

    #[test]
    fn strings_minimally_escaped() {
        assert_eq!(canonical_json(&json!("plain")), "\"plain\"");
        assert_eq!(canonical_json(&json!("a\"b")), "\"a\\\"b\"");
        assert_eq!(canonical_json(&json!("line\nbreak")), "\"line\\nbreak\"");
    }

    #[test]
    fn hash_is_order_independent() {
        let a = json!({"x": [1, 2], "y": true});
        let b = json!({"y": true, "x": [1, 2]});
        assert_eq!(compute_hash(&a), compute_hash(&b));
    }

    #[test]
    fn hash_is_lowercase_hex() {
        let h = compute_hash(&json!({"k": "v"}));
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn empty_string_digest_is_the_sha256_vector() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
