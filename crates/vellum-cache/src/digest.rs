//! Deterministic cache keys.
//!
//! The key depends only on what the classifier sees: the text with whitespace
//! collapsed, and the structural metadata with its keys sorted. File identity
//! (name, path) is dropped so that a copy of a document under another name
//! still hits.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Prefix of every cache key. Bump the version when the value shape changes.
pub const KEY_PREFIX: &str = "classification:v1:";

/// Metadata keys that identify a file rather than describe its content.
const VOLATILE_KEYS: &[&str] = &["file_name", "file_path", "modified_at", "extracted_at"];

/// Trim and collapse every whitespace run to a single space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop identity keys and nulls, sort object keys recursively.
pub fn normalize_metadata(metadata: &Value) -> Value {
    match metadata {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map
                .iter()
                .filter(|(key, value)| !value.is_null() && !VOLATILE_KEYS.contains(&key.as_str()))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key.clone(), normalize_nested(value));
            }
            Value::Object(sorted)
        }
        other => normalize_nested(other),
    }
}

fn normalize_nested(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key.clone(), normalize_nested(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize_nested).collect()),
        Value::String(s) => Value::String(s.trim().to_string()),
        other => other.clone(),
    }
}

/// Digest over normalized text and metadata, with [`KEY_PREFIX`].
pub fn cache_key(text: &str, metadata: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(text).as_bytes());
    hasher.update([0x1f]);
    hasher.update(normalize_metadata(metadata).to_string().as_bytes());
    format!("{}{:x}", KEY_PREFIX, hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_ignores_whitespace_layout() {
        let a = cache_key("Deep  learning\n\nfor   proteins ", &json!({}));
        let b = cache_key("Deep learning for proteins", &json!({}));
        assert_eq!(a, b);
        assert!(a.starts_with(KEY_PREFIX));
        assert_eq!(a.len(), KEY_PREFIX.len() + 64);
    }

    #[test]
    fn test_key_ignores_metadata_order_and_identity() {
        let a = cache_key(
            "text",
            &json!({"images_count": 2, "tables_count": 1, "file_name": "a.pdf"}),
        );
        let b = cache_key(
            "text",
            &json!({"tables_count": 1, "file_name": "b.pdf", "images_count": 2}),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_depends_on_structure() {
        let a = cache_key("text", &json!({"tables_count": 1}));
        let b = cache_key("text", &json!({"tables_count": 2}));
        let c = cache_key("other text", &json!({"tables_count": 1}));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_text_and_metadata_boundary() {
        // Moving characters between text and metadata must not collide.
        let a = cache_key("ab", &json!("c"));
        let b = cache_key("a", &json!("bc"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_normalize_metadata_nested() {
        let normalized = normalize_metadata(&json!({
            "z": {"b": 1, "a": [ {"y": 1, "x": " v "} ]},
            "gone": null,
        }));
        assert_eq!(
            normalized.to_string(),
            r#"{"z":{"a":[{"x":"v","y":1}],"b":1}}"#
        );
    }
}
