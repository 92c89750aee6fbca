//! Content hashing for certificate documents.
//!
//! A content hash is `0x || sha256(jcs(document minus excluded fields))`.
//! The excluded fields are the ones that are filled in after hashing and may
//! change between renders without changing what the certificate certifies.

use crate::canonical::canonicalize;
use crate::error::{CoreError, CoreResult};
use crate::hash::{Digest, GveCode};
use serde_json::{Map, Value};

/// Top-level fields left out of the content hash
pub const EXCLUDED_FIELDS: [&str; 2] = ["verification", "issuedAt"];

/// Copy of the document without the excluded top-level fields.
///
/// # Errors
///
/// Returns [`CoreError::InvalidDocument`] if the document is not a JSON object
pub fn hashable_view(document: &Value) -> CoreResult<Value> {
    let obj = document.as_object().ok_or_else(|| CoreError::InvalidDocument {
        reason: "certificate document must be a JSON object".to_string(),
    })?;

    let hashable: Map<String, Value> = obj
        .iter()
        .filter(|(key, _)| !EXCLUDED_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(Value::Object(hashable))
}

/// Compute the content hash of a certificate document.
///
/// # Errors
///
/// Returns error if the document is not an object or cannot be canonicalized
pub fn compute_content_hash(document: &Value) -> CoreResult<Digest> {
    let hashable = hashable_view(document)?;
    let canonical = canonicalize(&hashable)?;
    Ok(Digest::compute(&canonical))
}

/// Content hash engine
///
/// Stateless; the type exists so callers can hold the hashing policy as a
/// value and so the checked variant has a home.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentHashEngine;

impl ContentHashEngine {
    /// Create a new engine
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Compute the content hash of a document
    ///
    /// # Errors
    ///
    /// Returns error if the document is not an object or cannot be
    /// canonicalized
    pub fn compute(&self, document: &Value) -> CoreResult<Digest> {
        compute_content_hash(document)
    }

    /// Compute the content hash twice and require both runs to agree.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DeterminismFault`] if the two computations differ
    pub fn compute_checked(&self, context: &str, document: &Value) -> CoreResult<Digest> {
        let first = compute_content_hash(document)?;
        let second = compute_content_hash(document)?;
        if first != second {
            return Err(CoreError::DeterminismFault {
                context: context.to_string(),
                first: first.to_string(),
                second: second.to_string(),
            });
        }
        Ok(first)
    }

    /// Compute the content hash and its GVE code
    ///
    /// # Errors
    ///
    /// Returns error if hashing fails
    pub fn fingerprint(&self, document: &Value) -> CoreResult<(Digest, GveCode)> {
        let hash = self.compute(document)?;
        let gve = hash.gve();
        Ok((hash, gve))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::canonicalize_to_string;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "schema": {"id": "urn:blockticity:coa:public", "version": "1.0.0"},
            "issuer": {"name": "NuCafe", "address": "0xabc"},
            "identifier": {"label": "Bag Serial", "value": "BAG-001"},
            "productData": {"lot_no_ico_no_": "489", "weight_kg": 69},
        })
    }

    #[test]
    fn test_hashable_view_drops_excluded() {
        let mut doc = sample();
        doc["verification"] = json!({"contentHash": "0x00"});
        doc["issuedAt"] = json!("2025-01-01T00:00:00Z");

        let view = hashable_view(&doc).unwrap();
        assert!(view.get("verification").is_none());
        assert!(view.get("issuedAt").is_none());
        assert!(view.get("schema").is_some());
    }

    #[test]
    fn test_hashable_view_rejects_non_object() {
        assert!(matches!(
            hashable_view(&json!([1, 2])),
            Err(CoreError::InvalidDocument { .. })
        ));
    }

    #[test]
    fn test_known_vector() {
        // sha256 of the canonical form {"a":1,"b":"x"}
        let hash = compute_content_hash(&json!({"b": "x", "a": 1, "issuedAt": "now"})).unwrap();
        let expected = Digest::compute(br#"{"a":1,"b":"x"}"#);
        assert_eq!(hash, expected);
    }

    #[test]
    fn test_whitespace_and_key_order_irrelevant() {
        let a: Value = serde_json::from_str(r#"{"a": 1, "b": {"d": 2, "c": 3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b":{"c":3,"d":2},"a":1}"#).unwrap();
        assert_eq!(compute_content_hash(&a).unwrap(), compute_content_hash(&b).unwrap());
    }

    #[test]
    fn test_numeric_formatting_normalized() {
        let a: Value = serde_json::from_str(r#"{"w": 69.0}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"w": 69}"#).unwrap();
        assert_eq!(compute_content_hash(&a).unwrap(), compute_content_hash(&b).unwrap());
    }

    #[test]
    fn test_content_change_changes_hash() {
        let mut other = sample();
        other["identifier"]["value"] = json!("BAG-002");
        assert_ne!(
            compute_content_hash(&sample()).unwrap(),
            compute_content_hash(&other).unwrap()
        );
    }

    #[test]
    fn test_nested_excluded_names_still_hashed() {
        let mut other = sample();
        other["productData"]["issuedAt"] = json!("later");
        assert_ne!(
            compute_content_hash(&sample()).unwrap(),
            compute_content_hash(&other).unwrap()
        );
    }

    #[test]
    fn test_compute_checked() {
        let engine = ContentHashEngine::new();
        let hash = engine.compute_checked("BAG-001", &sample()).unwrap();
        assert_eq!(hash, compute_content_hash(&sample()).unwrap());
    }

    #[test]
    fn test_fingerprint() {
        let (hash, gve) = ContentHashEngine::new().fingerprint(&sample()).unwrap();
        assert_eq!(gve.as_str(), format!("GVE-{}", hash.short(8)));
    }

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-z0-9 ]{0,8}".prop_map(Value::String),
        ]
    }

    // Mixes ASCII, BMP and astral names, whose UTF-16 order differs from
    // their UTF-8 order
    fn entries() -> impl Strategy<Value = Vec<(String, Value)>> {
        prop::collection::btree_map("[a-zA-Z_\u{e9}\u{e000}\u{1f600}]{1,6}", leaf(), 1..8)
            .prop_map(|m| m.into_iter().collect())
    }

    /// Document text with members written in the given order
    fn document_text(pairs: &[(String, Value)]) -> String {
        let members: Vec<String> = pairs
            .iter()
            .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), v))
            .collect();
        format!("{{{}}}", members.join(","))
    }

    fn object_from(pairs: &[(String, Value)]) -> Value {
        Value::Object(pairs.iter().cloned().collect())
    }

    proptest! {
        #[test]
        fn prop_key_order_irrelevant(pairs in entries().prop_shuffle(), seed in any::<u64>()) {
            let mut shuffled = pairs.clone();
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            shuffled.reverse();

            let written: Value = serde_json::from_str(&document_text(&pairs)).unwrap();
            let rewritten: Value = serde_json::from_str(&document_text(&shuffled)).unwrap();
            prop_assert_eq!(
                compute_content_hash(&written).unwrap(),
                compute_content_hash(&rewritten).unwrap()
            );

            // Members come out in UTF-16 order whatever order they went in
            let mut sorted = pairs.clone();
            sorted.sort_by_key(|(k, _)| k.encode_utf16().collect::<Vec<u16>>());
            let members: Vec<String> = sorted
                .iter()
                .map(|(k, v)| {
                    format!(
                        "{}:{}",
                        canonicalize_to_string(&Value::String(k.clone())).unwrap(),
                        canonicalize_to_string(v).unwrap()
                    )
                })
                .collect();
            let expected = format!("{{{}}}", members.join(","));
            prop_assert_eq!(canonicalize_to_string(&written).unwrap(), expected.clone());
            prop_assert_eq!(canonicalize_to_string(&rewritten).unwrap(), expected);
        }

        #[test]
        fn prop_excluded_fields_irrelevant(
            pairs in entries(),
            verification in leaf(),
            issued_at in "[0-9T:-]{0,20}",
        ) {
            let base = object_from(&pairs);
            let mut dressed = base.clone();
            dressed["verification"] = json!({"contentHash": verification});
            dressed["issuedAt"] = Value::String(issued_at);

            let stripped = hashable_view(&base).unwrap();
            prop_assert_eq!(
                compute_content_hash(&stripped).unwrap(),
                compute_content_hash(&dressed).unwrap()
            );
        }
    }
}
