//! Collective attestation over a set of content hashes.
//!
//! `attestation = 0x || sha256(concat(sort(hashes)))`, where the sort is
//! ordinary lexicographic string ordering and concatenation uses no
//! separator. Hash strings are used exactly as given.

use crate::error::{CoreError, CoreResult};
use crate::hash::Digest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Compute the attestation hash of a non-empty collection of hash strings.
///
/// # Errors
///
/// Returns [`CoreError::EmptyAttestationInput`] if `hashes` is empty
pub fn compute_attestation_hash<S: AsRef<str>>(hashes: &[S]) -> CoreResult<Digest> {
    if hashes.is_empty() {
        return Err(CoreError::EmptyAttestationInput);
    }

    let mut sorted: Vec<&str> = hashes.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();

    Ok(Digest::compute(sorted.concat().as_bytes()))
}

/// Aggregator with a determinism self-check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttestationAggregator;

impl AttestationAggregator {
    /// Create a new aggregator
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Aggregate digests
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptyAttestationInput`] if `hashes` is empty
    pub fn aggregate(&self, hashes: &[Digest]) -> CoreResult<Digest> {
        let rendered: Vec<String> = hashes.iter().map(Digest::to_string).collect();
        compute_attestation_hash(&rendered)
    }

    /// Aggregate twice and require both results to agree
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DeterminismFault`] on disagreement, or
    /// [`CoreError::EmptyAttestationInput`] if `hashes` is empty
    pub fn aggregate_checked<S: AsRef<str>>(&self, hashes: &[S]) -> CoreResult<Digest> {
        let first = compute_attestation_hash(hashes)?;
        let second = compute_attestation_hash(hashes)?;
        if first != second {
            return Err(CoreError::DeterminismFault {
                context: "attestation".to_string(),
                first: first.to_string(),
                second: second.to_string(),
            });
        }
        Ok(first)
    }
}

/// Persisted attestation: the hash together with the inputs it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationRecord {
    /// The attestation hash
    pub attestation_hash: Digest,
    /// Token ids of the source certificates, ascending
    pub source_token_ids: Vec<u64>,
    /// Content hashes of the source certificates, as read
    pub content_hashes: Vec<String>,
    /// When the record was computed
    pub computed_at: DateTime<Utc>,
    /// Chain the sources live on
    pub chain_id: u64,
    /// Contract the sources were minted by
    pub contract: String,
    /// Number of sources
    pub total_sources: usize,
}

impl AttestationRecord {
    /// Build a record, computing the attestation hash from `content_hashes`.
    ///
    /// # Errors
    ///
    /// Returns error if `content_hashes` is empty or aggregation is not
    /// deterministic
    pub fn new(
        mut source_token_ids: Vec<u64>,
        content_hashes: Vec<String>,
        chain_id: u64,
        contract: String,
    ) -> CoreResult<Self> {
        let attestation_hash = AttestationAggregator::new().aggregate_checked(&content_hashes)?;
        source_token_ids.sort_unstable();
        Ok(Self {
            attestation_hash,
            total_sources: source_token_ids.len(),
            source_token_ids,
            content_hashes,
            computed_at: Utc::now(),
            chain_id,
            contract,
        })
    }

    /// Recompute the hash from the stored inputs and compare it bit-for-bit
    /// with the stored hash.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::HashMismatch`] if the stored value was altered or
    /// the aggregation changed
    pub fn verify(&self) -> CoreResult<()> {
        let recomputed = compute_attestation_hash(&self.content_hashes)?;
        if recomputed != self.attestation_hash {
            return Err(CoreError::HashMismatch {
                expected: self.attestation_hash.to_string(),
                actual: recomputed.to_string(),
            });
        }
        Ok(())
    }

    /// Serialize as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed
    pub fn from_json(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn h(c: char) -> String {
        format!("0x{}", c.to_string().repeat(64))
    }

    #[test]
    fn test_order_independent_example() {
        let a = compute_attestation_hash(&[h('b'), h('a')]).unwrap();
        let b = compute_attestation_hash(&[h('a'), h('b')]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_membership_sensitive_example() {
        let both = compute_attestation_hash(&[h('b'), h('a')]).unwrap();
        let one = compute_attestation_hash(&[h('a')]).unwrap();
        assert_ne!(both, one);
    }

    #[test]
    fn test_definition() {
        let expected = Digest::compute(format!("{}{}", h('a'), h('b')).as_bytes());
        assert_eq!(compute_attestation_hash(&[h('b'), h('a')]).unwrap(), expected);
    }

    #[test]
    fn test_empty_input() {
        let empty: [String; 0] = [];
        assert_eq!(
            compute_attestation_hash(&empty),
            Err(CoreError::EmptyAttestationInput)
        );
        assert_eq!(
            AttestationAggregator::new().aggregate(&[]),
            Err(CoreError::EmptyAttestationInput)
        );
    }

    #[test]
    fn test_case_sensitive_sort() {
        // Uppercase sorts before lowercase in plain string ordering
        let upper = "0xAB".to_string();
        let lower = "0xab".to_string();
        let expected = Digest::compute(b"0xAB0xab");
        assert_eq!(compute_attestation_hash(&[lower, upper]).unwrap(), expected);
    }

    #[test]
    fn test_aggregate_matches_string_form() {
        let digests = vec![Digest::compute(b"one"), Digest::compute(b"two")];
        let strings: Vec<String> = digests.iter().map(Digest::to_string).collect();
        assert_eq!(
            AttestationAggregator::new().aggregate(&digests).unwrap(),
            compute_attestation_hash(&strings).unwrap()
        );
    }

    #[test]
    fn test_record_verify() {
        let record =
            AttestationRecord::new(vec![7, 3, 5], vec![h('c'), h('a')], 28530, "0xc0".into())
                .unwrap();
        assert_eq!(record.source_token_ids, vec![3, 5, 7]);
        assert_eq!(record.total_sources, 3);
        assert!(record.verify().is_ok());
    }

    #[test]
    fn test_record_tamper_detected() {
        let mut record =
            AttestationRecord::new(vec![1], vec![h('a')], 1, "0xc0".into()).unwrap();
        record.content_hashes.push(h('f'));
        assert!(matches!(record.verify(), Err(CoreError::HashMismatch { .. })));
    }

    #[test]
    fn test_record_json_keys() {
        let record = AttestationRecord::new(vec![1], vec![h('a')], 1, "0xc0".into()).unwrap();
        let json = record.to_json().unwrap();
        assert!(json.contains("\"attestationHash\""));
        assert!(json.contains("\"sourceTokenIds\""));
        let back = AttestationRecord::from_json(&json).unwrap();
        assert_eq!(back, record);
    }

    proptest! {
        #[test]
        fn prop_shuffle_invariant(
            hashes in prop::collection::vec("0x[0-9a-f]{64}", 1..20),
            rotation in any::<usize>(),
        ) {
            let mut shuffled = hashes.clone();
            let len = shuffled.len();
            shuffled.rotate_left(rotation % len);
            shuffled.reverse();
            prop_assert_eq!(
                compute_attestation_hash(&hashes).unwrap(),
                compute_attestation_hash(&shuffled).unwrap()
            );
        }

        #[test]
        fn prop_membership_change_detected(
            hashes in prop::collection::btree_set("0x[0-9a-f]{64}", 2..20),
        ) {
            let all: Vec<String> = hashes.iter().cloned().collect();
            let fewer = &all[1..];
            prop_assert_ne!(
                compute_attestation_hash(&all).unwrap(),
                compute_attestation_hash(fewer).unwrap()
            );
        }
    }
}
