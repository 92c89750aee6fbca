//! Certificate document ("publicJson") helpers.
//!
//! Documents are kept as `serde_json::Value` so that fields this crate does
//! not know about still participate in the content hash. The helpers here
//! only touch the blocks the pipeline owns: `sourceAttestation` (hashed) and
//! `verification` / `issuedAt` (excluded from the hash).

use crate::attestation::AttestationRecord;
use crate::content::ContentHashEngine;
use crate::error::{CoreError, CoreResult};
use crate::hash::{Digest, GveCode};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Chain reference embedded in documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainRef {
    /// EVM chain id
    pub chain_id: u64,
    /// Contract address
    pub contract: String,
}

/// Links a derived certificate to the certificates it was made from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceAttestation {
    /// Attestation hash over the sources' content hashes
    pub attestation_hash: Digest,
    /// Number of sources
    pub source_count: usize,
    /// Where the sources were minted
    pub chain: ChainRef,
    /// Source token ids
    pub source_token_ids: Vec<u64>,
}

impl SourceAttestation {
    /// Build from a persisted attestation record
    #[must_use]
    pub fn from_record(record: &AttestationRecord) -> Self {
        Self {
            attestation_hash: record.attestation_hash,
            source_count: record.source_token_ids.len(),
            chain: ChainRef {
                chain_id: record.chain_id,
                contract: record.contract.clone(),
            },
            source_token_ids: record.source_token_ids.clone(),
        }
    }

    /// Field name inside the document
    pub const FIELD: &'static str = "sourceAttestation";

    /// Write this block into a document, replacing any previous one.
    ///
    /// This changes the content hash; reseal afterwards.
    ///
    /// # Errors
    ///
    /// Returns error if the document is not an object
    pub fn embed(&self, document: &mut Value) -> CoreResult<()> {
        let obj = as_object_mut(document)?;
        obj.insert(Self::FIELD.to_string(), serde_json::to_value(self)?);
        Ok(())
    }

    /// Read the block back from a document, if present
    ///
    /// # Errors
    ///
    /// Returns error if the block is present but malformed
    pub fn read(document: &Value) -> CoreResult<Option<Self>> {
        match document.get(Self::FIELD) {
            None | Some(Value::Null) => Ok(None),
            Some(block) => Ok(Some(serde_json::from_value(block.clone())?)),
        }
    }
}

/// The excluded `verification` block written after hashing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationBlock {
    /// Content hash of the document
    pub content_hash: Digest,
    /// GVE code derived from it
    pub gve_code: GveCode,
    /// Canonicalization scheme
    pub canonicalization: String,
    /// Hash algorithm
    pub algo: String,
}

impl VerificationBlock {
    /// Field name inside the document
    pub const FIELD: &'static str = "verification";

    /// Block for a content hash
    #[must_use]
    pub fn new(content_hash: Digest) -> Self {
        Self {
            gve_code: content_hash.gve(),
            content_hash,
            canonicalization: "RFC8785-JCS".to_string(),
            algo: "sha256".to_string(),
        }
    }
}

/// Hash a document and record the result inside it.
///
/// Writes `verification` and `issuedAt`, which are excluded from hashing, so
/// the returned hash is also the hash of the sealed document.
///
/// # Errors
///
/// Returns error if the document is not an object or hashing fails
pub fn seal(document: &mut Value, issued_at: DateTime<Utc>) -> CoreResult<(Digest, GveCode)> {
    let (hash, gve) = ContentHashEngine::new().fingerprint(document)?;
    let block = serde_json::to_value(VerificationBlock::new(hash))?;
    let obj = as_object_mut(document)?;
    obj.insert(VerificationBlock::FIELD.to_string(), block);
    obj.insert(
        "issuedAt".to_string(),
        Value::String(issued_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    Ok((hash, gve))
}

/// Write the source-attestation block for `record` into a document.
///
/// The content hash changes; reseal afterwards.
///
/// # Errors
///
/// Returns error if the document is not an object
pub fn embed_source_attestation(document: &mut Value, record: &AttestationRecord) -> CoreResult<()> {
    SourceAttestation::from_record(record).embed(document)
}

/// Identifier value of a document (`identifier.value`), if present
#[must_use]
pub fn identifier_of(document: &Value) -> Option<&str> {
    document.get("identifier")?.get("value")?.as_str()
}

fn as_object_mut(document: &mut Value) -> CoreResult<&mut serde_json::Map<String, Value>> {
    document.as_object_mut().ok_or_else(|| CoreError::InvalidDocument {
        reason: "certificate document must be a JSON object".to_string(),
    })
}
