//! Verification report.

use crate::error::VerifyError;
use chrono::{DateTime, Utc};
use coa_core::TokenId;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What a failed token check found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FindingKind {
    /// Token URI could not be read from the chain
    TokenUnreadable,
    /// Token URI is not a base64 JSON data URI
    InvalidTokenUri,
    /// Checkpointed identifier is not in the manifest
    NotInManifest,
    /// Metadata carries no content hash
    ContentHashMissing,
    /// Content hash read back differs from the manifest
    ContentHashMismatch,
    /// Content hash recomputed from the embedded document differs from the
    /// manifest
    DocumentHashMismatch,
    /// Embedded attestation hash differs from the persisted record
    AttestationHashMismatch,
    /// Embedded source token ids differ from the persisted record
    SourceTokensMismatch,
}

/// One failed token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Certificate identifier
    pub identifier: String,
    /// Token id
    pub token_id: TokenId,
    /// First check that failed
    pub kind: FindingKind,
    /// Detail
    pub error: String,
}

impl Finding {
    /// Create a finding
    #[must_use]
    pub fn new(
        identifier: impl Into<String>,
        token_id: TokenId,
        kind: FindingKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            token_id,
            kind,
            error: error.into(),
        }
    }
}

/// Result of verifying a set of minted tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    /// When verification ran
    pub verified_at: DateTime<Utc>,
    /// Tokens checked
    pub total_checked: usize,
    /// Tokens that passed every check
    pub verified: usize,
    /// Tokens with a finding
    pub failed: usize,
    /// One entry per failed token
    pub failures: Vec<Finding>,
    /// Whether the persisted attestation hash recomputes from its inputs
    pub attestation_verified: bool,
}

impl VerificationReport {
    /// Create an empty report
    #[must_use]
    pub fn new(verified_at: DateTime<Utc>) -> Self {
        Self {
            verified_at,
            total_checked: 0,
            verified: 0,
            failed: 0,
            failures: Vec::new(),
            attestation_verified: false,
        }
    }

    /// Count a token that passed
    pub fn record_pass(&mut self) {
        self.total_checked += 1;
        self.verified += 1;
    }

    /// Count a token that failed
    pub fn record_failure(&mut self, finding: Finding) {
        self.total_checked += 1;
        self.failed += 1;
        self.failures.push(finding);
    }

    /// Every token verified and the attestation recomputed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failed == 0 && self.attestation_verified
    }

    /// Findings of one kind
    #[must_use]
    pub fn findings_of(&self, kind: FindingKind) -> Vec<&Finding> {
        self.failures.iter().filter(|f| f.kind == kind).collect()
    }

    /// One-line summary
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Verification {}: {}/{} tokens verified, attestation {}",
            if self.passed() { "PASSED" } else { "FAILED" },
            self.verified,
            self.total_checked,
            if self.attestation_verified { "MATCH" } else { "MISMATCH" }
        )
    }

    /// Write as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), VerifyError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| VerifyError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_summary() {
        let mut report = VerificationReport::new(Utc::now());
        report.attestation_verified = true;
        report.record_pass();
        assert!(report.passed());

        report.record_failure(Finding::new(
            "BAG-002",
            TokenId(2),
            FindingKind::ContentHashMismatch,
            "expected 0xaa, got 0xbb",
        ));
        assert!(!report.passed());
        assert_eq!(report.total_checked, 2);
        assert_eq!(report.findings_of(FindingKind::ContentHashMismatch).len(), 1);
        assert!(report.summary().starts_with("Verification FAILED: 1/2"));
    }

    #[test]
    fn test_json_shape() {
        let mut report = VerificationReport::new(Utc::now());
        report.record_failure(Finding::new("BAG-001", TokenId(7), FindingKind::InvalidTokenUri, "bad"));

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["totalChecked"], 1);
        assert_eq!(value["failures"][0]["tokenId"], "7");
        assert_eq!(value["failures"][0]["kind"], "invalidTokenUri");
        assert_eq!(value["attestationVerified"], false);
    }
}
