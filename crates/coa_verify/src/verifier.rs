//! Chain verification of checkpointed certificates.

use crate::report::{Finding, FindingKind, VerificationReport};
use chrono::Utc;
use coa_chain::{decode_token_uri, ChainClient, TokenMetadata};
use coa_core::{AttestationRecord, ContentHashEngine, Digest, SourceAttestation, TokenId};
use coa_mint::Manifest;
use coa_storage::Checkpoint;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reads minted tokens back and compares them with what was minted
pub struct ChainVerifier {
    client: Arc<dyn ChainClient>,
    engine: ContentHashEngine,
}

impl ChainVerifier {
    /// Create a verifier over `client`
    #[must_use]
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self {
            client,
            engine: ContentHashEngine::new(),
        }
    }

    /// Check every checkpointed token against the manifest and `attestation`,
    /// and recompute the attestation hash from its stored inputs.
    ///
    /// Never stops early: each token contributes a pass or one finding (its
    /// first failed check) to the report.
    pub async fn verify_all(
        &self,
        manifest: &Manifest,
        checkpoint: &Checkpoint,
        attestation: &AttestationRecord,
    ) -> VerificationReport {
        let mut report = VerificationReport::new(Utc::now());
        info!(tokens = checkpoint.len(), "verifying minted tokens");

        for (identifier, record) in &checkpoint.minted_certificates {
            let expected = manifest.entry(identifier).map(|e| e.content_hash);
            match self.verify_token(record.token_id, expected, attestation).await {
                Ok(()) => {
                    debug!(identifier = %identifier, token_id = %record.token_id, "verified");
                    report.record_pass();
                }
                Err((kind, error)) => {
                    warn!(identifier = %identifier, token_id = %record.token_id, ?kind, error = %error, "verification failed");
                    report.record_failure(Finding::new(identifier.as_str(), record.token_id, kind, error));
                }
            }
        }

        report.attestation_verified = match attestation.verify() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "attestation hash does not recompute");
                false
            }
        };

        info!(
            verified = report.verified,
            failed = report.failed,
            attestation_verified = report.attestation_verified,
            "verification complete"
        );
        report
    }

    /// Run the checks for one token in order, stopping at the first failure
    async fn verify_token(
        &self,
        token_id: TokenId,
        expected: Option<Digest>,
        attestation: &AttestationRecord,
    ) -> Result<(), (FindingKind, String)> {
        let uri = self
            .client
            .token_uri(token_id)
            .await
            .map_err(|e| (FindingKind::TokenUnreadable, e.to_string()))?;
        let metadata =
            decode_token_uri(&uri).map_err(|e| (FindingKind::InvalidTokenUri, e.to_string()))?;
        let expected = expected.ok_or_else(|| {
            (
                FindingKind::NotInManifest,
                "identifier is not in the manifest".to_string(),
            )
        })?;

        check_content_hash(&metadata, &expected)?;
        self.check_document(&metadata, &expected)?;
        check_attestation(&metadata, attestation)
    }

    fn check_document(
        &self,
        metadata: &TokenMetadata,
        expected: &Digest,
    ) -> Result<(), (FindingKind, String)> {
        let mismatch = |error: String| (FindingKind::DocumentHashMismatch, error);
        let recomputed = self
            .engine
            .compute(metadata.document())
            .map_err(|e| mismatch(e.to_string()))?;
        if recomputed != *expected {
            return Err(mismatch(format!(
                "embedded document hashes to {}, expected {}",
                recomputed, expected
            )));
        }
        Ok(())
    }
}

fn check_content_hash(metadata: &TokenMetadata, expected: &Digest) -> Result<(), (FindingKind, String)> {
    let on_chain = metadata.content_hash().ok_or_else(|| {
        (
            FindingKind::ContentHashMissing,
            "metadata has no content hash".to_string(),
        )
    })?;
    // Compare parsed digests so hex case does not matter
    match Digest::parse(on_chain) {
        Ok(digest) if digest == *expected => Ok(()),
        _ => Err((
            FindingKind::ContentHashMismatch,
            format!("expected {}, got {}", expected, on_chain),
        )),
    }
}

fn check_attestation(
    metadata: &TokenMetadata,
    attestation: &AttestationRecord,
) -> Result<(), (FindingKind, String)> {
    let block = SourceAttestation::read(metadata.document())
        .map_err(|e| (FindingKind::AttestationHashMismatch, e.to_string()))?;
    let Some(block) = block else {
        return Err((
            FindingKind::AttestationHashMismatch,
            format!("expected {}, got none", attestation.attestation_hash),
        ));
    };

    if block.attestation_hash != attestation.attestation_hash {
        return Err((
            FindingKind::AttestationHashMismatch,
            format!(
                "expected {}, got {}",
                attestation.attestation_hash, block.attestation_hash
            ),
        ));
    }
    // Older certificates carry no source ids; only compare when present
    if !block.source_token_ids.is_empty() && block.source_token_ids != attestation.source_token_ids {
        return Err((
            FindingKind::SourceTokensMismatch,
            format!(
                "expected {:?}, got {:?}",
                attestation.source_token_ids, block.source_token_ids
            ),
        ));
    }
    Ok(())
}
