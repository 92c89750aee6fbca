//! Embedding a source attestation into every certificate of a manifest.

use crate::error::MintResult;
use crate::manifest::Manifest;
use chrono::{DateTime, Utc};
use coa_core::{embed_source_attestation, seal, AttestationRecord};
use tracing::{debug, info};

/// Embed `record` into each manifest document, reseal it, write it back and
/// update the manifest's content hash and GVE code.
///
/// The record is verified first, so a tampered attestation never reaches a
/// document. Returns the number of documents rewritten.
///
/// # Errors
///
/// Returns error if the record fails its self-check or a document cannot be
/// read, hashed or written
pub fn prepare_manifest(
    manifest: &mut Manifest,
    record: &AttestationRecord,
    issued_at: DateTime<Utc>,
) -> MintResult<usize> {
    record.verify()?;

    let mut entries = std::mem::take(&mut manifest.entries);
    let result = entries.iter_mut().try_for_each(|entry| {
        let mut document = manifest.load_document(entry)?;
        embed_source_attestation(&mut document, record)?;
        let (hash, gve) = seal(&mut document, issued_at)?;
        manifest.write_document(entry, &document)?;
        debug!(identifier = %entry.identifier, gve = %gve, "document sealed");
        entry.content_hash = hash;
        entry.gve_code = gve;
        MintResult::Ok(())
    });
    let count = entries.len();
    manifest.entries = entries;
    result?;

    info!(
        documents = count,
        attestation = %record.attestation_hash,
        "source attestation embedded"
    );
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::fixtures::write_manifest;
    use crate::MintError;
    use coa_core::{CoreError, SourceAttestation};

    fn record() -> AttestationRecord {
        AttestationRecord::new(
            vec![3, 1, 2],
            vec![
                format!("0x{}", "a".repeat(64)),
                format!("0x{}", "b".repeat(64)),
                format!("0x{}", "c".repeat(64)),
            ],
            28530,
            "0x7e1f".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_prepare_updates_documents_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = write_manifest(dir.path(), 3);
        let before = manifest.entries[0].content_hash;

        let count = prepare_manifest(&mut manifest, &record(), Utc::now()).unwrap();
        assert_eq!(count, 3);
        assert_ne!(manifest.entries[0].content_hash, before);

        let document = manifest.load_document(&manifest.entries[0]).unwrap();
        let block = SourceAttestation::read(&document).unwrap().unwrap();
        assert_eq!(block.attestation_hash, record().attestation_hash);
        assert_eq!(block.source_token_ids, vec![1, 2, 3]);

        // The rewritten manifest passes its own pre-flight check
        manifest.preflight().unwrap();
    }

    #[test]
    fn test_prepare_refuses_tampered_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = write_manifest(dir.path(), 1);
        let mut tampered = record();
        tampered.content_hashes.pop();

        let err = prepare_manifest(&mut manifest, &tampered, Utc::now()).unwrap_err();
        assert!(matches!(err, MintError::Core(CoreError::HashMismatch { .. })));
    }
}
