//! Source attestation collection.

use crate::error::{SourceFailure, VerifyError, VerifyResult};
use coa_chain::{ChainClient, TokenMetadata};
use coa_core::{AttestationRecord, TokenId};
use tracing::{debug, info, warn};

/// Read each source token's metadata, extract its content hash and
/// aggregate the hashes into an [`AttestationRecord`].
///
/// Tokens are read in ascending id order. Every token must be readable:
/// if any is not, all failures are reported together and no record is
/// produced.
///
/// # Errors
///
/// Returns [`VerifyError::NoSources`] for an empty id list,
/// [`VerifyError::SourcesUnreadable`] if any token fails, or a core error if
/// aggregation is not deterministic
pub async fn collect_source_attestation(
    client: &dyn ChainClient,
    token_ids: &[u64],
    chain_id: u64,
    contract: &str,
) -> VerifyResult<AttestationRecord> {
    if token_ids.is_empty() {
        return Err(VerifyError::NoSources);
    }
    let mut ids = token_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    info!(tokens = ids.len(), chain_id, "collecting source content hashes");
    let mut content_hashes = Vec::with_capacity(ids.len());
    let mut failures = Vec::new();
    for id in &ids {
        match read_content_hash(client, TokenId(*id)).await {
            Ok(hash) => {
                debug!(token_id = id, content_hash = %hash, "source token read");
                content_hashes.push(hash);
            }
            Err(error) => {
                warn!(token_id = id, error = %error, "source token unreadable");
                failures.push(SourceFailure {
                    token_id: *id,
                    error,
                });
            }
        }
    }

    if !failures.is_empty() {
        return Err(VerifyError::SourcesUnreadable {
            total: ids.len(),
            failures,
        });
    }

    // Aggregation runs twice inside `new`; a disagreement is a DeterminismFault
    let record = AttestationRecord::new(ids, content_hashes, chain_id, contract.to_string())?;
    info!(attestation = %record.attestation_hash, sources = record.total_sources, "source attestation computed");
    Ok(record)
}

async fn read_content_hash(client: &dyn ChainClient, token_id: TokenId) -> Result<String, String> {
    let uri = client.token_uri(token_id).await.map_err(|e| e.to_string())?;
    let metadata = TokenMetadata::from_token_uri(&uri).map_err(|e| e.to_string())?;
    metadata
        .content_hash()
        .map(str::to_string)
        .ok_or_else(|| format!("no content hash in token {} metadata", token_id))
}
