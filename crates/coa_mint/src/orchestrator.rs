//! Batch mint orchestration.
//!
//! Certificates are taken from the manifest in order, skipping anything the
//! checkpoint already holds. Each sub-batch uploads its artifacts
//! concurrently, then mints sequentially: one transaction per certificate,
//! each confirmed and checkpointed before the next is sent.

use crate::config::MintConfig;
use crate::error::{MintError, MintResult};
use crate::manifest::{Manifest, ManifestEntry};
use crate::render::{ArtifactRenderer, TemplateRenderer};
use crate::state::{transition, Failure, MintEvent, MintState};
use coa_chain::{
    apply_gas_margin, format_balance, tx_hash_hex, Address, ChainClient, ChainResult,
    MetadataConfig, MintReceipt, TokenMetadata, TxHash, U256,
};
use coa_core::TokenId;
use coa_storage::{artifact_key, ArtifactStore, CheckpointRecord, CheckpointStore, StoredArtifact};
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintSummary {
    /// Run identifier, also attached to every log line of the run
    pub run_id: Uuid,
    /// Certificates minted by this run
    pub minted: usize,
    /// Certificates already in the checkpoint
    pub skipped: usize,
    /// Manifest size
    pub total: usize,
    /// Artifacts re-uploaded with token ids, if re-rendering ran
    pub rerendered: Option<usize>,
    /// Gas used by this run's confirmed transactions
    pub gas_used: U256,
}

/// Drives a manifest through upload, mint and checkpoint
pub struct BatchMintOrchestrator {
    chain: Arc<dyn ChainClient>,
    artifacts: Arc<dyn ArtifactStore>,
    renderer: Arc<dyn ArtifactRenderer>,
    checkpoint: Box<dyn CheckpointStore>,
    metadata: MetadataConfig,
    config: MintConfig,
    recipient: Address,
    run_id: Uuid,
}

impl BatchMintOrchestrator {
    /// Create an orchestrator minting to the chain client's own signer
    #[must_use]
    pub fn new(
        chain: Arc<dyn ChainClient>,
        artifacts: Arc<dyn ArtifactStore>,
        checkpoint: Box<dyn CheckpointStore>,
        metadata: MetadataConfig,
    ) -> Self {
        let recipient = chain.signer_address();
        Self {
            chain,
            artifacts,
            renderer: Arc::new(TemplateRenderer::default()),
            checkpoint,
            metadata,
            config: MintConfig::default(),
            recipient,
            run_id: Uuid::new_v4(),
        }
    }

    /// Set run configuration
    #[must_use]
    pub fn with_config(mut self, config: MintConfig) -> Self {
        self.config = config;
        self
    }

    /// Set artifact renderer
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn ArtifactRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Mint to `recipient` instead of the signer
    #[must_use]
    pub fn with_recipient(mut self, recipient: Address) -> Self {
        self.recipient = recipient;
        self
    }

    /// Run identifier
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Checkpoint store
    #[must_use]
    pub fn checkpoint(&self) -> &dyn CheckpointStore {
        self.checkpoint.as_ref()
    }

    /// Take back the checkpoint store
    #[must_use]
    pub fn into_checkpoint(self) -> Box<dyn CheckpointStore> {
        self.checkpoint
    }

    /// Mint every certificate of `manifest` not yet in the checkpoint.
    ///
    /// Halts at the first certificate that cannot be minted. Everything
    /// minted before that point is already checkpointed, so running again
    /// with the same checkpoint resumes where this run stopped.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration or pre-flight check fails, an
    /// upload fails, a certificate fails to mint, or the checkpoint cannot
    /// be written
    pub async fn run(&mut self, manifest: &Manifest) -> MintResult<MintSummary> {
        let span = info_span!("mint_run", run_id = %self.run_id);
        self.run_inner(manifest).instrument(span).await
    }

    async fn run_inner(&mut self, manifest: &Manifest) -> MintResult<MintSummary> {
        self.config.validate()?;
        manifest.preflight()?;

        let balance = self.chain.balance().await?;
        info!(
            signer = ?self.chain.signer_address(),
            balance = %format_balance(balance),
            "signer balance"
        );

        let pending = manifest.pending(self.checkpoint.as_ref());
        let skipped = manifest.len() - pending.len();
        info!(
            total = manifest.len(),
            pending = pending.len(),
            skipped,
            "starting mint"
        );

        let mut minted = 0;
        let mut gas_used = U256::zero();
        let mut offset = 0;
        for (index, batch) in pending.chunks(self.config.batch_size).enumerate() {
            info!(batch = index, size = batch.len(), "uploading artifacts");
            let uploads = self.upload_batch(manifest, batch).await?;

            for (entry, stored) in batch.iter().zip(uploads) {
                let receipt = self.mint_one(manifest, entry, stored.url).await?;
                minted += 1;
                gas_used = gas_used.saturating_add(receipt.gas_used);
            }

            offset += batch.len();
            self.checkpoint.set_last_batch_index(offset)?;
        }

        let rerendered = if self.config.rerender {
            Some(self.rerender(manifest).await?)
        } else {
            None
        };

        info!(minted, skipped, gas_used = %gas_used, "mint complete");
        Ok(MintSummary {
            run_id: self.run_id,
            minted,
            skipped,
            total: manifest.len(),
            rerendered,
            gas_used,
        })
    }

    /// Re-render every checkpointed certificate with its token id and upload
    /// it over the key it was first uploaded to. Returns the number
    /// re-uploaded.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid, or rendering or an
    /// upload fails
    pub async fn rerender(&self, manifest: &Manifest) -> MintResult<usize> {
        self.config.validate()?;
        let minted: Vec<(&ManifestEntry, TokenId)> = manifest
            .entries
            .iter()
            .filter_map(|entry| {
                self.checkpoint
                    .get(&entry.identifier)
                    .map(|record| (entry, record.token_id))
            })
            .collect();

        let uploads = minted
            .iter()
            .map(|(entry, token_id)| self.upload(manifest, entry, Some(*token_id)));
        let stored: Vec<StoredArtifact> = futures::stream::iter(uploads)
            .buffered(self.config.upload_concurrency)
            .try_collect()
            .await?;

        info!(artifacts = stored.len(), "artifacts re-rendered");
        Ok(stored.len())
    }

    /// Upload a sub-batch's artifacts, results in batch order
    async fn upload_batch(
        &self,
        manifest: &Manifest,
        batch: &[&ManifestEntry],
    ) -> MintResult<Vec<StoredArtifact>> {
        let uploads = batch.iter().map(|entry| self.upload(manifest, entry, None));
        futures::stream::iter(uploads)
            .buffered(self.config.upload_concurrency)
            .try_collect()
            .await
    }

    async fn upload(
        &self,
        manifest: &Manifest,
        entry: &ManifestEntry,
        token_id: Option<TokenId>,
    ) -> MintResult<StoredArtifact> {
        let artifact = self.renderer.render(manifest, entry, token_id).await?;
        let key = artifact_key(&entry.gve_code, &entry.content_hash);
        let stored = self.artifacts.put(&key, artifact).await?;
        debug!(identifier = %entry.identifier, url = %stored.url, size = stored.size, "artifact uploaded");
        Ok(stored)
    }

    /// Drive one certificate to `Checkpointed`
    async fn mint_one(
        &mut self,
        manifest: &Manifest,
        entry: &ManifestEntry,
        artifact_url: String,
    ) -> MintResult<MintReceipt> {
        let max_attempts = self.config.max_attempts;
        let mut state = transition(
            MintState::Pending,
            MintEvent::ArtifactUploaded { url: artifact_url },
            max_attempts,
        )?;
        let mut confirmed: Option<MintReceipt> = None;

        loop {
            let event = match &state {
                MintState::Pending => MintEvent::Abort {
                    reason: "artifact was never uploaded".to_string(),
                },

                MintState::ArtifactUploaded { artifact_url } => {
                    match self.token_uri(manifest, entry, artifact_url) {
                        Ok(token_uri) => MintEvent::MetadataBuilt { token_uri },
                        Err(e) => MintEvent::Abort {
                            reason: e.to_string(),
                        },
                    }
                }

                MintState::MetadataBuilt {
                    token_uri,
                    attempts,
                    submitted,
                    ..
                } => {
                    // Never resubmit while an earlier transaction may have minted
                    match self.find_included(submitted).await {
                        Ok(Some(receipt)) => MintEvent::Confirmed { receipt },
                        Ok(None) => {
                            if *attempts > 0 {
                                warn!(
                                    identifier = %entry.identifier,
                                    attempt = attempts + 1,
                                    "resubmitting mint"
                                );
                                tokio::time::sleep(self.config.retry_delay()).await;
                            }
                            match self.submit(token_uri).await {
                                Ok(tx_hash) => MintEvent::Submitted { tx_hash },
                                Err(error) => MintEvent::SubmitFailed { error },
                            }
                        }
                        Err(error) => MintEvent::LookupFailed { error },
                    }
                }

                MintState::Unresolved {
                    submitted, failure, ..
                } => {
                    warn!(
                        identifier = %entry.identifier,
                        sent = submitted.len(),
                        failure = %failure,
                        "looking up earlier transactions before giving up"
                    );
                    match self.find_included(submitted).await {
                        Ok(Some(receipt)) => MintEvent::Confirmed { receipt },
                        Ok(None) => MintEvent::NotIncluded,
                        Err(error) => MintEvent::LookupFailed { error },
                    }
                }

                MintState::Submitted { submitted, .. } => match submitted.last() {
                    Some(tx) => {
                        let timeout = self.config.receipt_timeout();
                        match self.chain.wait_for_receipt(*tx, timeout).await {
                            Ok(receipt) => MintEvent::Confirmed { receipt },
                            Err(error) => {
                                warn!(identifier = %entry.identifier, tx = %tx_hash_hex(tx), error = %error, "receipt wait failed");
                                MintEvent::ReceiptFailed { error }
                            }
                        }
                    }
                    None => MintEvent::Abort {
                        reason: "no transaction in flight".to_string(),
                    },
                },

                MintState::Confirmed {
                    artifact_url,
                    receipt,
                } => {
                    let record = CheckpointRecord {
                        token_id: receipt.token_id,
                        tx_hash: tx_hash_hex(&receipt.tx_hash),
                        artifact_url: artifact_url.clone(),
                    };
                    self.checkpoint.record(&entry.identifier, record.clone())?;
                    confirmed = Some(receipt.clone());
                    MintEvent::Checkpointed { record }
                }

                MintState::Checkpointed { record } => {
                    info!(
                        identifier = %entry.identifier,
                        token_id = %record.token_id,
                        tx = %record.tx_hash,
                        "minted"
                    );
                    return confirmed.ok_or_else(|| MintError::Failed {
                        identifier: entry.identifier.clone(),
                        failure: Failure::Aborted {
                            reason: "checkpointed without a receipt".to_string(),
                        },
                    });
                }

                MintState::Failed(failure) => {
                    error!(identifier = %entry.identifier, failure = %failure, "mint failed, halting run");
                    return Err(MintError::Failed {
                        identifier: entry.identifier.clone(),
                        failure: failure.clone(),
                    });
                }
            };

            let from = state.name();
            state = transition(state, event, max_attempts)?;
            debug!(identifier = %entry.identifier, from, to = state.name(), "transition");
        }
    }

    fn token_uri(
        &self,
        manifest: &Manifest,
        entry: &ManifestEntry,
        artifact_url: &str,
    ) -> MintResult<String> {
        let document = manifest.load_document(entry)?;
        let metadata = TokenMetadata::build(
            &document,
            &entry.content_hash,
            &entry.gve_code,
            artifact_url,
            &self.metadata,
        );
        Ok(metadata.to_token_uri()?)
    }

    async fn submit(&self, token_uri: &str) -> ChainResult<TxHash> {
        let estimate = self.chain.estimate_mint_gas(self.recipient, token_uri).await?;
        let gas_limit = apply_gas_margin(estimate, self.config.gas_multiplier_percent);
        self.chain.submit_mint(self.recipient, token_uri, gas_limit).await
    }

    /// Look up earlier transactions, newest first, for one that was mined
    /// after its receipt wait gave up.
    ///
    /// A transient lookup error is returned as is; the certificate then
    /// fails with an unknown outcome, since a resubmission could mint it
    /// twice.
    async fn find_included(&self, submitted: &[TxHash]) -> ChainResult<Option<MintReceipt>> {
        for tx in submitted.iter().rev() {
            match self.chain.receipt(*tx).await {
                Ok(Some(receipt)) => {
                    info!(tx = %tx_hash_hex(tx), token_id = %receipt.token_id, "earlier transaction was included");
                    return Ok(Some(receipt));
                }
                Ok(None) => {}
                // Reverted; it minted nothing
                Err(e) if !e.is_retryable() => {
                    debug!(tx = %tx_hash_hex(tx), error = %e, "earlier transaction failed");
                }
                Err(e) => {
                    warn!(tx = %tx_hash_hex(tx), error = %e, "receipt lookup failed");
                    return Err(e);
                }
            }
        }
        Ok(None)
    }
}
