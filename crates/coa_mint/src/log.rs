//! Final mint log.

use crate::error::{MintError, MintResult};
use crate::manifest::Manifest;
use chrono::{DateTime, Utc};
use coa_core::{Digest, GveCode, TokenId};
use coa_storage::Checkpoint;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One manifest entry and its mint outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintLogEntry {
    /// Certificate identifier
    pub identifier: String,
    /// Serial number
    #[serde(default)]
    pub serial: Option<String>,
    /// Lot number
    #[serde(default)]
    pub lot_number: Option<String>,
    /// Content hash
    pub content_hash: Digest,
    /// GVE code
    pub gve_code: GveCode,
    /// Token id, if minted
    pub token_id: Option<TokenId>,
    /// Mint transaction, if minted
    pub tx_hash: Option<String>,
    /// Artifact URL, if minted
    pub artifact_url: Option<String>,
}

/// Summary written once a run completes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintLog {
    /// Project name
    pub project: String,
    /// When the log was produced
    pub completed_at: DateTime<Utc>,
    /// Entries with a token
    pub total_minted: usize,
    /// Every manifest entry, in manifest order
    pub certificates: Vec<MintLogEntry>,
}

impl MintLog {
    /// Join the manifest with the checkpoint
    #[must_use]
    pub fn build(manifest: &Manifest, checkpoint: &Checkpoint) -> Self {
        let certificates: Vec<MintLogEntry> = manifest
            .entries
            .iter()
            .map(|entry| {
                let record = checkpoint.get(&entry.identifier);
                MintLogEntry {
                    identifier: entry.identifier.clone(),
                    serial: entry.serial.clone(),
                    lot_number: entry.lot_number.clone(),
                    content_hash: entry.content_hash,
                    gve_code: entry.gve_code.clone(),
                    token_id: record.map(|r| r.token_id),
                    tx_hash: record.map(|r| r.tx_hash.clone()),
                    artifact_url: record.map(|r| r.artifact_url.clone()),
                }
            })
            .collect();

        Self {
            project: manifest.project.clone(),
            completed_at: Utc::now(),
            total_minted: certificates.iter().filter(|c| c.token_id.is_some()).count(),
            certificates,
        }
    }

    /// Write as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn write(&self, path: impl AsRef<Path>) -> MintResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| MintError::io(path, e))
    }
}
