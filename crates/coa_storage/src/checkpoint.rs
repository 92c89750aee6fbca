//! Mint checkpoints.
//!
//! A checkpoint maps certificate identifiers to the outcome of their mint.
//! Entries are only ever added: once an identifier is present it is treated
//! as minted and never touched again.

use coa_core::TokenId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Checkpoint result type
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Checkpoint error
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// An entry already exists for this identifier
    #[error("Checkpoint already has an entry for {identifier}")]
    AlreadyRecorded {
        /// Identifier that was recorded twice
        identifier: String,
    },

    /// IO error
    #[error("Checkpoint IO error at {path}: {source}")]
    Io {
        /// File involved
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File contents could not be parsed or written
    #[error("Checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Embedded database error
    #[error("Checkpoint database error: {0}")]
    Database(#[from] redb::Error),
}

impl CheckpointError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Outcome of one successful mint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRecord {
    /// Minted token id
    pub token_id: TokenId,
    /// Mint transaction hash
    pub tx_hash: String,
    /// Public URL of the uploaded artifact
    #[serde(alias = "s3Url")]
    pub artifact_url: String,
}

/// Serializable checkpoint contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Minted certificates by identifier
    #[serde(alias = "mintedBags")]
    pub minted_certificates: BTreeMap<String, CheckpointRecord>,
    /// Number of outstanding manifest entries handled by completed sub-batches
    #[serde(default)]
    pub last_batch_index: usize,
}

impl Checkpoint {
    /// Create an empty checkpoint
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, refusing to overwrite
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::AlreadyRecorded`] if the identifier exists
    pub fn insert(&mut self, identifier: &str, record: CheckpointRecord) -> CheckpointResult<()> {
        if self.minted_certificates.contains_key(identifier) {
            return Err(CheckpointError::AlreadyRecorded {
                identifier: identifier.to_string(),
            });
        }
        self.minted_certificates.insert(identifier.to_string(), record);
        Ok(())
    }

    /// Look up an entry
    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<&CheckpointRecord> {
        self.minted_certificates.get(identifier)
    }

    /// Number of minted certificates
    #[must_use]
    pub fn len(&self) -> usize {
        self.minted_certificates.len()
    }

    /// Check if nothing is minted yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.minted_certificates.is_empty()
    }

    /// Token ids that appear under more than one identifier
    #[must_use]
    pub fn duplicate_token_ids(&self) -> Vec<TokenId> {
        let mut seen = HashSet::new();
        let mut duplicates: Vec<TokenId> = self
            .minted_certificates
            .values()
            .filter(|r| !seen.insert(r.token_id))
            .map(|r| r.token_id)
            .collect();
        duplicates.sort_unstable();
        duplicates.dedup();
        duplicates
    }

    /// Pretty JSON form
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> CheckpointResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed
    pub fn from_json(json: &str) -> CheckpointResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Durable checkpoint storage
///
/// Implementations persist every `record` before returning, so a process
/// killed right after a call returns still has the entry on restart.
pub trait CheckpointStore: Send {
    /// Look up an entry
    fn get(&self, identifier: &str) -> Option<CheckpointRecord>;

    /// Check if an identifier has been minted
    fn contains(&self, identifier: &str) -> bool {
        self.get(identifier).is_some()
    }

    /// Persist a new entry
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::AlreadyRecorded`] if the identifier exists,
    /// or an IO/database error if the write did not reach storage
    fn record(&mut self, identifier: &str, record: CheckpointRecord) -> CheckpointResult<()>;

    /// Persist the sub-batch progress marker
    ///
    /// # Errors
    ///
    /// Returns error if the write did not reach storage
    fn set_last_batch_index(&mut self, index: usize) -> CheckpointResult<()>;

    /// Copy of the current contents
    fn snapshot(&self) -> Checkpoint;

    /// Number of minted certificates
    fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Check if nothing is minted yet
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which checkpoint backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    /// Single JSON file, replaced atomically on every write
    #[default]
    Json,
    /// Embedded `redb` database, one transaction per write
    Redb,
}

/// Open (or create) a checkpoint store
///
/// # Errors
///
/// Returns error if the existing checkpoint cannot be read
pub fn open_store(
    backend: CheckpointBackend,
    path: impl AsRef<Path>,
) -> CheckpointResult<Box<dyn CheckpointStore>> {
    Ok(match backend {
        CheckpointBackend::Json => Box::new(crate::json::JsonCheckpointStore::open(path)?),
        CheckpointBackend::Redb => Box::new(crate::kv::RedbCheckpointStore::open(path)?),
    })
}
