//! Mint error types.

use crate::state::{Failure, TransitionError};
use coa_chain::ChainError;
use coa_core::CoreError;
use coa_storage::{ArtifactError, CheckpointError};
use std::path::Path;

/// Mint result type
pub type MintResult<T> = Result<T, MintError>;

/// Mint error. Every variant halts the run; the checkpoint keeps whatever
/// was minted before.
#[derive(Debug, thiserror::Error)]
pub enum MintError {
    /// A certificate could not be minted
    #[error("Mint of {identifier} failed: {failure}")]
    Failed {
        /// Certificate identifier
        identifier: String,
        /// What went wrong
        #[source]
        failure: Failure,
    },

    /// Manifest and documents disagree
    #[error("Pre-flight check failed for {identifier}: {reason}")]
    Preflight {
        /// Certificate identifier
        identifier: String,
        /// What disagreed
        reason: String,
    },

    /// Manifest is malformed
    #[error("Invalid manifest: {reason}")]
    Manifest {
        /// What was wrong
        reason: String,
    },

    /// Settings are unusable
    #[error("Invalid mint configuration: {reason}")]
    Config {
        /// What was wrong
        reason: String,
    },

    /// Rendering an artifact failed
    #[error("Rendering artifact for {identifier} failed: {reason}")]
    Render {
        /// Certificate identifier
        identifier: String,
        /// What was wrong
        reason: String,
    },

    /// IO error
    #[error("IO error at {path}: {source}")]
    Io {
        /// File involved
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Hashing or document error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Checkpoint could not be written
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Artifact upload failed
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// Chain call outside a certificate's mint, such as the balance check
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// State machine misuse
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl MintError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
