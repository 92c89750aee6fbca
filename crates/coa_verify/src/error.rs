//! Verification error types.

use coa_chain::ChainError;
use coa_core::CoreError;
use serde::Serialize;

/// Verify result type
pub type VerifyResult<T> = Result<T, VerifyError>;

/// A source token that could not be read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFailure {
    /// Token id
    pub token_id: u64,
    /// What went wrong
    pub error: String,
}

/// Verification error.
///
/// Per-token mismatches are not errors; they are findings in the report.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// No source tokens were given
    #[error("No source tokens to attest")]
    NoSources,

    /// Some source tokens could not be read; no partial attestation is made
    #[error("{} of {total} source tokens could not be read", failures.len())]
    SourcesUnreadable {
        /// Tokens requested
        total: usize,
        /// Tokens that failed
        failures: Vec<SourceFailure>,
    },

    /// Hashing error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Chain error outside a per-token check
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Report could not be written
    #[error("IO error at {path}: {source}")]
    Io {
        /// File involved
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
