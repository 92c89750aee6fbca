//! Core error types for COA Forge.

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Recomputing a hash from identical input produced a different value.
    ///
    /// Always fatal: it means canonicalization is not stable.
    #[error("Determinism fault in {context}: first {first}, second {second}")]
    DeterminismFault {
        /// What was being hashed
        context: String,
        /// First computed value
        first: String,
        /// Second computed value
        second: String,
    },

    /// Attestation requested over zero content hashes
    #[error("Attestation input is empty")]
    EmptyAttestationInput,

    /// Malformed hash string
    #[error("Invalid hash: {reason}")]
    InvalidHash {
        /// Why the hash was rejected
        reason: String,
    },

    /// Document could not be canonicalized
    #[error("Canonicalization failed: {reason}")]
    Canonicalization {
        /// Why canonicalization failed
        reason: String,
    },

    /// Document is not shaped like a certificate
    #[error("Invalid document: {reason}")]
    InvalidDocument {
        /// What is wrong with it
        reason: String,
    },

    /// Hash mismatch
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Expected value
        expected: String,
        /// Actual value
        actual: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
