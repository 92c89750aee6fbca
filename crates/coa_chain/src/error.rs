//! Chain error types.

/// Chain result type
pub type ChainResult<T> = Result<T, ChainError>;

/// Chain error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// Receipt not observed within the timeout window
    #[error("No receipt for {tx_hash} after {secs}s")]
    Timeout {
        /// Transaction waited on
        tx_hash: String,
        /// Timeout that elapsed
        secs: u64,
    },

    /// The node dropped the transaction from its pool
    #[error("Transaction {tx_hash} dropped before inclusion")]
    Dropped {
        /// Dropped transaction
        tx_hash: String,
    },

    /// Transaction reverted or was refused by the node
    #[error("Transaction rejected: {reason}")]
    Rejected {
        /// Revert reason or node message
        reason: String,
    },

    /// RPC transport failure
    #[error("Chain transport error: {message}")]
    Transport {
        /// Underlying message
        message: String,
    },

    /// Returned data could not be decoded
    #[error("Decode error: {reason}")]
    Decode {
        /// What was wrong
        reason: String,
    },

    /// Malformed address
    #[error("Invalid address: {value}")]
    InvalidAddress {
        /// Offending input
        value: String,
    },

    /// Signing key could not be loaded
    #[error("Invalid signing key: {reason}")]
    InvalidKey {
        /// What was wrong
        reason: String,
    },

    /// RPC endpoint serves a different chain than configured
    #[error("Chain id mismatch: configured {expected}, endpoint reports {actual}")]
    WrongChain {
        /// Configured chain id
        expected: u64,
        /// Chain id reported by the endpoint
        actual: u64,
    },
}

impl ChainError {
    /// Whether the operation may succeed if tried again.
    ///
    /// Timeouts, dropped transactions and transport faults are transient.
    /// Rejections are final for the attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Dropped { .. } | Self::Transport { .. }
        )
    }

    /// Whether the error is a receipt timeout
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    pub(crate) fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ChainError::Timeout { tx_hash: "0x1".into(), secs: 60 }.is_retryable());
        assert!(ChainError::Dropped { tx_hash: "0x1".into() }.is_retryable());
        assert!(ChainError::transport("connection reset").is_retryable());
        assert!(!ChainError::Rejected { reason: "revert".into() }.is_retryable());
        assert!(!ChainError::decode("bad log").is_retryable());
    }

    #[test]
    fn test_timeout_display() {
        let err = ChainError::Timeout { tx_hash: "0xabc".into(), secs: 60 };
        assert_eq!(err.to_string(), "No receipt for 0xabc after 60s");
    }
}
