//! Mint run configuration.

use crate::error::{MintError, MintResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Batch mint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MintConfig {
    /// Certificates per sub-batch
    pub batch_size: usize,
    /// Concurrent artifact uploads within a sub-batch
    pub upload_concurrency: usize,
    /// Gas limit as a percentage of the estimate
    pub gas_multiplier_percent: u64,
    /// Receipt wait per attempt, in seconds
    pub receipt_timeout_secs: u64,
    /// Submissions per certificate before the run halts
    pub max_attempts: u32,
    /// Pause before a resubmission, in seconds
    pub retry_delay_secs: u64,
    /// Re-render and re-upload artifacts with token ids after minting
    pub rerender: bool,
}

impl Default for MintConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            upload_concurrency: 5,
            gas_multiplier_percent: 200,
            receipt_timeout_secs: 60,
            max_attempts: 3,
            retry_delay_secs: 5,
            rerender: true,
        }
    }
}

impl MintConfig {
    /// Set sub-batch size
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set upload fan-out
    #[must_use]
    pub fn with_upload_concurrency(mut self, n: usize) -> Self {
        self.upload_concurrency = n;
        self
    }

    /// Set attempt limit
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set delay between attempts
    #[must_use]
    pub fn with_retry_delay_secs(mut self, secs: u64) -> Self {
        self.retry_delay_secs = secs;
        self
    }

    /// Enable or disable the post-mint re-render pass
    #[must_use]
    pub fn with_rerender(mut self, rerender: bool) -> Self {
        self.rerender = rerender;
        self
    }

    /// Receipt wait per attempt
    #[must_use]
    pub const fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    /// Pause before a resubmission
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Reject settings the orchestrator cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`MintError::Config`] naming the first bad field
    pub fn validate(&self) -> MintResult<()> {
        let bad = |reason: &str| {
            Err(MintError::Config {
                reason: reason.to_string(),
            })
        };
        if self.batch_size == 0 {
            return bad("batchSize must be at least 1");
        }
        if self.upload_concurrency == 0 {
            return bad("uploadConcurrency must be at least 1");
        }
        if self.max_attempts == 0 {
            return bad("maxAttempts must be at least 1");
        }
        if self.gas_multiplier_percent < 100 {
            return bad("gasMultiplierPercent must be at least 100");
        }
        if self.receipt_timeout_secs == 0 {
            return bad("receiptTimeoutSecs must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MintConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.upload_concurrency, 5);
        assert_eq!(config.gas_multiplier_percent, 200);
        assert_eq!(config.receipt_timeout(), Duration::from_secs(60));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_delay(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: MintConfig = serde_json::from_str(r#"{"batchSize": 25, "rerender": false}"#).unwrap();
        assert_eq!(config.batch_size, 25);
        assert!(!config.rerender);
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(MintConfig::default().with_batch_size(0).validate().is_err());
        assert!(MintConfig::default().with_max_attempts(0).validate().is_err());
        let low_gas = MintConfig {
            gas_multiplier_percent: 90,
            ..MintConfig::default()
        };
        assert!(low_gas.validate().is_err());
    }
}
