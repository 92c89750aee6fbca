//! The chain client seam.

use crate::error::{ChainError, ChainResult};
use crate::receipt::{BatchMintReceipt, MintReceipt};
use async_trait::async_trait;
use coa_core::TokenId;
use ethers::types::{Address, TxHash, U256};
use std::time::Duration;

/// Contract-call boundary used by the orchestrator and the verifier.
///
/// One client holds one signing key. Callers must not run `submit_mint`
/// concurrently on the same client: nonces are assigned in submission order.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Address of the signing key
    fn signer_address(&self) -> Address;

    /// Native balance of the signer, in wei
    async fn balance(&self) -> ChainResult<U256>;

    /// Gas estimate for `mintURI(to, uri)`
    async fn estimate_mint_gas(&self, to: Address, uri: &str) -> ChainResult<U256>;

    /// Send `mintURI(to, uri)` with an explicit gas limit. Returns once the
    /// node has accepted the transaction, not when it is mined.
    async fn submit_mint(&self, to: Address, uri: &str, gas_limit: U256) -> ChainResult<TxHash>;

    /// Wait up to `timeout` for the receipt of `tx` and decode the minted
    /// token id from it.
    ///
    /// Fails with [`ChainError::Timeout`] when the window elapses and with
    /// [`ChainError::Rejected`] when the transaction reverted.
    async fn wait_for_receipt(&self, tx: TxHash, timeout: Duration) -> ChainResult<MintReceipt>;

    /// Look up the receipt of `tx` without waiting. `None` while pending or
    /// unknown.
    async fn receipt(&self, tx: TxHash) -> ChainResult<Option<MintReceipt>>;

    /// Mint several tokens in one `batchMintURI` transaction and wait for it
    async fn mint_batch(
        &self,
        recipients: Vec<Address>,
        uris: Vec<String>,
        gas_margin_percent: u64,
        timeout: Duration,
    ) -> ChainResult<BatchMintReceipt>;

    /// Read `tokenURI(token_id)`
    async fn token_uri(&self, token_id: TokenId) -> ChainResult<String>;
}

/// Scale a gas estimate by `percent` (200 doubles it), never going below
/// the estimate itself.
#[must_use]
pub fn apply_gas_margin(estimate: U256, percent: u64) -> U256 {
    let scaled = estimate.saturating_mul(U256::from(percent)) / U256::from(100u64);
    scaled.max(estimate)
}

/// Render a wei amount in whole ether units
#[must_use]
pub fn format_balance(wei: U256) -> String {
    ethers::utils::format_ether(wei)
}

/// Parse a hex address, with or without the `0x` prefix
///
/// # Errors
///
/// Returns [`ChainError::InvalidAddress`] if the input is not 20 hex bytes
pub fn parse_address(value: &str) -> ChainResult<Address> {
    value.trim().parse().map_err(|_| ChainError::InvalidAddress {
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_gas_margin_doubles() {
        assert_eq!(apply_gas_margin(U256::from(21_000u64), 200), U256::from(42_000u64));
        assert_eq!(apply_gas_margin(U256::from(1_000u64), 150), U256::from(1_500u64));
    }

    #[test]
    fn test_gas_margin_never_reduces() {
        assert_eq!(apply_gas_margin(U256::from(1_000u64), 50), U256::from(1_000u64));
    }

    #[test]
    fn test_format_balance() {
        assert!(format_balance(U256::exp10(18)).starts_with("1.0"));
    }

    #[test]
    fn test_parse_address() {
        let addr = parse_address("0x000000000000000000000000000000000000dEaD").unwrap();
        assert_eq!(addr.as_bytes()[19], 0xad);
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address("not an address").is_err());
    }

    proptest! {
        #[test]
        fn prop_margin_at_least_estimate(estimate in any::<u64>(), percent in 0u64..1000) {
            let limit = apply_gas_margin(U256::from(estimate), percent);
            prop_assert!(limit >= U256::from(estimate));
        }
    }
}
