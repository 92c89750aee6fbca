//! Mint receipts and `Transfer` log decoding.

use crate::error::{ChainError, ChainResult};
use coa_core::TokenId;
use ethers::types::{Address, TxHash, U256};

/// Result of a confirmed single mint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintReceipt {
    /// Transaction hash
    pub tx_hash: TxHash,
    /// Token minted by the transaction
    pub token_id: TokenId,
    /// Gas consumed
    pub gas_used: U256,
}

/// Result of a confirmed batch mint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchMintReceipt {
    /// Transaction hash
    pub tx_hash: TxHash,
    /// Tokens minted, in log order
    pub token_ids: Vec<TokenId>,
    /// Gas consumed
    pub gas_used: U256,
}

/// Decoded ERC-721 `Transfer(from, to, tokenId)` event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLog {
    /// Previous owner; zero for a mint
    pub from: Address,
    /// New owner
    pub to: Address,
    /// Token transferred
    pub token_id: U256,
}

impl TransferLog {
    /// A mint is a transfer from the zero address
    #[must_use]
    pub fn is_mint(&self) -> bool {
        self.from == Address::zero()
    }
}

/// Token id of the first mint-from-zero `Transfer` among `logs`.
///
/// # Errors
///
/// Returns [`ChainError::Decode`] if no log is a mint, or if the token id
/// does not fit in 64 bits
pub fn extract_minted_token_id(logs: &[TransferLog]) -> ChainResult<TokenId> {
    let log = logs
        .iter()
        .find(|l| l.is_mint())
        .ok_or_else(|| ChainError::decode("receipt has no mint Transfer event"))?;
    token_id_from_u256(log.token_id)
}

/// All mint-from-zero token ids among `logs`, in order
///
/// # Errors
///
/// Returns [`ChainError::Decode`] if a token id does not fit in 64 bits
pub fn extract_minted_token_ids(logs: &[TransferLog]) -> ChainResult<Vec<TokenId>> {
    logs.iter()
        .filter(|l| l.is_mint())
        .map(|l| token_id_from_u256(l.token_id))
        .collect()
}

pub(crate) fn token_id_from_u256(value: U256) -> ChainResult<TokenId> {
    if value > U256::from(u64::MAX) {
        return Err(ChainError::decode(format!("token id {} exceeds u64", value)));
    }
    Ok(TokenId(value.as_u64()))
}

/// Full `0x`-prefixed lowercase hex of a transaction hash.
///
/// `Display` on hash types abbreviates the middle, which is not what
/// checkpoints and logs need.
#[must_use]
pub fn tx_hash_hex(hash: &TxHash) -> String {
    format!("{:#x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    #[test]
    fn test_mint_log_selected() {
        let logs = [
            TransferLog { from: addr(1), to: addr(2), token_id: U256::from(7) },
            TransferLog { from: Address::zero(), to: addr(2), token_id: U256::from(351) },
        ];
        assert_eq!(extract_minted_token_id(&logs).unwrap(), TokenId(351));
    }

    #[test]
    fn test_no_mint_log() {
        let logs = [TransferLog { from: addr(1), to: addr(2), token_id: U256::from(7) }];
        assert!(matches!(
            extract_minted_token_id(&logs),
            Err(ChainError::Decode { .. })
        ));
        assert!(extract_minted_token_id(&[]).is_err());
    }

    #[test]
    fn test_batch_ids_in_order() {
        let logs: Vec<TransferLog> = (10..13)
            .map(|id| TransferLog { from: Address::zero(), to: addr(2), token_id: U256::from(id) })
            .collect();
        assert_eq!(
            extract_minted_token_ids(&logs).unwrap(),
            vec![TokenId(10), TokenId(11), TokenId(12)]
        );
    }

    #[test]
    fn test_oversized_token_id() {
        let logs = [TransferLog { from: Address::zero(), to: addr(2), token_id: U256::MAX }];
        assert!(extract_minted_token_id(&logs).is_err());
    }

    #[test]
    fn test_tx_hash_hex_is_full_width() {
        let hash = TxHash::from([0xab; 32]);
        let hex = tx_hash_hex(&hash);
        assert_eq!(hex.len(), 66);
        assert!(hex.starts_with("0xabab"));
    }
}
