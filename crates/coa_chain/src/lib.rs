//! COA Forge Chain
//!
//! The contract-call boundary: gas estimation, mint submission, receipt
//! waits, `Transfer` log decoding and `tokenURI` reads. Everything above
//! this crate talks to a [`ChainClient`] and never to a provider directly,
//! so orchestration and verification run unchanged against
//! [`MemoryChain`] in tests.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod error;
pub mod evm;
pub mod memory;
pub mod metadata;
pub mod receipt;

pub use client::{apply_gas_margin, format_balance, parse_address, ChainClient};
pub use error::{ChainError, ChainResult};
pub use evm::{ChainEndpoint, EthersChainClient};
pub use memory::{ChainFault, MemoryChain};
pub use metadata::{
    decode_token_uri, encode_token_uri, Attribute, MetadataConfig, TokenMetadata, DATA_URI_PREFIX,
};
pub use receipt::{
    extract_minted_token_id, extract_minted_token_ids, tx_hash_hex, BatchMintReceipt, MintReceipt,
    TransferLog,
};

pub use ethers::types::{Address, TxHash, U256};
