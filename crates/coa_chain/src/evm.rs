//! `ethers`-backed client for an EVM certificate contract.

use crate::client::{apply_gas_margin, ChainClient};
use crate::error::{ChainError, ChainResult};
use crate::receipt::{
    extract_minted_token_id, extract_minted_token_ids, tx_hash_hex, BatchMintReceipt, MintReceipt,
    TransferLog,
};
use async_trait::async_trait;
use coa_core::TokenId;
use ethers::contract::{parse_log, ContractError};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, MiddlewareError as _, PendingTransaction, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, TransactionReceipt, TxHash, U256, U64};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[allow(missing_docs)]
mod bindings {
    use ethers::prelude::abigen;

    abigen!(
        CoaContract,
        r"[
            function mintURI(address to, string uri) returns (uint256)
            function batchMintURI(address[] recipients, string[] uris)
            function tokenURI(uint256 tokenId) view returns (string)
            event Transfer(address indexed from, address indexed to, uint256 indexed tokenId)
        ]"
    );
}

use bindings::{CoaContract, TransferFilter};

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Where the contract lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEndpoint {
    /// JSON-RPC URL
    pub rpc_url: String,
    /// Expected chain id
    pub chain_id: u64,
    /// Certificate contract
    pub contract: Address,
    /// Receipt polling interval
    pub poll_interval: Duration,
}

impl ChainEndpoint {
    /// Create an endpoint with the default 2s polling interval
    #[must_use]
    pub fn new(rpc_url: impl Into<String>, chain_id: u64, contract: Address) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            chain_id,
            contract,
            poll_interval: Duration::from_secs(2),
        }
    }

    /// Set the receipt polling interval
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Chain client over HTTP JSON-RPC with a local signing key
pub struct EthersChainClient {
    client: Arc<SignerClient>,
    contract: CoaContract<SignerClient>,
    poll_interval: Duration,
}

impl EthersChainClient {
    /// Connect to the endpoint and check that it serves the configured chain
    ///
    /// # Errors
    ///
    /// Returns error if the URL or key is invalid, the endpoint is
    /// unreachable, or it reports a different chain id
    pub async fn connect(endpoint: &ChainEndpoint, signer_key: &SecretString) -> ChainResult<Self> {
        let provider = Provider::<Http>::try_from(endpoint.rpc_url.as_str())
            .map_err(|e| ChainError::transport(format!("invalid RPC URL {}: {}", endpoint.rpc_url, e)))?
            .interval(endpoint.poll_interval);

        let actual = provider.get_chainid().await.map_err(ChainError::transport)?;
        if actual != U256::from(endpoint.chain_id) {
            return Err(ChainError::WrongChain {
                expected: endpoint.chain_id,
                actual: actual.low_u64(),
            });
        }

        let key = signer_key.expose_secret().trim();
        let wallet = key
            .strip_prefix("0x")
            .unwrap_or(key)
            .parse::<LocalWallet>()
            .map_err(|e| ChainError::InvalidKey {
                reason: e.to_string(),
            })?
            .with_chain_id(endpoint.chain_id);

        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        let contract = CoaContract::new(endpoint.contract, Arc::clone(&client));
        debug!(
            chain_id = endpoint.chain_id,
            contract = %address_hex(endpoint.contract),
            signer = %address_hex(client.address()),
            "connected to chain"
        );

        Ok(Self {
            client,
            contract,
            poll_interval: endpoint.poll_interval,
        })
    }

    async fn await_receipt(&self, tx: TxHash, timeout: Duration) -> ChainResult<TransactionReceipt> {
        let pending = PendingTransaction::new(tx, self.client.provider()).interval(self.poll_interval);
        match tokio::time::timeout(timeout, pending).await {
            Err(_) => Err(ChainError::Timeout {
                tx_hash: tx_hash_hex(&tx),
                secs: timeout.as_secs(),
            }),
            Ok(Err(e)) => Err(ChainError::transport(e)),
            Ok(Ok(None)) => Err(ChainError::Dropped {
                tx_hash: tx_hash_hex(&tx),
            }),
            Ok(Ok(Some(receipt))) => Ok(receipt),
        }
    }

    /// `Transfer` events emitted by our contract
    fn transfer_logs(&self, receipt: &TransactionReceipt) -> Vec<TransferLog> {
        let contract = self.contract.address();
        receipt
            .logs
            .iter()
            .filter(|log| log.address == contract)
            .filter_map(|log| parse_log::<TransferFilter>(log.clone()).ok())
            .map(|t| TransferLog {
                from: t.from,
                to: t.to,
                token_id: t.token_id,
            })
            .collect()
    }

    fn decode_mint_receipt(&self, receipt: &TransactionReceipt) -> ChainResult<MintReceipt> {
        ensure_success(receipt)?;
        Ok(MintReceipt {
            tx_hash: receipt.transaction_hash,
            token_id: extract_minted_token_id(&self.transfer_logs(receipt))?,
            gas_used: receipt.gas_used.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl ChainClient for EthersChainClient {
    fn signer_address(&self) -> Address {
        self.client.address()
    }

    async fn balance(&self) -> ChainResult<U256> {
        self.client
            .get_balance(self.client.address(), None)
            .await
            .map_err(ChainError::transport)
    }

    async fn estimate_mint_gas(&self, to: Address, uri: &str) -> ChainResult<U256> {
        self.contract
            .mint_uri(to, uri.to_string())
            .estimate_gas()
            .await
            .map_err(contract_error)
    }

    async fn submit_mint(&self, to: Address, uri: &str, gas_limit: U256) -> ChainResult<TxHash> {
        let call = self.contract.mint_uri(to, uri.to_string()).gas(gas_limit);
        let pending = call.send().await.map_err(contract_error)?;
        Ok(pending.tx_hash())
    }

    async fn wait_for_receipt(&self, tx: TxHash, timeout: Duration) -> ChainResult<MintReceipt> {
        let receipt = self.await_receipt(tx, timeout).await?;
        self.decode_mint_receipt(&receipt)
    }

    async fn receipt(&self, tx: TxHash) -> ChainResult<Option<MintReceipt>> {
        let receipt = self
            .client
            .get_transaction_receipt(tx)
            .await
            .map_err(ChainError::transport)?;
        receipt.map(|r| self.decode_mint_receipt(&r)).transpose()
    }

    async fn mint_batch(
        &self,
        recipients: Vec<Address>,
        uris: Vec<String>,
        gas_margin_percent: u64,
        timeout: Duration,
    ) -> ChainResult<BatchMintReceipt> {
        let call = self.contract.batch_mint_uri(recipients, uris);
        let estimate = call.estimate_gas().await.map_err(contract_error)?;
        let call = call.gas(apply_gas_margin(estimate, gas_margin_percent));
        let tx = call.send().await.map_err(contract_error)?.tx_hash();

        let receipt = self.await_receipt(tx, timeout).await?;
        ensure_success(&receipt)?;
        Ok(BatchMintReceipt {
            tx_hash: receipt.transaction_hash,
            token_ids: extract_minted_token_ids(&self.transfer_logs(&receipt))?,
            gas_used: receipt.gas_used.unwrap_or_default(),
        })
    }

    async fn token_uri(&self, token_id: TokenId) -> ChainResult<String> {
        self.contract
            .token_uri(U256::from(token_id.get()))
            .call()
            .await
            .map_err(contract_error)
    }
}

fn ensure_success(receipt: &TransactionReceipt) -> ChainResult<()> {
    if receipt.status == Some(U64::zero()) {
        return Err(ChainError::Rejected {
            reason: format!("transaction {} reverted", tx_hash_hex(&receipt.transaction_hash)),
        });
    }
    Ok(())
}

/// Reverts and node-side JSON-RPC refusals are final; anything else is a
/// transport problem.
fn contract_error<M: Middleware>(err: ContractError<M>) -> ChainError {
    if err.is_revert() {
        let reason = err.decode_revert::<String>().unwrap_or_else(|| err.to_string());
        return ChainError::Rejected { reason };
    }
    if let Some(rpc) = err.as_middleware_error().and_then(|e| e.as_error_response()) {
        return ChainError::Rejected {
            reason: rpc.message.clone(),
        };
    }
    ChainError::transport(err)
}

fn address_hex(address: Address) -> String {
    format!("{:#x}", address)
}
