//! In-process contract double.
//!
//! Behaves like the certificate contract behind a well-behaved node: token
//! ids are handed out sequentially, receipts are available immediately and
//! `tokenURI` returns what was minted. Faults are scripted per submission so
//! tests can reproduce timeouts, rejections and lost transactions exactly.

use crate::client::ChainClient;
use crate::error::{ChainError, ChainResult};
use crate::receipt::{tx_hash_hex, BatchMintReceipt, MintReceipt};
use async_trait::async_trait;
use coa_core::{Digest, TokenId};
use ethers::types::{Address, TxHash, U256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Base cost of a mint
const BASE_GAS: u64 = 90_000;

/// Cost per byte of token URI
const GAS_PER_BYTE: u64 = 16;

/// A scripted fault, applied to one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainFault {
    /// The node refuses the transaction
    Reject {
        /// Node message
        reason: String,
    },
    /// The submission never reaches the node
    Transport {
        /// Transport message
        message: String,
    },
    /// Receipt waits time out. With `included` the transaction is mined
    /// anyway and shows up in [`ChainClient::receipt`]; without it the
    /// transaction is lost.
    ReceiptTimeout {
        /// Whether the transaction was mined
        included: bool,
    },
    /// The transaction is mined but reverts
    Revert,
}

#[derive(Debug, Clone)]
enum TxOutcome {
    Mined(MintReceipt),
    Reverted,
    Lost,
}

#[derive(Debug, Default)]
struct State {
    next_token_id: u64,
    tokens: BTreeMap<u64, String>,
    owners: BTreeMap<u64, Address>,
    txs: HashMap<TxHash, TxOutcome>,
    /// Mined transactions whose receipt waits still time out
    slow: HashSet<TxHash>,
    faults: HashMap<usize, ChainFault>,
    unreadable: HashSet<u64>,
    /// Error returned by receipt lookups while set
    lookup_error: Option<String>,
    submissions: usize,
    nonce: u64,
    balance: U256,
}

impl State {
    fn next_tx_hash(&mut self, signer: Address) -> TxHash {
        let digest = Digest::compute(format!("{:#x}:{}", signer, self.nonce).as_bytes());
        self.nonce += 1;
        TxHash::from(*digest.as_bytes())
    }

    fn mint(&mut self, to: Address, uri: &str) -> TokenId {
        let id = self.next_token_id;
        self.next_token_id += 1;
        self.tokens.insert(id, uri.to_string());
        self.owners.insert(id, to);
        TokenId(id)
    }
}

/// In-memory certificate contract
#[derive(Debug)]
pub struct MemoryChain {
    signer: Address,
    state: Mutex<State>,
}

impl Default for MemoryChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChain {
    /// Create a chain whose first minted token id is 1
    #[must_use]
    pub fn new() -> Self {
        Self {
            signer: Address::repeat_byte(0x51),
            state: Mutex::new(State {
                next_token_id: 1,
                balance: U256::exp10(18),
                ..State::default()
            }),
        }
    }

    /// Start token ids at `first`
    #[must_use]
    pub fn with_first_token_id(mut self, first: u64) -> Self {
        self.state.get_mut().next_token_id = first;
        self
    }

    /// Apply `fault` to the `submission`-th submission (0-based, counted
    /// across single and batch mints)
    #[must_use]
    pub fn with_fault(mut self, submission: usize, fault: ChainFault) -> Self {
        self.state.get_mut().faults.insert(submission, fault);
        self
    }

    /// Schedule a fault on a running chain
    pub async fn inject_fault(&self, submission: usize, fault: ChainFault) {
        self.state.lock().await.faults.insert(submission, fault);
    }

    /// Make receipt lookups fail with a transport error, or heal them
    pub async fn fail_receipt_lookups(&self, message: Option<&str>) {
        self.state.lock().await.lookup_error = message.map(str::to_string);
    }

    /// Replace the stored URI of a token
    pub async fn set_token_uri(&self, token_id: TokenId, uri: impl Into<String>) {
        self.state.lock().await.tokens.insert(token_id.get(), uri.into());
    }

    /// Make `tokenURI` fail for a token
    pub async fn make_unreadable(&self, token_id: TokenId) {
        self.state.lock().await.unreadable.insert(token_id.get());
    }

    /// Number of tokens minted
    pub async fn minted_count(&self) -> usize {
        self.state.lock().await.tokens.len()
    }

    /// Number of submissions attempted, successful or not
    pub async fn submissions(&self) -> usize {
        self.state.lock().await.submissions
    }

    /// Owner of a token
    pub async fn owner_of(&self, token_id: TokenId) -> Option<Address> {
        self.state.lock().await.owners.get(&token_id.get()).copied()
    }
}

fn estimate(uri: &str) -> U256 {
    U256::from(BASE_GAS + GAS_PER_BYTE * uri.len() as u64)
}

#[async_trait]
impl ChainClient for MemoryChain {
    fn signer_address(&self) -> Address {
        self.signer
    }

    async fn balance(&self) -> ChainResult<U256> {
        Ok(self.state.lock().await.balance)
    }

    async fn estimate_mint_gas(&self, _to: Address, uri: &str) -> ChainResult<U256> {
        Ok(estimate(uri))
    }

    async fn submit_mint(&self, to: Address, uri: &str, gas_limit: U256) -> ChainResult<TxHash> {
        let mut state = self.state.lock().await;
        let index = state.submissions;
        state.submissions += 1;

        let fault = state.faults.remove(&index);
        match &fault {
            Some(ChainFault::Reject { reason }) => {
                return Err(ChainError::Rejected {
                    reason: reason.clone(),
                })
            }
            Some(ChainFault::Transport { message }) => {
                return Err(ChainError::Transport {
                    message: message.clone(),
                })
            }
            _ => {}
        }

        let needed = estimate(uri);
        if gas_limit < needed {
            return Err(ChainError::Rejected {
                reason: format!("intrinsic gas too low: have {}, want {}", gas_limit, needed),
            });
        }

        let tx = state.next_tx_hash(self.signer);
        let outcome = match fault {
            Some(ChainFault::Revert) => TxOutcome::Reverted,
            Some(ChainFault::ReceiptTimeout { included: false }) => TxOutcome::Lost,
            Some(ChainFault::ReceiptTimeout { included: true }) => {
                state.slow.insert(tx);
                let token_id = state.mint(to, uri);
                TxOutcome::Mined(MintReceipt { tx_hash: tx, token_id, gas_used: needed })
            }
            _ => {
                let token_id = state.mint(to, uri);
                TxOutcome::Mined(MintReceipt { tx_hash: tx, token_id, gas_used: needed })
            }
        };
        debug!(tx = %tx_hash_hex(&tx), submission = index, "memory chain accepted mint");
        state.txs.insert(tx, outcome);
        Ok(tx)
    }

    async fn wait_for_receipt(&self, tx: TxHash, timeout: Duration) -> ChainResult<MintReceipt> {
        let state = self.state.lock().await;
        let timed_out = || ChainError::Timeout {
            tx_hash: tx_hash_hex(&tx),
            secs: timeout.as_secs(),
        };
        if state.slow.contains(&tx) {
            return Err(timed_out());
        }
        match state.txs.get(&tx) {
            Some(TxOutcome::Mined(receipt)) => Ok(receipt.clone()),
            Some(TxOutcome::Reverted) => Err(ChainError::Rejected {
                reason: format!("transaction {} reverted", tx_hash_hex(&tx)),
            }),
            Some(TxOutcome::Lost) | None => Err(timed_out()),
        }
    }

    async fn receipt(&self, tx: TxHash) -> ChainResult<Option<MintReceipt>> {
        let state = self.state.lock().await;
        if let Some(message) = &state.lookup_error {
            return Err(ChainError::Transport {
                message: message.clone(),
            });
        }
        match state.txs.get(&tx) {
            Some(TxOutcome::Mined(receipt)) => Ok(Some(receipt.clone())),
            Some(TxOutcome::Reverted) => Err(ChainError::Rejected {
                reason: format!("transaction {} reverted", tx_hash_hex(&tx)),
            }),
            Some(TxOutcome::Lost) | None => Ok(None),
        }
    }

    async fn mint_batch(
        &self,
        recipients: Vec<Address>,
        uris: Vec<String>,
        _gas_margin_percent: u64,
        timeout: Duration,
    ) -> ChainResult<BatchMintReceipt> {
        if recipients.len() != uris.len() {
            return Err(ChainError::Rejected {
                reason: "recipients and uris differ in length".to_string(),
            });
        }

        let mut state = self.state.lock().await;
        let index = state.submissions;
        state.submissions += 1;

        let tx = state.next_tx_hash(self.signer);
        match state.faults.remove(&index) {
            Some(ChainFault::Reject { reason }) => return Err(ChainError::Rejected { reason }),
            Some(ChainFault::Transport { message }) => return Err(ChainError::Transport { message }),
            Some(ChainFault::Revert) => {
                return Err(ChainError::Rejected {
                    reason: format!("transaction {} reverted", tx_hash_hex(&tx)),
                })
            }
            Some(ChainFault::ReceiptTimeout { .. }) => {
                return Err(ChainError::Timeout {
                    tx_hash: tx_hash_hex(&tx),
                    secs: timeout.as_secs(),
                })
            }
            None => {}
        }

        let gas = uris.iter().fold(U256::zero(), |acc, uri| acc + estimate(uri));
        let token_ids = recipients
            .iter()
            .zip(&uris)
            .map(|(to, uri)| state.mint(*to, uri))
            .collect();
        Ok(BatchMintReceipt {
            tx_hash: tx,
            token_ids,
            gas_used: gas,
        })
    }

    async fn token_uri(&self, token_id: TokenId) -> ChainResult<String> {
        let state = self.state.lock().await;
        if state.unreadable.contains(&token_id.get()) {
            return Err(ChainError::Transport {
                message: format!("tokenURI({}) failed", token_id),
            });
        }
        state
            .tokens
            .get(&token_id.get())
            .cloned()
            .ok_or_else(|| ChainError::Rejected {
                reason: format!("ERC721: invalid token ID {}", token_id),
            })
    }
}
