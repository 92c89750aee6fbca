//! Per-certificate mint state machine.
//!
//! ```text
//! Pending -> ArtifactUploaded -> MetadataBuilt -> Submitted -> Confirmed -> Checkpointed
//!                                     ^               |      ^
//!                                     +-- retryable --+      |
//!                                                     |      |
//!                                                     v      |
//!                                                 Unresolved-+
//! ```
//!
//! Once a certificate has run out of attempts, or was rejected, while
//! transactions of earlier attempts are still unaccounted for, it goes to
//! `Unresolved` instead of `Failed`. Those transactions are looked up one
//! last time; one that was mined confirms the certificate.
//!
//! Any non-terminal state can move to `Failed`. The transition function does
//! no I/O, so every path through it can be exercised without a chain.

use coa_chain::{ChainError, MintReceipt, TxHash};
use coa_storage::CheckpointRecord;

/// Why a certificate could not be minted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Failure {
    /// The chain refused the transaction, or its receipt was unusable
    #[error("rejected: {error}")]
    Rejected {
        /// Final chain error
        error: ChainError,
    },

    /// Every attempt ended in a transient error
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the last attempt
        last: ChainError,
    },

    /// Transactions were sent but looking them up failed, so whether the
    /// certificate was minted is not known
    #[error("outcome unknown, {sent} transaction(s) sent and lookup failed: {error}")]
    OutcomeUnknown {
        /// Transactions sent for the certificate
        sent: usize,
        /// Lookup error
        error: ChainError,
    },

    /// Stopped for a reason outside the chain
    #[error("aborted: {reason}")]
    Aborted {
        /// What happened
        reason: String,
    },
}

/// Where a certificate is in the mint pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MintState {
    /// Not started
    Pending,
    /// Artifact is publicly reachable
    ArtifactUploaded {
        /// Artifact URL
        artifact_url: String,
    },
    /// Token URI is ready; a (re)submission is due
    MetadataBuilt {
        /// Artifact URL
        artifact_url: String,
        /// Encoded token URI
        token_uri: String,
        /// Submissions attempted so far
        attempts: u32,
        /// Transactions sent by earlier attempts, oldest first
        submitted: Vec<TxHash>,
    },
    /// A transaction is in flight
    Submitted {
        /// Artifact URL
        artifact_url: String,
        /// Encoded token URI
        token_uri: String,
        /// Submissions attempted, including this one
        attempts: u32,
        /// All transactions sent; the last is the one in flight
        submitted: Vec<TxHash>,
    },
    /// No attempt is left, but earlier transactions must be looked up
    /// before giving up
    Unresolved {
        /// Artifact URL
        artifact_url: String,
        /// Every transaction sent, oldest first
        submitted: Vec<TxHash>,
        /// Failure to report if none of them was mined
        failure: Failure,
    },
    /// A receipt with a minted token id was observed
    Confirmed {
        /// Artifact URL
        artifact_url: String,
        /// Decoded receipt
        receipt: MintReceipt,
    },
    /// Durably recorded; terminal
    Checkpointed {
        /// What was written
        record: CheckpointRecord,
    },
    /// Terminal failure
    Failed(Failure),
}

impl MintState {
    /// Short state name for logs and errors
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::ArtifactUploaded { .. } => "ArtifactUploaded",
            Self::MetadataBuilt { .. } => "MetadataBuilt",
            Self::Submitted { .. } => "Submitted",
            Self::Unresolved { .. } => "Unresolved",
            Self::Confirmed { .. } => "Confirmed",
            Self::Checkpointed { .. } => "Checkpointed",
            Self::Failed(_) => "Failed",
        }
    }

    /// Check if no further transition is possible
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Checkpointed { .. } | Self::Failed(_))
    }

    /// Submissions attempted so far
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::MetadataBuilt { attempts, .. } | Self::Submitted { attempts, .. } => *attempts,
            _ => 0,
        }
    }
}

/// Something that happened to a certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MintEvent {
    /// Artifact upload finished
    ArtifactUploaded {
        /// Public URL
        url: String,
    },
    /// Metadata encoded
    MetadataBuilt {
        /// Token URI
        token_uri: String,
    },
    /// Node accepted a transaction
    Submitted {
        /// Transaction hash
        tx_hash: TxHash,
    },
    /// Gas estimation or submission failed
    SubmitFailed {
        /// Chain error
        error: ChainError,
    },
    /// A receipt was found, either by waiting or by looking up an earlier
    /// transaction
    Confirmed {
        /// Decoded receipt
        receipt: MintReceipt,
    },
    /// Receipt wait failed
    ReceiptFailed {
        /// Chain error
        error: ChainError,
    },
    /// None of the earlier transactions was mined
    NotIncluded,
    /// Looking up earlier transactions failed
    LookupFailed {
        /// Chain error
        error: ChainError,
    },
    /// Checkpoint entry written
    Checkpointed {
        /// What was written
        record: CheckpointRecord,
    },
    /// Stop processing this certificate
    Abort {
        /// Why
        reason: String,
    },
}

impl MintEvent {
    /// Short event name for logs and errors
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ArtifactUploaded { .. } => "ArtifactUploaded",
            Self::MetadataBuilt { .. } => "MetadataBuilt",
            Self::Submitted { .. } => "Submitted",
            Self::SubmitFailed { .. } => "SubmitFailed",
            Self::Confirmed { .. } => "Confirmed",
            Self::ReceiptFailed { .. } => "ReceiptFailed",
            Self::NotIncluded => "NotIncluded",
            Self::LookupFailed { .. } => "LookupFailed",
            Self::Checkpointed { .. } => "Checkpointed",
            Self::Abort { .. } => "Abort",
        }
    }
}

/// An event that is not valid in the current state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Event {event} is not valid in state {state}")]
pub struct TransitionError {
    /// State name
    pub state: &'static str,
    /// Event name
    pub event: &'static str,
}

/// Compute the next state.
///
/// `max_attempts` bounds the number of submissions: after a transient
/// failure the certificate goes back to `MetadataBuilt` for another attempt
/// only while fewer than `max_attempts` have been made. A certificate that
/// fails with transactions already sent passes through `Unresolved`.
///
/// # Errors
///
/// Returns [`TransitionError`] if `event` cannot happen in `state`
pub fn transition(
    state: MintState,
    event: MintEvent,
    max_attempts: u32,
) -> Result<MintState, TransitionError> {
    let invalid = TransitionError {
        state: state.name(),
        event: event.name(),
    };

    let next = match (state, event) {
        (state, _) if state.is_terminal() => return Err(invalid),

        (_, MintEvent::Abort { reason }) => MintState::Failed(Failure::Aborted { reason }),

        (MintState::Pending, MintEvent::ArtifactUploaded { url }) => {
            MintState::ArtifactUploaded { artifact_url: url }
        }

        (MintState::ArtifactUploaded { artifact_url }, MintEvent::MetadataBuilt { token_uri }) => {
            MintState::MetadataBuilt {
                artifact_url,
                token_uri,
                attempts: 0,
                submitted: Vec::new(),
            }
        }

        (
            MintState::MetadataBuilt {
                artifact_url,
                token_uri,
                attempts,
                mut submitted,
            },
            MintEvent::Submitted { tx_hash },
        ) => {
            submitted.push(tx_hash);
            MintState::Submitted {
                artifact_url,
                token_uri,
                attempts: attempts + 1,
                submitted,
            }
        }

        (
            MintState::MetadataBuilt {
                artifact_url,
                token_uri,
                attempts,
                submitted,
            },
            MintEvent::SubmitFailed { error },
        ) => retry_or_fail(artifact_url, token_uri, attempts + 1, submitted, error, max_attempts),

        // An earlier transaction turned out to be included
        (MintState::MetadataBuilt { artifact_url, submitted, .. }, MintEvent::Confirmed { receipt })
            if submitted.contains(&receipt.tx_hash) =>
        {
            MintState::Confirmed {
                artifact_url,
                receipt,
            }
        }

        (MintState::Submitted { artifact_url, submitted, .. }, MintEvent::Confirmed { receipt })
            if submitted.contains(&receipt.tx_hash) =>
        {
            MintState::Confirmed {
                artifact_url,
                receipt,
            }
        }

        (MintState::Unresolved { artifact_url, submitted, .. }, MintEvent::Confirmed { receipt })
            if submitted.contains(&receipt.tx_hash) =>
        {
            MintState::Confirmed {
                artifact_url,
                receipt,
            }
        }

        (MintState::Unresolved { failure, .. }, MintEvent::NotIncluded) => MintState::Failed(failure),

        (
            MintState::MetadataBuilt { submitted, .. } | MintState::Unresolved { submitted, .. },
            MintEvent::LookupFailed { error },
        ) if !submitted.is_empty() => MintState::Failed(Failure::OutcomeUnknown {
            sent: submitted.len(),
            error,
        }),

        (
            MintState::Submitted {
                artifact_url,
                token_uri,
                attempts,
                submitted,
            },
            MintEvent::ReceiptFailed { error },
        ) => retry_or_fail(artifact_url, token_uri, attempts, submitted, error, max_attempts),

        (MintState::Confirmed { receipt, .. }, MintEvent::Checkpointed { record })
            if record.token_id == receipt.token_id =>
        {
            MintState::Checkpointed { record }
        }

        _ => return Err(invalid),
    };

    Ok(next)
}

fn retry_or_fail(
    artifact_url: String,
    token_uri: String,
    attempts: u32,
    submitted: Vec<TxHash>,
    error: ChainError,
    max_attempts: u32,
) -> MintState {
    let failure = if !error.is_retryable() {
        Failure::Rejected { error }
    } else if attempts >= max_attempts {
        Failure::RetriesExhausted {
            attempts,
            last: error,
        }
    } else {
        return MintState::MetadataBuilt {
            artifact_url,
            token_uri,
            attempts,
            submitted,
        };
    };

    if submitted.is_empty() {
        MintState::Failed(failure)
    } else {
        MintState::Unresolved {
            artifact_url,
            submitted,
            failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coa_chain::{tx_hash_hex, U256};
    use coa_core::TokenId;
    use proptest::prelude::*;

    const MAX: u32 = 3;

    fn tx(n: u8) -> TxHash {
        TxHash::from([n; 32])
    }

    fn receipt(n: u8, token: u64) -> MintReceipt {
        MintReceipt {
            tx_hash: tx(n),
            token_id: TokenId(token),
            gas_used: U256::from(100_000u64),
        }
    }

    fn timeout(n: u8) -> ChainError {
        ChainError::Timeout {
            tx_hash: tx_hash_hex(&tx(n)),
            secs: 60,
        }
    }

    fn built() -> MintState {
        let s = transition(
            MintState::Pending,
            MintEvent::ArtifactUploaded { url: "https://a/x.svg".into() },
            MAX,
        )
        .unwrap();
        transition(s, MintEvent::MetadataBuilt { token_uri: "data:x".into() }, MAX).unwrap()
    }

    fn step(state: MintState, event: MintEvent) -> MintState {
        transition(state, event, MAX).unwrap()
    }

    #[test]
    fn test_happy_path() {
        let s = step(built(), MintEvent::Submitted { tx_hash: tx(1) });
        assert_eq!(s.attempts(), 1);
        let s = step(s, MintEvent::Confirmed { receipt: receipt(1, 7) });
        let record = CheckpointRecord {
            token_id: TokenId(7),
            tx_hash: tx_hash_hex(&tx(1)),
            artifact_url: "https://a/x.svg".into(),
        };
        let s = step(s, MintEvent::Checkpointed { record: record.clone() });
        assert_eq!(s, MintState::Checkpointed { record });
        assert!(s.is_terminal());
    }

    #[test]
    fn test_timeout_goes_back_for_resubmission() {
        let s = step(built(), MintEvent::Submitted { tx_hash: tx(1) });
        let s = step(s, MintEvent::ReceiptFailed { error: timeout(1) });
        match &s {
            MintState::MetadataBuilt { attempts, submitted, .. } => {
                assert_eq!(*attempts, 1);
                assert_eq!(submitted, &vec![tx(1)]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_earlier_transaction_confirms_without_resubmitting() {
        let s = step(built(), MintEvent::Submitted { tx_hash: tx(1) });
        let s = step(s, MintEvent::ReceiptFailed { error: timeout(1) });
        let s = step(s, MintEvent::Confirmed { receipt: receipt(1, 9) });
        assert_eq!(s.name(), "Confirmed");
    }

    #[test]
    fn test_foreign_receipt_rejected() {
        let s = step(built(), MintEvent::Submitted { tx_hash: tx(1) });
        let err = transition(s, MintEvent::Confirmed { receipt: receipt(2, 9) }, MAX).unwrap_err();
        assert_eq!(err.state, "Submitted");
    }

    #[test]
    fn test_exhaustion_after_max_attempts() {
        let mut s = built();
        for n in 1..=3 {
            s = step(s, MintEvent::Submitted { tx_hash: tx(n) });
            s = step(s, MintEvent::ReceiptFailed { error: timeout(n) });
        }
        match &s {
            MintState::Unresolved { submitted, .. } => assert_eq!(submitted, &vec![tx(1), tx(2), tx(3)]),
            other => panic!("unexpected {:?}", other),
        }
        let s = step(s, MintEvent::NotIncluded);
        assert!(matches!(
            s,
            MintState::Failed(Failure::RetriesExhausted { attempts: 3, .. })
        ));
    }

    #[test]
    fn test_last_attempt_confirms_after_lookup() {
        let mut s = built();
        for n in 1..=3 {
            s = step(s, MintEvent::Submitted { tx_hash: tx(n) });
            s = step(s, MintEvent::ReceiptFailed { error: timeout(n) });
        }
        assert_eq!(s.name(), "Unresolved");
        let err = transition(s.clone(), MintEvent::Confirmed { receipt: receipt(9, 4) }, MAX).unwrap_err();
        assert_eq!(err.state, "Unresolved");
        let s = step(s, MintEvent::Confirmed { receipt: receipt(3, 4) });
        assert_eq!(s.name(), "Confirmed");
    }

    #[test]
    fn test_lookup_failure_leaves_outcome_unknown() {
        let mut s = built();
        for n in 1..=3 {
            s = step(s, MintEvent::Submitted { tx_hash: tx(n) });
            s = step(s, MintEvent::ReceiptFailed { error: timeout(n) });
        }
        let error = ChainError::Transport { message: "reset".into() };
        let s = step(s, MintEvent::LookupFailed { error });
        let failure = match s {
            MintState::Failed(failure @ Failure::OutcomeUnknown { sent: 3, .. }) => failure,
            other => panic!("unexpected {:?}", other),
        };
        assert!(failure.to_string().contains("outcome unknown"));
    }

    #[test]
    fn test_lookup_failure_before_resubmission() {
        let s = step(built(), MintEvent::Submitted { tx_hash: tx(1) });
        let s = step(s, MintEvent::ReceiptFailed { error: timeout(1) });
        let error = ChainError::Transport { message: "reset".into() };
        let s = step(s, MintEvent::LookupFailed { error: error.clone() });
        assert!(matches!(s, MintState::Failed(Failure::OutcomeUnknown { sent: 1, .. })));

        // Nothing sent yet, so there is nothing to look up
        assert!(transition(built(), MintEvent::LookupFailed { error }, MAX).is_err());
    }

    #[test]
    fn test_rejection_looks_up_earlier_transactions() {
        let s = step(built(), MintEvent::Submitted { tx_hash: tx(1) });
        let s = step(s, MintEvent::ReceiptFailed { error: timeout(1) });
        let s = step(s, MintEvent::Submitted { tx_hash: tx(2) });
        let s = step(
            s,
            MintEvent::ReceiptFailed { error: ChainError::Rejected { reason: "nonce too low".into() } },
        );
        assert_eq!(s.name(), "Unresolved");
        let s = step(s, MintEvent::Confirmed { receipt: receipt(1, 5) });
        assert_eq!(s.name(), "Confirmed");
    }

    #[test]
    fn test_rejected_submission_fails_at_once() {
        let rejected = ChainError::Rejected { reason: "revert".into() };
        let s = step(built(), MintEvent::SubmitFailed { error: rejected });
        assert!(matches!(s, MintState::Failed(Failure::Rejected { .. })));
    }

    #[test]
    fn test_submit_failure_counts_as_attempt() {
        let transport = ChainError::Transport { message: "reset".into() };
        let s = step(built(), MintEvent::SubmitFailed { error: transport.clone() });
        assert_eq!(s.attempts(), 1);
        let s = step(s, MintEvent::SubmitFailed { error: transport.clone() });
        let s = step(s, MintEvent::SubmitFailed { error: transport });
        assert!(matches!(s, MintState::Failed(Failure::RetriesExhausted { .. })));
    }

    #[test]
    fn test_checkpoint_must_match_receipt() {
        let s = step(built(), MintEvent::Submitted { tx_hash: tx(1) });
        let s = step(s, MintEvent::Confirmed { receipt: receipt(1, 7) });
        let wrong = CheckpointRecord {
            token_id: TokenId(8),
            tx_hash: tx_hash_hex(&tx(1)),
            artifact_url: String::new(),
        };
        assert!(transition(s, MintEvent::Checkpointed { record: wrong }, MAX).is_err());
    }

    #[test]
    fn test_out_of_order_events() {
        assert!(transition(
            MintState::Pending,
            MintEvent::Submitted { tx_hash: tx(1) },
            MAX
        )
        .is_err());
        assert!(transition(built(), MintEvent::ReceiptFailed { error: timeout(1) }, MAX).is_err());
    }

    #[derive(Debug, Clone)]
    enum Step {
        Submit(u8),
        SubmitFail,
        Timeout,
        Reject,
        Confirm(u8),
        NotIncluded,
        LookupFail,
        Abort,
    }

    fn steps() -> impl Strategy<Value = Vec<Step>> {
        prop::collection::vec(
            prop_oneof![
                any::<u8>().prop_map(Step::Submit),
                Just(Step::SubmitFail),
                Just(Step::Timeout),
                Just(Step::Reject),
                any::<u8>().prop_map(Step::Confirm),
                Just(Step::NotIncluded),
                Just(Step::LookupFail),
                Just(Step::Abort),
            ],
            0..24,
        )
    }

    fn to_event(step: &Step) -> MintEvent {
        match step {
            Step::Submit(n) => MintEvent::Submitted { tx_hash: tx(*n) },
            Step::SubmitFail => MintEvent::SubmitFailed {
                error: ChainError::Transport { message: "reset".into() },
            },
            Step::Timeout => MintEvent::ReceiptFailed { error: timeout(0) },
            Step::Reject => MintEvent::ReceiptFailed {
                error: ChainError::Rejected { reason: "revert".into() },
            },
            Step::Confirm(n) => MintEvent::Confirmed { receipt: receipt(*n, u64::from(*n)) },
            Step::NotIncluded => MintEvent::NotIncluded,
            Step::LookupFail => MintEvent::LookupFailed {
                error: ChainError::Transport { message: "reset".into() },
            },
            Step::Abort => MintEvent::Abort { reason: "stop".into() },
        }
    }

    proptest! {
        #[test]
        fn prop_attempts_never_exceed_max(seq in steps(), max in 1u32..5) {
            let mut state = built();
            for s in &seq {
                match transition(state.clone(), to_event(s), max) {
                    Ok(next) => state = next,
                    Err(_) => continue,
                }
                prop_assert!(state.attempts() <= max);
            }
        }

        #[test]
        fn prop_terminal_states_absorb(seq in steps()) {
            let mut state = built();
            for s in &seq {
                let was_terminal = state.is_terminal();
                let result = transition(state.clone(), to_event(s), MAX);
                if was_terminal {
                    prop_assert!(result.is_err());
                }
                if let Ok(next) = result {
                    state = next;
                }
            }
        }

        #[test]
        fn prop_confirmed_only_for_sent_transactions(seq in steps()) {
            let mut state = built();
            let mut sent = Vec::new();
            for s in &seq {
                if let Step::Submit(n) = s {
                    if matches!(state, MintState::MetadataBuilt { .. }) {
                        sent.push(tx(*n));
                    }
                }
                if let Ok(next) = transition(state.clone(), to_event(s), MAX) {
                    state = next;
                }
                if let MintState::Confirmed { receipt, .. } = &state {
                    prop_assert!(sent.contains(&receipt.tx_hash));
                }
            }
        }

        #[test]
        fn prop_sent_transactions_resolved_before_failing(seq in steps(), max in 1u32..5) {
            let mut state = built();
            for s in &seq {
                let before = state.clone();
                if let Ok(next) = transition(state.clone(), to_event(s), max) {
                    state = next;
                }
                // Failing with transactions out must go through a lookup first
                if let (MintState::Submitted { .. }, MintState::Failed(failure)) = (&before, &state) {
                    let is_aborted = matches!(failure, Failure::Aborted { .. });
                    prop_assert!(is_aborted);
                }
            }
        }
    }
}
