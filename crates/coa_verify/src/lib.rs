//! COA Forge Verify
//!
//! Audits minted certificates against the chain. Verification is fail-soft:
//! every checkpointed token is read and checked, and mismatches become
//! findings in a [`VerificationReport`] instead of errors.
//!
//! Also collects the source attestation: the content hashes of an earlier
//! set of tokens, aggregated into one hash that later certificates embed.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod report;
pub mod source;
pub mod verifier;

pub use error::{SourceFailure, VerifyError, VerifyResult};
pub use report::{Finding, FindingKind, VerificationReport};
pub use source::collect_source_attestation;
pub use verifier::ChainVerifier;
