//! COA Forge Core Types
//!
//! This crate contains pure types and logic with no I/O: canonical JSON,
//! content hashing, GVE codes and attestation aggregation. Nothing here
//! suspends or touches the network.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attestation;
pub mod canonical;
pub mod content;
pub mod document;
pub mod error;
pub mod hash;
pub mod token;

// Re-exports
pub use attestation::{compute_attestation_hash, AttestationAggregator, AttestationRecord};
pub use canonical::{canonicalize, canonicalize_to_string, MAX_DEPTH};
pub use content::{compute_content_hash, hashable_view, ContentHashEngine, EXCLUDED_FIELDS};
pub use document::{
    embed_source_attestation, identifier_of, seal, ChainRef, SourceAttestation, VerificationBlock,
};
pub use error::{CoreError, CoreResult};
pub use hash::{derive_gve, Digest, GveCode};
pub use token::TokenId;
