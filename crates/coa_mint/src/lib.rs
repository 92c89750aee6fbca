//! COA Forge Mint
//!
//! Drives a manifest of certificates to on-chain tokens:
//! upload artifact, build metadata, submit, confirm, checkpoint. Each
//! certificate moves through an explicit state machine ([`MintState`]) whose
//! transition function is pure; the orchestrator only performs the I/O that
//! produces the next [`MintEvent`].
//!
//! Runs are resumable. Anything already in the checkpoint is skipped, and a
//! checkpoint entry is written before the next submission starts.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod log;
pub mod manifest;
pub mod orchestrator;
pub mod prepare;
pub mod render;
pub mod state;

pub use config::MintConfig;
pub use error::{MintError, MintResult};
pub use log::{MintLog, MintLogEntry};
pub use manifest::{Manifest, ManifestEntry};
pub use orchestrator::{BatchMintOrchestrator, MintSummary};
pub use prepare::prepare_manifest;
pub use render::{ArtifactRenderer, TemplateRenderer, TOKEN_ID_PLACEHOLDER};
pub use state::{transition, Failure, MintEvent, MintState, TransitionError};
