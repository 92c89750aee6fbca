//! COA Forge Storage
//!
//! Durable record of which certificates have been minted, and the object
//! store that certificate artifacts are uploaded to.
//!
//! Checkpoint writes are synchronous and complete before the caller moves
//! on; a crash at any point leaves either the previous or the next state on
//! disk, never a torn file.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod artifact;
pub mod checkpoint;
pub mod json;
pub mod kv;

pub use artifact::{
    artifact_key, Artifact, ArtifactError, ArtifactResult, ArtifactStore, FsArtifactStore,
    MemoryArtifactStore, StoredArtifact,
};
pub use checkpoint::{
    open_store, Checkpoint, CheckpointBackend, CheckpointError, CheckpointRecord,
    CheckpointResult, CheckpointStore,
};
pub use json::JsonCheckpointStore;
pub use kv::RedbCheckpointStore;
