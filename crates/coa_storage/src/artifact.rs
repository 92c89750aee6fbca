//! Certificate artifact storage.
//!
//! Artifacts (rendered certificate images) are uploaded by a deterministic
//! key derived from the certificate's GVE code and content hash, so writing
//! the same certificate again replaces the object instead of adding one.

use async_trait::async_trait;
use bytes::Bytes;
use coa_core::{Digest, GveCode};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Artifact result type
pub type ArtifactResult<T> = Result<T, ArtifactError>;

/// Artifact store error
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Key would escape the store root
    #[error("Invalid artifact key: {key}")]
    InvalidKey {
        /// Offending key
        key: String,
    },

    /// Nothing stored under the key
    #[error("Artifact not found: {key}")]
    NotFound {
        /// Missing key
        key: String,
    },

    /// IO error
    #[error("Artifact IO error at {path}: {source}")]
    Io {
        /// File involved
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Upload refused by the backend
    #[error("Artifact upload failed for {key}: {reason}")]
    Upload {
        /// Key being written
        key: String,
        /// Backend message
        reason: String,
    },
}

impl ArtifactError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Storage key for a certificate artifact: `{gve}/coa-{first 16 hex digits}.svg`
#[must_use]
pub fn artifact_key(gve: &GveCode, content_hash: &Digest) -> String {
    format!("{}/coa-{}.svg", gve, content_hash.short(16))
}

/// Artifact bytes plus content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Raw bytes
    pub bytes: Bytes,
    /// MIME type
    pub content_type: String,
}

impl Artifact {
    /// Default MIME type for rendered certificates
    pub const SVG: &'static str = "image/svg+xml";

    /// Create an artifact
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    /// Create an SVG artifact
    #[must_use]
    pub fn svg(bytes: impl Into<Bytes>) -> Self {
        Self::new(bytes, Self::SVG)
    }

    /// Size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the artifact is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Where an artifact ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Public URL
    pub url: String,
    /// Storage key
    pub key: String,
    /// Bytes written
    pub size: usize,
}

/// Upload-by-key object storage
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store an artifact under `key`, replacing anything already there
    ///
    /// # Errors
    ///
    /// Returns error if the key is invalid or the write fails
    async fn put(&self, key: &str, artifact: Artifact) -> ArtifactResult<StoredArtifact>;

    /// Fetch an artifact
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::NotFound`] if nothing is stored under `key`
    async fn get(&self, key: &str) -> ArtifactResult<Artifact>;

    /// Public URL an artifact under `key` is served from
    fn url_for(&self, key: &str) -> String;
}

fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

/// Only plain relative paths are accepted as keys
fn validate_key(key: &str) -> ArtifactResult<()> {
    let path = Path::new(key);
    let ok = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(())
    } else {
        Err(ArtifactError::InvalidKey {
            key: key.to_string(),
        })
    }
}

/// Artifacts written under a local directory that is served at a public base URL
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    /// Directory objects are written to
    root_dir: PathBuf,
    /// URL prefix the directory is served from
    public_base_url: String,
}

impl FsArtifactStore {
    /// Create a store rooted at `root_dir`
    #[must_use]
    pub fn new(root_dir: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root_dir: root_dir.into(),
            public_base_url: public_base_url.into(),
        }
    }

    /// Root directory
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, key: &str, artifact: Artifact) -> ArtifactResult<StoredArtifact> {
        validate_key(key)?;
        let target = self.root_dir.join(key);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ArtifactError::io(parent, e))?;
        }

        // Write-then-rename so a concurrent reader never sees a partial object
        let mut tmp = target.clone().into_os_string();
        tmp.push(".part");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &artifact.bytes)
            .await
            .map_err(|e| ArtifactError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &target)
            .await
            .map_err(|e| ArtifactError::io(&target, e))?;

        debug!(key, size = artifact.len(), "artifact written");
        Ok(StoredArtifact {
            url: self.url_for(key),
            key: key.to_string(),
            size: artifact.len(),
        })
    }

    async fn get(&self, key: &str) -> ArtifactResult<Artifact> {
        validate_key(key)?;
        let path = self.root_dir.join(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Artifact::svg(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ArtifactError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(ArtifactError::io(&path, e)),
        }
    }

    fn url_for(&self, key: &str) -> String {
        join_url(&self.public_base_url, key)
    }
}

/// In-memory artifact store
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    /// URL prefix
    base_url: String,
    /// Stored objects
    objects: RwLock<HashMap<String, Artifact>>,
    /// Number of `put` calls that succeeded
    puts: AtomicUsize,
}

impl MemoryArtifactStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default().with_base_url("memory://artifacts")
    }

    /// Set the URL prefix
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Number of distinct keys stored
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Check if nothing is stored
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Total successful uploads, including overwrites
    #[must_use]
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, key: &str, artifact: Artifact) -> ArtifactResult<StoredArtifact> {
        validate_key(key)?;
        let size = artifact.len();
        self.objects.write().await.insert(key.to_string(), artifact);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(StoredArtifact {
            url: self.url_for(key),
            key: key.to_string(),
            size,
        })
    }

    async fn get(&self, key: &str) -> ArtifactResult<Artifact> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| ArtifactError::NotFound {
                key: key.to_string(),
            })
    }

    fn url_for(&self, key: &str) -> String {
        join_url(&self.base_url, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash() -> Digest {
        Digest::parse(&format!("0xa020348f{}", "0".repeat(56))).unwrap()
    }

    #[test]
    fn test_artifact_key_scheme() {
        let digest = hash();
        assert_eq!(
            artifact_key(&digest.gve(), &digest),
            "GVE-a020348f/coa-a020348f00000000.svg"
        );
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("GVE-1/coa-1.svg").is_ok());
        assert!(validate_key("../escape.svg").is_err());
        assert!(validate_key("/abs.svg").is_err());
        assert!(validate_key("").is_err());
    }

    #[tokio::test]
    async fn test_fs_put_overwrites_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path(), "https://cdn.example/coa/");

        let first = store.put("GVE-1/coa-1.svg", Artifact::svg("<svg>1</svg>")).await.unwrap();
        let second = store.put("GVE-1/coa-1.svg", Artifact::svg("<svg>two</svg>")).await.unwrap();

        assert_eq!(first.url, "https://cdn.example/coa/GVE-1/coa-1.svg");
        assert_eq!(first.url, second.url);
        assert_eq!(
            store.get("GVE-1/coa-1.svg").await.unwrap().bytes,
            Bytes::from("<svg>two</svg>")
        );
        assert!(!dir.path().join("GVE-1/coa-1.svg.part").exists());
    }

    #[tokio::test]
    async fn test_fs_get_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path(), "https://cdn.example");
        assert!(matches!(
            store.get("nope.svg").await,
            Err(ArtifactError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_memory_store_counts_puts() {
        let store = MemoryArtifactStore::new();
        store.put("a.svg", Artifact::svg("a")).await.unwrap();
        store.put("a.svg", Artifact::svg("b")).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.put_count(), 2);
        assert_eq!(store.url_for("a.svg"), "memory://artifacts/a.svg");
    }
}
