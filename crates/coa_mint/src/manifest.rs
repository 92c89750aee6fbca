//! Mint manifest.
//!
//! The manifest is the closed, ordered list of certificates for a run. File
//! names inside it are relative to the manifest's own directory: documents
//! live under `publicJsonDir`, artifact templates under `svgDir`.

use crate::error::{MintError, MintResult};
use coa_core::{identifier_of, ContentHashEngine, Digest, GveCode};
use coa_storage::CheckpointStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

fn default_svg_dir() -> String {
    "svg".to_string()
}

fn default_public_json_dir() -> String {
    "publicJson".to_string()
}

/// One certificate to mint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Certificate identifier; checkpoint key
    pub identifier: String,
    /// Serial number, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    /// Lot number, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lot_number: Option<String>,
    /// Content hash of the document
    pub content_hash: Digest,
    /// GVE code of the content hash
    pub gve_code: GveCode,
    /// Artifact template file name
    pub svg_file: String,
    /// Certificate document file name
    pub public_json_file: String,
}

/// Ordered certificate list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Project name
    #[serde(default)]
    pub project: String,
    /// When the manifest was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    /// Directory of artifact templates, relative to the manifest
    #[serde(default = "default_svg_dir")]
    pub svg_dir: String,
    /// Directory of certificate documents, relative to the manifest
    #[serde(default = "default_public_json_dir")]
    pub public_json_dir: String,
    /// Certificates in mint order
    pub entries: Vec<ManifestEntry>,
    /// Directory the manifest was loaded from
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Manifest {
    /// Create a manifest rooted at `base_dir`
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, entries: Vec<ManifestEntry>) -> Self {
        Self {
            project: String::new(),
            generated_at: None,
            svg_dir: default_svg_dir(),
            public_json_dir: default_public_json_dir(),
            entries,
            base_dir: base_dir.into(),
        }
    }

    /// Set the project name
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Load and validate a manifest file
    ///
    /// # Errors
    ///
    /// Returns error if the file is unreadable, malformed, or fails
    /// [`Manifest::validate`]
    pub fn load(path: impl AsRef<Path>) -> MintResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| MintError::io(path, e))?;
        let mut manifest: Self = serde_json::from_str(&json)?;
        manifest.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        manifest.validate()?;
        Ok(manifest)
    }

    /// Write the manifest back as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save(&self, path: impl AsRef<Path>) -> MintResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| MintError::io(path, e))
    }

    /// Identifiers must be unique and each GVE code must belong to its hash
    ///
    /// # Errors
    ///
    /// Returns [`MintError::Manifest`] on the first violation
    pub fn validate(&self) -> MintResult<()> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.identifier.as_str()) {
                return Err(MintError::Manifest {
                    reason: format!("duplicate identifier {}", entry.identifier),
                });
            }
            if entry.content_hash.gve() != entry.gve_code {
                return Err(MintError::Manifest {
                    reason: format!(
                        "{}: GVE code {} does not belong to {}",
                        entry.identifier, entry.gve_code, entry.content_hash
                    ),
                });
            }
        }
        Ok(())
    }

    /// Number of certificates
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the manifest lists nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry
    #[must_use]
    pub fn entry(&self, identifier: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.identifier == identifier)
    }

    /// Entries without a checkpoint record, in manifest order
    #[must_use]
    pub fn pending<'a>(&'a self, checkpoint: &dyn CheckpointStore) -> Vec<&'a ManifestEntry> {
        self.entries
            .iter()
            .filter(|e| !checkpoint.contains(&e.identifier))
            .collect()
    }

    /// Directory the manifest lives in
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of an entry's artifact template
    #[must_use]
    pub fn svg_path(&self, entry: &ManifestEntry) -> PathBuf {
        self.base_dir.join(&self.svg_dir).join(&entry.svg_file)
    }

    /// Path of an entry's certificate document
    #[must_use]
    pub fn document_path(&self, entry: &ManifestEntry) -> PathBuf {
        self.base_dir.join(&self.public_json_dir).join(&entry.public_json_file)
    }

    /// Read an entry's certificate document
    ///
    /// # Errors
    ///
    /// Returns error if the file is unreadable or not JSON
    pub fn load_document(&self, entry: &ManifestEntry) -> MintResult<Value> {
        let path = self.document_path(entry);
        let json = std::fs::read_to_string(&path).map_err(|e| MintError::io(&path, e))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Write an entry's certificate document
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn write_document(&self, entry: &ManifestEntry, document: &Value) -> MintResult<()> {
        let path = self.document_path(entry);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MintError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(document)?;
        std::fs::write(&path, json).map_err(|e| MintError::io(&path, e))
    }

    /// Recompute every document's content hash (twice, as a determinism
    /// check) and compare it with the manifest before anything is uploaded.
    ///
    /// # Errors
    ///
    /// Returns [`MintError::Preflight`] for the first certificate whose
    /// document, hash or GVE code disagree with the manifest
    pub fn preflight(&self) -> MintResult<()> {
        let engine = ContentHashEngine::new();
        for entry in &self.entries {
            let document = self.load_document(entry)?;
            let fail = |reason: String| MintError::Preflight {
                identifier: entry.identifier.clone(),
                reason,
            };

            if let Some(id) = identifier_of(&document) {
                if id != entry.identifier {
                    return Err(fail(format!("document identifier is {}", id)));
                }
            }

            let actual = engine.compute_checked(&entry.identifier, &document)?;
            if actual != entry.content_hash {
                return Err(fail(format!(
                    "content hash {} recomputed as {}",
                    entry.content_hash, actual
                )));
            }
            if actual.gve() != entry.gve_code {
                return Err(fail(format!("GVE code {} expected {}", entry.gve_code, actual.gve())));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Manifests on disk for tests.

    use super::*;
    use coa_core::seal;
    use serde_json::json;

    /// Write `count` sealed documents and templates under `dir`
    pub(crate) fn write_manifest(dir: &Path, count: usize) -> Manifest {
        let mut manifest = Manifest::new(dir, Vec::new()).with_project("Test Lot");
        for i in 1..=count {
            let identifier = format!("BAG-{:03}", i);
            let mut document = json!({
                "schema": {"id": "urn:blockticity:coa:public:v1"},
                "identifier": {"label": "Bag Serial", "value": identifier},
                "product": {"weightKg": 69, "grade": "Specialty"},
            });
            let (hash, gve) = seal(&mut document, chrono::Utc::now()).unwrap();
            let entry = ManifestEntry {
                identifier: identifier.clone(),
                serial: Some(format!("S{}", i)),
                lot_number: None,
                content_hash: hash,
                gve_code: gve,
                svg_file: format!("{}.svg", identifier),
                public_json_file: format!("{}.json", identifier),
            };
            manifest.write_document(&entry, &document).unwrap();
            let svg = manifest.svg_path(&entry);
            std::fs::create_dir_all(svg.parent().unwrap()).unwrap();
            std::fs::write(
                &svg,
                format!("<svg><text>{}</text><text>{{{{TOKEN_ID}}}}</text></svg>", identifier),
            )
            .unwrap();
            manifest.entries.push(entry);
        }
        manifest.save(dir.join("manifest.json")).unwrap();
        manifest
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::write_manifest;
    use super::*;
    use coa_core::TokenId;
    use coa_storage::{CheckpointRecord, JsonCheckpointStore};

    #[test]
    fn test_load_resolves_paths() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), 2);

        let manifest = Manifest::load(dir.path().join("manifest.json")).unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.project, "Test Lot");
        let entry = &manifest.entries[0];
        assert_eq!(manifest.svg_path(entry), dir.path().join("svg").join("BAG-001.svg"));
        assert!(manifest.load_document(entry).is_ok());
    }

    #[test]
    fn test_preflight_passes_on_sealed_documents() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_manifest(dir.path(), 3);
        manifest.preflight().unwrap();
    }

    #[test]
    fn test_preflight_catches_edited_document() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_manifest(dir.path(), 2);
        let entry = &manifest.entries[1];
        let mut document = manifest.load_document(entry).unwrap();
        document["product"]["weightKg"] = serde_json::json!(70);
        manifest.write_document(entry, &document).unwrap();

        match manifest.preflight() {
            Err(MintError::Preflight { identifier, .. }) => assert_eq!(identifier, "BAG-002"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_validate_duplicates_and_gve() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = write_manifest(dir.path(), 2);
        manifest.entries[1].identifier = "BAG-001".to_string();
        assert!(manifest.validate().is_err());

        let mut manifest = write_manifest(dir.path(), 2);
        manifest.entries[0].gve_code = manifest.entries[1].gve_code.clone();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_pending_skips_checkpointed() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_manifest(dir.path(), 3);
        let mut store = JsonCheckpointStore::open(dir.path().join("cp.json")).unwrap();
        store
            .record(
                "BAG-002",
                CheckpointRecord {
                    token_id: TokenId(2),
                    tx_hash: "0x02".into(),
                    artifact_url: "u".into(),
                },
            )
            .unwrap();

        let pending: Vec<&str> = manifest
            .pending(&store)
            .iter()
            .map(|e| e.identifier.as_str())
            .collect();
        assert_eq!(pending, vec!["BAG-001", "BAG-003"]);
    }
}
