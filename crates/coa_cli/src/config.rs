//! Configuration file and signing key.

use coa_chain::{parse_address, Address, ChainEndpoint, MetadataConfig};
use coa_mint::{MintConfig, TemplateRenderer};
use coa_storage::{Artifact, CheckpointBackend};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the signing key
pub const SIGNER_KEY_ENV: &str = "COA_SIGNER_KEY";

/// Chain section
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChainSection {
    /// JSON-RPC endpoint
    pub rpc_url: String,
    /// Expected chain id
    pub chain_id: u64,
    /// Certificate contract address
    pub contract: String,
    /// Human-readable network name
    pub name: String,
    /// Token recipient; the signer when absent
    pub mint_to: Option<String>,
    /// Receipt polling interval, in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for ChainSection {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            chain_id: 0,
            contract: String::new(),
            name: String::new(),
            mint_to: None,
            poll_interval_ms: 2000,
        }
    }
}

impl ChainSection {
    /// Endpoint for the chain client
    ///
    /// # Errors
    ///
    /// Returns error if the contract address is malformed
    pub fn endpoint(&self) -> Result<ChainEndpoint> {
        let contract = parse_address(&self.contract).wrap_err("chain.contract")?;
        Ok(ChainEndpoint::new(self.rpc_url.clone(), self.chain_id, contract)
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms)))
    }

    /// Configured recipient, if any
    ///
    /// # Errors
    ///
    /// Returns error if the address is malformed
    pub fn recipient(&self) -> Result<Option<Address>> {
        self.mint_to
            .as_deref()
            .map(|a| parse_address(a).wrap_err("chain.mintTo"))
            .transpose()
    }
}

/// Artifact storage section
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArtifactSection {
    /// Directory artifacts are written under
    pub root_dir: PathBuf,
    /// Public URL the directory is served from
    pub public_base_url: String,
    /// Content type of the rendered artifacts
    pub content_type: String,
}

impl Default for ArtifactSection {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("artifacts"),
            public_base_url: "http://localhost/artifacts".to_string(),
            content_type: Artifact::SVG.to_string(),
        }
    }
}

impl ArtifactSection {
    /// Renderer producing artifacts of the configured content type
    #[must_use]
    pub fn renderer(&self) -> TemplateRenderer {
        TemplateRenderer::new(self.content_type.clone())
    }
}

/// Checkpoint section
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckpointSection {
    /// Checkpoint file or database
    pub path: PathBuf,
    /// Storage backend
    pub backend: CheckpointBackend,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("checkpoint.json"),
            backend: CheckpointBackend::Json,
        }
    }
}

/// Whole configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Chain connection
    pub chain: ChainSection,
    /// Token metadata
    pub metadata: MetadataConfig,
    /// Artifact storage
    pub artifacts: ArtifactSection,
    /// Mint run settings
    pub mint: MintConfig,
    /// Checkpoint storage
    pub checkpoint: CheckpointSection,
}

impl Config {
    /// Load a configuration file. Relative paths inside it are resolved
    /// against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns error if the file is unreadable or malformed
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading config {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&json)
            .wrap_err_with(|| format!("parsing config {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.artifacts.root_dir = base.join(&config.artifacts.root_dir);
        config.checkpoint.path = base.join(&config.checkpoint.path);
        if config.metadata.network.is_empty() {
            config.metadata.network = config.chain.name.clone();
        }
        Ok(config)
    }
}

/// Read the signing key from `key_file`, or else from [`SIGNER_KEY_ENV`].
///
/// # Errors
///
/// Returns error if neither source yields a non-empty key
pub fn load_signer_key(key_file: Option<&Path>) -> Result<SecretString> {
    let key = match key_file {
        Some(path) => std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading signer key {}", path.display()))?,
        None => std::env::var(SIGNER_KEY_ENV).unwrap_or_default(),
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(eyre!(
            "no signing key: set {} or pass --signer-key-file",
            SIGNER_KEY_ENV
        ));
    }
    Ok(SecretString::from(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_defaults_and_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coa.json");
        std::fs::write(
            &path,
            r#"{
                "chain": {"rpcUrl": "https://rpc.example", "chainId": 28530,
                          "contract": "0x7e1f0000000000000000000000000000000000aa",
                          "name": "Blockticity L1"},
                "metadata": {"productName": "Specialty Coffee", "issuerName": "NUCAFE"},
                "mint": {"batchSize": 25},
                "checkpoint": {"path": "state/cp.redb", "backend": "redb"}
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.mint.batch_size, 25);
        assert_eq!(config.mint.max_attempts, 3);
        assert_eq!(config.checkpoint.backend, CheckpointBackend::Redb);
        assert_eq!(config.checkpoint.path, dir.path().join("state/cp.redb"));
        assert_eq!(config.artifacts.root_dir, dir.path().join("artifacts"));
        assert_eq!(config.artifacts.renderer().content_type(), "image/svg+xml");
        assert_eq!(config.metadata.network, "Blockticity L1");
        assert_eq!(config.metadata.standard, "ASTM D8558");

        let endpoint = config.chain.endpoint().unwrap();
        assert_eq!(endpoint.chain_id, 28530);
        assert_eq!(config.chain.recipient().unwrap(), None);
    }

    #[test]
    fn test_artifact_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coa.json");
        std::fs::write(
            &path,
            r#"{"artifacts": {"rootDir": "/srv/coa", "contentType": "image/png"}}"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.artifacts.content_type, "image/png");
        assert_eq!(config.artifacts.renderer().content_type(), "image/png");
        assert_eq!(config.artifacts.root_dir, PathBuf::from("/srv/coa"));
        assert_eq!(config.artifacts.public_base_url, "http://localhost/artifacts");
    }

    #[test]
    fn test_bad_contract_address() {
        let section = ChainSection {
            contract: "0x123".to_string(),
            ..ChainSection::default()
        };
        assert!(section.endpoint().is_err());
    }

    #[test]
    fn test_signer_key_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key");
        std::fs::write(&path, "0xabc123\n").unwrap();

        let key = load_signer_key(Some(&path)).unwrap();
        assert_eq!(key.expose_secret(), "0xabc123");

        std::fs::write(&path, "  \n").unwrap();
        assert!(load_signer_key(Some(&path)).is_err());
    }
}
