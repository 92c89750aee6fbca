//! Artifact rendering.
//!
//! Producing the certificate image is outside this crate; what the
//! orchestrator needs is the bytes to upload, before minting (no token id
//! yet) and again afterwards (token id known).

use crate::error::{MintError, MintResult};
use crate::manifest::{Manifest, ManifestEntry};
use async_trait::async_trait;
use coa_core::TokenId;
use coa_storage::Artifact;

/// Marker replaced by the token id in artifact templates
pub const TOKEN_ID_PLACEHOLDER: &str = "{{TOKEN_ID}}";

/// Text shown in place of the token id before minting
const UNMINTED: &str = "Pending";

/// Produces the artifact for a certificate
#[async_trait]
pub trait ArtifactRenderer: Send + Sync {
    /// Render the artifact, embedding `token_id` when it is known
    async fn render(
        &self,
        manifest: &Manifest,
        entry: &ManifestEntry,
        token_id: Option<TokenId>,
    ) -> MintResult<Artifact>;
}

/// Reads each entry's pre-rendered template and fills in the token id
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    content_type: String,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new(Artifact::SVG)
    }
}

impl TemplateRenderer {
    /// Create a renderer producing `content_type` artifacts
    #[must_use]
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
        }
    }

    /// Content type of rendered artifacts
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

#[async_trait]
impl ArtifactRenderer for TemplateRenderer {
    async fn render(
        &self,
        manifest: &Manifest,
        entry: &ManifestEntry,
        token_id: Option<TokenId>,
    ) -> MintResult<Artifact> {
        let path = manifest.svg_path(entry);
        let template = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| MintError::Render {
                identifier: entry.identifier.clone(),
                reason: format!("{}: {}", path.display(), e),
            })?;

        let label = token_id.map_or_else(|| UNMINTED.to_string(), |id| format!("#{}", id));
        let rendered = template.replace(TOKEN_ID_PLACEHOLDER, &label);
        Ok(Artifact::new(rendered.into_bytes(), self.content_type.clone()))
    }
}
