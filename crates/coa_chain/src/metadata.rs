//! Token metadata and the self-contained `tokenURI` encoding.
//!
//! Metadata is serialized to JSON, base64 encoded and wrapped in a
//! `data:application/json;base64,` URI, so reading a token back needs no
//! fetch beyond the `tokenURI` call itself.

use crate::error::{ChainError, ChainResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use coa_core::{Digest, GveCode, SourceAttestation, VerificationBlock};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix of every token URI
pub const DATA_URI_PREFIX: &str = "data:application/json;base64,";

/// Attribute names
const ISSUER: &str = "Issuer";
const GVE_CODE: &str = "GVE Code";
const CONTENT_HASH: &str = "Content Hash";
const STANDARD_TRAIT: &str = "Standard";
const NETWORK: &str = "Network";

/// Field the certificate document is embedded under
const DOCUMENT_FIELD: &str = "blockticity";

/// Static parts of token metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataConfig {
    /// Product name shown in the token name
    pub product_name: String,
    /// Issuing organisation
    pub issuer_name: String,
    /// Certification standard
    pub standard: String,
    /// Network name shown as an attribute
    pub network: String,
    /// Base of the public verification URL; the content hash is appended
    pub external_url_base: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            product_name: "Certificate".to_string(),
            issuer_name: String::new(),
            standard: "ASTM D8558".to_string(),
            network: String::new(),
            external_url_base: "https://app.blockticity.ai".to_string(),
        }
    }
}

/// Marketplace-style trait entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Trait name
    pub trait_type: String,
    /// Trait value
    pub value: String,
}

impl Attribute {
    fn new(trait_type: &str, value: impl Into<String>) -> Self {
        Self {
            trait_type: trait_type.to_string(),
            value: value.into(),
        }
    }
}

/// Metadata stored on chain for one certificate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    /// Display name
    pub name: String,
    /// Display description
    #[serde(default)]
    pub description: String,
    /// Artifact URL
    #[serde(default)]
    pub image: String,
    /// Verification page
    #[serde(default)]
    pub external_url: String,
    /// Traits
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    /// The full certificate document
    #[serde(default)]
    pub blockticity: Value,
}

impl TokenMetadata {
    /// Build metadata embedding `document`
    #[must_use]
    pub fn build(
        document: &Value,
        content_hash: &Digest,
        gve: &GveCode,
        image_url: &str,
        config: &MetadataConfig,
    ) -> Self {
        let base = config.external_url_base.trim_end_matches('/');
        Self {
            name: format!("COA: {}", config.product_name),
            description: format!(
                "Certificate of Authenticity issued by {}. GVE: {}. Verify at {}",
                config.issuer_name, gve, base
            ),
            image: image_url.to_string(),
            external_url: format!("{}/{}", base, content_hash),
            attributes: vec![
                Attribute::new(ISSUER, config.issuer_name.clone()),
                Attribute::new(GVE_CODE, gve.to_string()),
                Attribute::new(CONTENT_HASH, content_hash.to_string()),
                Attribute::new(STANDARD_TRAIT, config.standard.clone()),
                Attribute::new(NETWORK, config.network.clone()),
            ],
            blockticity: document.clone(),
        }
    }

    /// Value of a trait
    #[must_use]
    pub fn attribute(&self, trait_type: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.trait_type == trait_type)
            .map(|a| a.value.as_str())
    }

    /// Embedded certificate document
    #[must_use]
    pub fn document(&self) -> &Value {
        &self.blockticity
    }

    /// Content hash as recorded in the metadata.
    ///
    /// Prefers the document's own `verification.contentHash` and falls back
    /// to the `Content Hash` attribute.
    #[must_use]
    pub fn content_hash(&self) -> Option<&str> {
        self.blockticity
            .get(VerificationBlock::FIELD)
            .and_then(|v| v.get("contentHash"))
            .and_then(Value::as_str)
            .or_else(|| self.attribute(CONTENT_HASH))
    }

    /// GVE code attribute
    #[must_use]
    pub fn gve_code(&self) -> Option<&str> {
        self.attribute(GVE_CODE)
    }

    /// `sourceAttestation.attestationHash` of the embedded document
    #[must_use]
    pub fn attestation_hash(&self) -> Option<&str> {
        self.blockticity
            .get(SourceAttestation::FIELD)
            .and_then(|v| v.get("attestationHash"))
            .and_then(Value::as_str)
    }

    /// Encode as a token URI
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_token_uri(&self) -> ChainResult<String> {
        encode_token_uri(self)
    }

    /// Decode from a token URI
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Decode`] on a foreign prefix, invalid base64
    /// or invalid JSON
    pub fn from_token_uri(uri: &str) -> ChainResult<Self> {
        decode_token_uri(uri)
    }
}

/// Encode metadata as `data:application/json;base64,<b64(json)>`
///
/// # Errors
///
/// Returns error if serialization fails
pub fn encode_token_uri(metadata: &TokenMetadata) -> ChainResult<String> {
    let json = serde_json::to_vec(metadata).map_err(|e| ChainError::decode(e.to_string()))?;
    Ok(format!("{}{}", DATA_URI_PREFIX, STANDARD.encode(json)))
}

/// Decode a token URI produced by [`encode_token_uri`]
///
/// # Errors
///
/// Returns [`ChainError::Decode`] on a foreign prefix, invalid base64 or
/// invalid JSON
pub fn decode_token_uri(uri: &str) -> ChainResult<TokenMetadata> {
    let payload = uri.strip_prefix(DATA_URI_PREFIX).ok_or_else(|| {
        ChainError::decode(format!(
            "token URI is not a base64 JSON data URI: {}",
            uri.chars().take(40).collect::<String>()
        ))
    })?;
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| ChainError::decode(format!("invalid base64: {}", e)))?;
    serde_json::from_slice(&bytes).map_err(|e| ChainError::decode(format!("invalid metadata JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use coa_core::seal;
    use serde_json::json;

    fn config() -> MetadataConfig {
        MetadataConfig {
            product_name: "Green Coffee".to_string(),
            issuer_name: "NuCafe".to_string(),
            network: "Blockticity L1".to_string(),
            ..MetadataConfig::default()
        }
    }

    fn sealed_document() -> (Value, Digest, GveCode) {
        let mut doc = json!({
            "identifier": {"value": "BAG-001"},
            "sourceAttestation": {"attestationHash": format!("0x{}", "c".repeat(64))},
        });
        let (hash, gve) = seal(&mut doc, chrono::Utc::now()).unwrap();
        (doc, hash, gve)
    }

    #[test]
    fn test_build_attributes() {
        let (doc, hash, gve) = sealed_document();
        let meta = TokenMetadata::build(&doc, &hash, &gve, "https://cdn/x.svg", &config());

        assert_eq!(meta.name, "COA: Green Coffee");
        assert_eq!(meta.attribute("Issuer"), Some("NuCafe"));
        assert_eq!(meta.attribute("Standard"), Some("ASTM D8558"));
        assert_eq!(meta.gve_code(), Some(gve.as_str()));
        assert_eq!(meta.external_url, format!("https://app.blockticity.ai/{}", hash));
    }

    #[test]
    fn test_token_uri_reads_back() {
        let (doc, hash, gve) = sealed_document();
        let meta = TokenMetadata::build(&doc, &hash, &gve, "https://cdn/x.svg", &config());

        let uri = meta.to_token_uri().unwrap();
        assert!(uri.starts_with(DATA_URI_PREFIX));

        let decoded = TokenMetadata::from_token_uri(&uri).unwrap();
        assert_eq!(decoded.content_hash(), Some(hash.to_string().as_str()));
        assert_eq!(decoded.attestation_hash(), Some(format!("0x{}", "c".repeat(64)).as_str()));
        assert_eq!(decoded.document(), &doc);
    }

    #[test]
    fn test_content_hash_falls_back_to_attribute() {
        let (_, hash, gve) = sealed_document();
        let meta = TokenMetadata::build(&json!({}), &hash, &gve, "", &config());
        assert_eq!(meta.content_hash(), Some(hash.to_string().as_str()));
    }

    #[test]
    fn test_decode_rejects_other_schemes() {
        assert!(matches!(
            decode_token_uri("ipfs://QmSomething"),
            Err(ChainError::Decode { .. })
        ));
        assert!(decode_token_uri("data:application/json;base64,@@@").is_err());
        let not_json = format!("{}{}", DATA_URI_PREFIX, STANDARD.encode("nope"));
        assert!(decode_token_uri(&not_json).is_err());
    }
}
