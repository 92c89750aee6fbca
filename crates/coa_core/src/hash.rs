//! SHA-256 digests and GVE codes.
//!
//! Every hash in the system is rendered as `0x` followed by 64 lowercase hex
//! digits. GVE codes are the human-facing label derived from the first eight
//! of those digits.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

/// A SHA-256 digest (256 bits / 32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; 32]);

impl Digest {
    /// The number of bytes in a digest
    pub const LEN: usize = 32;

    /// Marker prepended to the hex rendering
    pub const PREFIX: &'static str = "0x";

    /// Compute SHA-256 of data
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Create from bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get as bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex digits without the prefix
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First `n` hex digits (clamped to 64)
    #[must_use]
    pub fn short(&self, n: usize) -> String {
        let mut hex = self.to_hex();
        hex.truncate(n.min(64));
        hex
    }

    /// Parse a `0x`-prefixed hex string (either case)
    ///
    /// # Errors
    ///
    /// Returns error if the prefix is missing, the hex is invalid, or it is
    /// not 32 bytes
    pub fn parse(s: &str) -> CoreResult<Self> {
        let digits = s.strip_prefix(Self::PREFIX).ok_or_else(|| CoreError::InvalidHash {
            reason: format!("missing {} prefix: {}", Self::PREFIX, s),
        })?;
        let bytes = hex::decode(digits).map_err(|e| CoreError::InvalidHash {
            reason: format!("invalid hex: {}", e),
        })?;
        let arr: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| CoreError::InvalidHash {
            reason: format!("invalid length: {} bytes (expected 32)", b.len()),
        })?;
        Ok(Self(arr))
    }

    /// Check if this digest matches data
    #[must_use]
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::compute(data) == *self
    }

    /// GVE code for this digest
    #[must_use]
    pub fn gve(&self) -> GveCode {
        GveCode::derive(self)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Short human-facing certificate label, e.g. `GVE-a020348f`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GveCode(String);

impl GveCode {
    /// Label prepended to the truncated digest
    pub const LABEL: &'static str = "GVE-";

    /// Number of hex digits taken from the digest
    pub const WIDTH: usize = 8;

    /// Derive from a digest
    #[must_use]
    pub fn derive(digest: &Digest) -> Self {
        Self(format!("{}{}", Self::LABEL, digest.short(Self::WIDTH)))
    }

    /// Get the code as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GveCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive a GVE code from a hash string as stored in manifests or on chain.
///
/// Works on the string as-is, so `derive_gve(h) == derive_gve(h)` for any
/// two equal strings, including ones this crate did not produce.
///
/// # Errors
///
/// Returns [`CoreError::InvalidHash`] if the prefix is missing or fewer than
/// eight hex digits follow it
pub fn derive_gve(hash: &str) -> CoreResult<GveCode> {
    let digits = hash.strip_prefix(Digest::PREFIX).ok_or_else(|| CoreError::InvalidHash {
        reason: format!("missing {} prefix: {}", Digest::PREFIX, hash),
    })?;
    let head = digits.get(..GveCode::WIDTH).ok_or_else(|| CoreError::InvalidHash {
        reason: format!("need {} hex digits, got {}", GveCode::WIDTH, digits.len()),
    })?;
    if !head.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CoreError::InvalidHash {
            reason: format!("non-hex digits in {}", head),
        });
    }
    Ok(GveCode(format!("{}{}", GveCode::LABEL, head)))
}
