//! On-chain token identifiers.

use crate::error::CoreError;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// ERC-721 token id.
///
/// Serialized as a decimal string, which is how checkpoint and log files
/// store it; numbers are accepted when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub u64);

impl TokenId {
    /// Get the raw value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .trim_start_matches('#')
            .parse()
            .map(Self)
            .map_err(|_| CoreError::InvalidDocument {
                reason: format!("invalid token id: {}", s),
            })
    }
}

impl From<u64> for TokenId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl Serialize for TokenId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TokenId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TokenIdVisitor;

        impl Visitor<'_> for TokenIdVisitor {
            type Value = TokenId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a token id as a decimal string or integer")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<TokenId, E> {
                Ok(TokenId(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<TokenId, E> {
                u64::try_from(v)
                    .map(TokenId)
                    .map_err(|_| E::custom(format!("negative token id: {}", v)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<TokenId, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(TokenIdVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_as_string() {
        assert_eq!(serde_json::to_string(&TokenId(351)).unwrap(), "\"351\"");
    }

    #[test]
    fn test_deserialize_string_or_number() {
        let a: TokenId = serde_json::from_str("\"42\"").unwrap();
        let b: TokenId = serde_json::from_str("42").unwrap();
        assert_eq!(a, b);
        assert!(serde_json::from_str::<TokenId>("-1").is_err());
        assert!(serde_json::from_str::<TokenId>("\"abc\"").is_err());
    }

    #[test]
    fn test_from_str_accepts_hash_prefix() {
        assert_eq!("#17".parse::<TokenId>().unwrap(), TokenId(17));
    }
}
