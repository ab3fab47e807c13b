//! # Assets
//!
//! A bank holds exactly one kind of value. [`AssetClass`] is the coarse tag
//! that selects which of a vault's two bank collections an operation
//! targets; [`Asset`] is the precise denomination the custody ledger moves,
//! carrying the token identity for token-denominated value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::{Identity, IdentityError};

/// Error returned when parsing an [`AssetClass`] or [`Asset`] from text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseAssetError {
    /// Not one of the recognised asset tags.
    #[error("unknown asset '{0}', expected 'base' or 'token[:<hex>]'")]
    Unknown(String),

    /// The token part of `token:<hex>` was not a valid identity.
    #[error("invalid token identity: {0}")]
    Token(#[from] IdentityError),
}

/// Which collection of banks an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    /// The network's base currency.
    Base,
    /// A fungible token identified per bank.
    Token,
}

impl AssetClass {
    /// Lowercase tag used on the wire and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Base => "base",
            AssetClass::Token => "token",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetClass {
    type Err = ParseAssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" => Ok(AssetClass::Base),
            "token" => Ok(AssetClass::Token),
            _ => Err(ParseAssetError::Unknown(s.to_string())),
        }
    }
}

/// A concrete denomination held by the custody ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "class", content = "token", rename_all = "snake_case")]
pub enum Asset {
    /// The base currency.
    Base,
    /// The token with the given identity.
    Token(Identity),
}

impl Asset {
    /// The class this asset belongs to.
    pub fn class(&self) -> AssetClass {
        match self {
            Asset::Base => AssetClass::Base,
            Asset::Token(_) => AssetClass::Token,
        }
    }

    /// The token identity, if this is a token.
    pub fn token(&self) -> Option<Identity> {
        match self {
            Asset::Base => None,
            Asset::Token(id) => Some(*id),
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Base => f.write_str("base"),
            Asset::Token(id) => write!(f, "token:{}", id),
        }
    }
}

impl FromStr for Asset {
    type Err = ParseAssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("base") {
            return Ok(Asset::Base);
        }
        match s.split_once(':') {
            Some((tag, hex)) if tag.eq_ignore_ascii_case("token") => {
                Ok(Asset::Token(Identity::from_hex(hex)?))
            }
            _ => Err(ParseAssetError::Unknown(s.to_string())),
        }
    }
}

/// Serde adapter for `HashMap<Asset, V>` that writes asset keys as strings,
/// since JSON object keys cannot hold tagged enums.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Holdings {
///     #[serde(with = "crate::asset::asset_map")]
///     balances: HashMap<Asset, u64>,
/// }
/// ```
pub mod asset_map {
    use super::Asset;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;

    pub fn serialize<V, S>(map: &HashMap<Asset, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        V: Serialize,
        S: Serializer,
    {
        use serde::ser::SerializeMap;
        let mut ser_map = serializer.serialize_map(Some(map.len()))?;
        for (key, value) in map {
            ser_map.serialize_entry(&key.to_string(), value)?;
        }
        ser_map.end()
    }

    pub fn deserialize<'de, V, D>(deserializer: D) -> Result<HashMap<Asset, V>, D::Error>
    where
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let string_map: HashMap<String, V> = HashMap::deserialize(deserializer)?;
        string_map
            .into_iter()
            .map(|(key, value)| {
                key.parse::<Asset>()
                    .map(|asset| (asset, value))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}
