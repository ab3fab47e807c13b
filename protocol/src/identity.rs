//! # Identities
//!
//! An [`Identity`] is an opaque 32-byte principal: a saver, the registry
//! admin, a token, or a vault's own custody address. Authentication happens
//! upstream; by the time an identity reaches the engine it is trusted.
//!
//! Identities travel as lowercase hex. Two derivations are provided:
//!
//! - [`Identity::derive`] hashes a human-readable label, which is how devnet
//!   users and tests name principals (`"alice"`, `"admin"`).
//! - [`Identity::vault_address`] computes the custody address of a vault from
//!   the registry admin, the owner and the vault's directory position, so the
//!   same registry always hands out the same addresses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::config::{IDENTITY_DOMAIN, VAULT_ADDRESS_DOMAIN};

/// Errors produced when parsing an identity from text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IdentityError {
    /// The input was not valid hex.
    #[error("invalid identity hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// The input decoded to the wrong number of bytes.
    #[error("invalid identity length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// A 32-byte opaque principal reference.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity([u8; 32]);

impl Identity {
    /// Returns the identity as 64 lowercase hex characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a hex identity. A leading `0x` is accepted.
    pub fn from_hex(s: &str) -> Result<Self, IdentityError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| IdentityError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Derives an identity from a label: `BLAKE3(IDENTITY_DOMAIN || label)`.
    pub fn derive(label: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(IDENTITY_DOMAIN);
        hasher.update(label.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Computes the custody address of the vault at `position` in a
    /// registry administered by `admin`, owned by `owner`.
    pub fn vault_address(admin: &Identity, owner: &Identity, position: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(VAULT_ADDRESS_DOMAIN);
        hasher.update(&admin.0);
        hasher.update(&owner.0);
        hasher.update(&position.to_be_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// First eight hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({}..)", self.short())
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic_and_label_sensitive() {
        assert_eq!(Identity::derive("alice"), Identity::derive("alice"));
        assert_ne!(Identity::derive("alice"), Identity::derive("bob"));
    }

    #[test]
    fn hex_roundtrip_accepts_0x_prefix() {
        let id = Identity::derive("carol");
        assert_eq!(Identity::from_hex(&id.to_hex()).unwrap(), id);
        assert_eq!(Identity::from_hex(&format!("0x{}", id.to_hex())).unwrap(), id);
    }

    #[test]
    fn wrong_length_rejected() {
        let err = Identity::from_hex("abcd").unwrap_err();
        assert_eq!(err, IdentityError::InvalidLength(2));
    }

    #[test]
    fn non_hex_rejected() {
        assert!(matches!(
            Identity::from_hex("zz"),
            Err(IdentityError::InvalidHex(_))
        ));
    }

    #[test]
    fn vault_address_depends_on_every_input() {
        let admin = Identity::derive("admin");
        let alice = Identity::derive("alice");
        let bob = Identity::derive("bob");
        let base = Identity::vault_address(&admin, &alice, 0);
        assert_ne!(base, Identity::vault_address(&admin, &bob, 0));
        assert_ne!(base, Identity::vault_address(&bob, &alice, 0));
        assert_ne!(base, Identity::vault_address(&admin, &alice, 1));
        assert_ne!(base, alice);
    }

    #[test]
    fn serializes_as_hex_string() {
        let id = Identity::derive("dave");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_hex()));
        let back: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
