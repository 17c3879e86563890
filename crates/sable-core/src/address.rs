//! Address encoding for the Sable network.
//!
//! Derived addresses use base58check: a version byte, the first 20 bytes of
//! the double-SHA-256 pubkey hash, and a 4-byte checksum. Externally supplied
//! addresses are treated as canonical opaque strings and only checked for
//! well-formedness, since configuration and peers may reference addresses whose
//! keys this node has never seen.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::constants::{ADDRESS_VERSION, MAX_ADDRESS_LEN};
use crate::crypto::{double_hash, PublicKey};
use crate::error::AddressError;

/// Payload length of a derived address before the checksum (version + hash20).
const PAYLOAD_LEN: usize = 21;

/// Checksum length in bytes.
const CHECKSUM_LEN: usize = 4;

/// A canonical Sable address string.
///
/// Well-formed means non-empty, at most [`MAX_ADDRESS_LEN`] chars, and
/// restricted to base58-safe characters plus `_` (used by test fixtures and
/// operator-configured endowment addresses).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    /// Validate and wrap a canonical address string.
    pub fn new(s: impl Into<String>) -> Result<Self, AddressError> {
        let s = s.into();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }
        if s.len() > MAX_ADDRESS_LEN {
            return Err(AddressError::TooLong(s.len()));
        }
        if let Some(c) = s.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '_') {
            return Err(AddressError::InvalidCharacter(c));
        }
        Ok(Self(s))
    }

    /// Derive an address from an Ed25519 public key.
    ///
    /// `base58(version ‖ H(pub)[..20] ‖ H(version ‖ H(pub)[..20])[..4])`.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Self::from_public_key_bytes(&public_key.to_bytes())
    }

    /// Like [`from_public_key`](Self::from_public_key) but from raw key bytes.
    pub fn from_public_key_bytes(public_key: &[u8]) -> Self {
        let hash = double_hash(public_key);
        let mut payload = Vec::with_capacity(PAYLOAD_LEN + CHECKSUM_LEN);
        payload.push(ADDRESS_VERSION);
        payload.extend_from_slice(&hash.as_bytes()[..PAYLOAD_LEN - 1]);
        let checksum = double_hash(&payload);
        payload.extend_from_slice(&checksum.as_bytes()[..CHECKSUM_LEN]);
        Self(bs58::encode(payload).into_string())
    }

    /// Strict decode of a derived address: checks base58, version, checksum.
    ///
    /// Opaque addresses (fixtures, operator config) fail this check but are
    /// still well-formed per [`Address::new`].
    pub fn verify_checksum(&self) -> Result<(), AddressError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|_| AddressError::InvalidPayload)?;
        if bytes.len() != PAYLOAD_LEN + CHECKSUM_LEN {
            return Err(AddressError::InvalidPayload);
        }
        if bytes[0] != ADDRESS_VERSION {
            return Err(AddressError::InvalidVersion(bytes[0]));
        }
        let expected = double_hash(&bytes[..PAYLOAD_LEN]);
        if bytes[PAYLOAD_LEN..] != expected.as_bytes()[..CHECKSUM_LEN] {
            return Err(AddressError::InvalidChecksum);
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}
